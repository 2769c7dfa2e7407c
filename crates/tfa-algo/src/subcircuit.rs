//! Per-pair problem assembly.
//!
//! Every solve shares the line infrastructure (boarding gates, travel
//! resistors, transfer links) and adds exactly one pair's trip wiring on
//! top, grounded at that pair's origin. Solving each pair against the
//! shared infrastructure with only its own injection active is what lets
//! per-pair flows be summed into link totals afterwards.

use tfa_core::{CurrentSource, Diode, DiodeId, Network, Resistor, ResistorId, SourceId, StationId};

use crate::error::SolveError;
use crate::problem::{ComponentRef, Problem};

fn resistor(network: &Network, id: ResistorId) -> Result<&Resistor, SolveError> {
    network
        .bank()
        .resistor(id)
        .ok_or(SolveError::UnknownComponent(ComponentRef::Resistor(id)))
}

fn diode(network: &Network, id: DiodeId) -> Result<&Diode, SolveError> {
    network
        .bank()
        .diode(id)
        .ok_or(SolveError::UnknownComponent(ComponentRef::Diode(id)))
}

fn source(network: &Network, id: SourceId) -> Result<&CurrentSource, SolveError> {
    network
        .bank()
        .source(id)
        .ok_or(SolveError::UnknownComponent(ComponentRef::Source(id)))
}

/// Registers every line-infrastructure component: boarding gates and
/// travel resistors of each segment, plus the transfer links wired at
/// each crossing station.
pub fn register_infrastructure(
    problem: &mut Problem,
    network: &Network,
) -> Result<(), SolveError> {
    for segment in network.segments() {
        problem.add_diode(segment.gate, diode(network, segment.gate)?)?;
        if let Some(id) = segment.travel {
            problem.add_resistor(id, resistor(network, id)?)?;
        }
    }
    for station in network.stations() {
        for (_, link) in station.transfers() {
            problem.add_diode(link.gate, diode(network, link.gate)?)?;
            problem.add_resistor(link.resistor, resistor(network, link.resistor)?)?;
        }
    }
    Ok(())
}

/// Builds the complete problem for one origin-destination pair: the
/// shared infrastructure plus the pair's access resistors, egress
/// diodes, and demand injection, with the origin pinned to zero.
pub fn trip_problem(
    network: &Network,
    origin: StationId,
    destination: StationId,
) -> Result<Problem, SolveError> {
    let trip = network
        .trip(origin, destination)
        .ok_or(SolveError::MissingTrip {
            origin,
            destination,
        })?;

    let mut problem = Problem::new();
    register_infrastructure(&mut problem, network)?;

    for &(_, id) in trip.access() {
        problem.add_resistor(id, resistor(network, id)?)?;
    }
    for &id in trip.egress() {
        problem.add_diode(id, diode(network, id)?)?;
    }
    problem.add_source(trip.source(), source(network, trip.source())?)?;
    problem.ground(trip.origin_node());

    Ok(problem)
}
