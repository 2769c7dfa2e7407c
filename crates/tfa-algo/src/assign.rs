//! Demand assignment across the whole network.
//!
//! [`assign`] runs one solve per origin-destination pair and superposes
//! the results: trips are wired serially, the per-pair programs solve in
//! parallel, and the solved voltages are recorded back serially. The
//! recorded sums give link flows directly, since each resistor's current
//! is its conductance times its summed voltage drop.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::Serialize;

use tfa_core::graph_utils::ServiceGraph;
use tfa_core::{DemandMatrix, Network, StationId};

use crate::error::{AssignError, SolveError};
use crate::problem::{Solution, SolveOptions};
use crate::subcircuit::trip_problem;

/// Controls for a full assignment run.
#[derive(Debug, Clone)]
pub struct AssignOptions {
    /// Abort on the first failing pair instead of collecting failures.
    pub strict: bool,
    /// Keep each pair's own link flows in addition to the network totals.
    pub record_trip_flows: bool,
    /// Screen pairs on the service graph before solving, so a missing
    /// connection surfaces as [`SolveError::Unreachable`] rather than an
    /// unbounded program.
    pub check_reachability: bool,
    /// Solver knobs applied to every pair.
    pub solve: SolveOptions,
}

impl Default for AssignOptions {
    fn default() -> Self {
        AssignOptions {
            strict: false,
            record_trip_flows: false,
            check_reachability: true,
            solve: SolveOptions::default(),
        }
    }
}

/// One pair's solved program, before its voltages are recorded.
#[derive(Debug)]
pub struct PairSolution {
    pub origin: StationId,
    pub destination: StationId,
    pub demand: f64,
    /// Potential drop from origin to destination, the generalized cost
    /// of the trip at this loading.
    pub potential_gap: f64,
    pub solution: Solution,
}

/// Serializable summary of one successfully assigned pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairSummary {
    pub origin: StationId,
    pub destination: StationId,
    pub demand: f64,
    pub potential_gap: f64,
    pub objective: f64,
    pub iterations: u32,
    pub solve_time_ms: u128,
}

/// A pair that could not be assigned, with the failure rendered as text.
#[derive(Debug, Clone, Serialize)]
pub struct PairFailure {
    pub origin: StationId,
    pub destination: StationId,
    pub demand: f64,
    pub message: String,
}

impl PairFailure {
    fn new(origin: StationId, destination: StationId, demand: f64, error: &SolveError) -> Self {
        PairFailure {
            origin,
            destination,
            demand,
            message: error.to_string(),
        }
    }
}

/// Outcome of an [`assign`] run.
#[derive(Debug, Serialize)]
pub struct AssignmentReport {
    pub pairs: Vec<PairSummary>,
    pub failures: Vec<PairFailure>,
    pub total_demand: f64,
    pub assigned_demand: f64,
    pub total_solve_time_ms: u128,
}

impl AssignmentReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Solves one pair's program against the shared infrastructure. The
/// trip must already be wired on the network.
pub fn solve_pair(
    network: &Network,
    origin: StationId,
    destination: StationId,
    options: &SolveOptions,
) -> Result<PairSolution, SolveError> {
    let trip = network
        .trip(origin, destination)
        .ok_or(SolveError::MissingTrip {
            origin,
            destination,
        })?;
    let problem = trip_problem(network, origin, destination)?;
    let solution = problem.solve(options)?;
    let potential_gap = solution
        .gap(trip.origin_node(), trip.destination_node())
        .ok_or_else(|| {
            SolveError::Numerical("trip potentials missing from solution".to_string())
        })?;
    Ok(PairSolution {
        origin,
        destination,
        demand: trip.demand(),
        potential_gap,
        solution,
    })
}

/// Assigns a demand matrix onto the network.
///
/// Previously recorded flows are cleared first, so repeating a run
/// replaces rather than accumulates. Diagonal and zero-demand entries
/// are skipped. In strict mode the first failing pair aborts the run
/// with nothing recorded; otherwise failures are collected in the
/// report and every solvable pair is recorded.
pub fn assign(
    network: &mut Network,
    demand: &DemandMatrix,
    options: &AssignOptions,
) -> Result<AssignmentReport, AssignError> {
    network.reset();

    let mut failures = Vec::new();
    let mut ready: Vec<(StationId, StationId, f64)> = Vec::new();

    let service = options
        .check_reachability
        .then(|| ServiceGraph::from_network(network));
    let mut reachable: HashMap<StationId, HashSet<StationId>> = HashMap::new();

    for (origin, destination, flow) in demand.pairs() {
        if origin == destination || flow == 0.0 {
            continue;
        }
        if let Some(service) = &service {
            let reached = reachable
                .entry(origin)
                .or_insert_with(|| service.reachable_from(origin));
            if !reached.contains(&destination) {
                let error = SolveError::Unreachable {
                    origin,
                    destination,
                };
                if options.strict {
                    return Err(AssignError::Pair {
                        origin,
                        destination,
                        source: error,
                    });
                }
                failures.push(PairFailure::new(origin, destination, flow, &error));
                continue;
            }
        }
        if let Err(error) = network.ensure_trip(origin, destination, flow) {
            let error = SolveError::from(error);
            if options.strict {
                return Err(AssignError::Pair {
                    origin,
                    destination,
                    source: error,
                });
            }
            failures.push(PairFailure::new(origin, destination, flow, &error));
            continue;
        }
        ready.push((origin, destination, flow));
    }

    let shared: &Network = network;
    let solved: Vec<(StationId, StationId, f64, Result<PairSolution, SolveError>)> = ready
        .par_iter()
        .map(|&(origin, destination, flow)| {
            (
                origin,
                destination,
                flow,
                solve_pair(shared, origin, destination, &options.solve),
            )
        })
        .collect();

    // Split failures out before touching the network, so a strict abort
    // leaves no partial flows recorded.
    let mut successes = Vec::with_capacity(solved.len());
    for (origin, destination, flow, result) in solved {
        match result {
            Ok(pair) => successes.push((origin, destination, flow, pair)),
            Err(source) => {
                if options.strict {
                    return Err(AssignError::Pair {
                        origin,
                        destination,
                        source,
                    });
                }
                failures.push(PairFailure::new(origin, destination, flow, &source));
            }
        }
    }

    let mut pairs = Vec::new();
    let mut assigned_demand = 0.0;
    let mut total_solve_time_ms: u128 = 0;

    for (origin, destination, flow, pair) in successes {
        network.record_solution(pair.solution.voltages())?;
        if options.record_trip_flows {
            network.record_trip_flows(origin, destination, pair.solution.voltages())?;
        }
        assigned_demand += flow;
        total_solve_time_ms += pair.solution.solve_time_ms();
        pairs.push(PairSummary {
            origin,
            destination,
            demand: flow,
            potential_gap: pair.potential_gap,
            objective: pair.solution.objective(),
            iterations: pair.solution.iterations(),
            solve_time_ms: pair.solution.solve_time_ms(),
        });
    }

    Ok(AssignmentReport {
        pairs,
        failures,
        total_demand: demand.total_demand(),
        assigned_demand,
        total_solve_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[test]
    fn test_assign_skips_empty_pairs() {
        let mut network = test_utils::cross_network().unwrap();
        let mut demand = DemandMatrix::new();
        demand.set(StationId::new(1), StationId::new(1), 5.0).unwrap();
        demand.set(StationId::new(0), StationId::new(2), 0.0).unwrap();
        demand.set(StationId::new(0), StationId::new(4), 20.0).unwrap();

        let report = assign(&mut network, &demand, &AssignOptions::default()).unwrap();

        assert_eq!(report.pairs.len(), 1);
        assert!(report.is_complete());
        assert!((report.total_demand - 20.0).abs() < 1e-12);
        assert!((report.assigned_demand - 20.0).abs() < 1e-12);
        // Skipped pairs never get trip wiring.
        assert!(network.trip(StationId::new(0), StationId::new(2)).is_none());
        assert!(network.trip(StationId::new(0), StationId::new(4)).is_some());
    }
}
