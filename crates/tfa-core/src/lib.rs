//! Core model for circuit-based transit flow assignment.
//!
//! A scheduled transit network is represented as an electrical circuit.
//! Riding between consecutive stops is a resistor whose conductance is the
//! inverse of the travel time, waiting to board is a resistor whose
//! conductance is twice the service frequency, and one-way movements
//! (staying on a vehicle, alighting, leaving the system) are ideal diodes.
//! The demand of an origin/destination pair enters as a current source.
//! Minimizing dissipated energy spreads each pair's demand over routes in
//! proportion to their attractiveness, and because the per-pair problems are
//! independent, superposing their currents yields link loads for the whole
//! network.
//!
//! [`Network`] owns the station and line topology, the component arena
//! ([`CircuitBank`]), and one [`Trip`] per requested origin/destination
//! pair. Solvers live in a separate crate; this one only describes circuits
//! and records their solved voltages.
//!
//! # Example
//!
//! ```no_run
//! use tfa_core::{DistanceMatrix, LineSpec, Network, StationId, StationSpec};
//!
//! # fn main() -> Result<(), tfa_core::NetworkError> {
//! let mut distances = DistanceMatrix::new(3);
//! distances.set(0, 1, 10.0);
//! distances.set(1, 2, 8.0);
//!
//! let stations = (0..3).map(|id| StationSpec { id, coords: None }).collect();
//! let lines = vec![LineSpec {
//!     id: 0,
//!     stations: vec![0, 1, 2],
//!     speed: 10.0,
//!     frequency: Some(1.0),
//!     headway: None,
//! }];
//!
//! let (mut network, diagnostics) = Network::build(distances, stations, lines)?;
//! assert!(!diagnostics.has_errors());
//! network.ensure_trip(StationId::new(0), StationId::new(2), 10.0)?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod circuit;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;

pub use circuit::{
    CircuitBank, ComponentError, ComponentVoltages, CurrentSource, Diode, Resistor, VarPool,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::NetworkError;

/// Identifier for a station.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StationId(usize);

impl StationId {
    #[inline]
    pub fn new(id: usize) -> Self {
        StationId(id)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LineId(usize);

impl LineId {
    #[inline]
    pub fn new(id: usize) -> Self {
        LineId(id)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a line segment (one stop of one line in one direction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(usize);

impl SegmentId {
    #[inline]
    pub fn new(id: usize) -> Self {
        SegmentId(id)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Identifier for a potential variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn new(id: usize) -> Self {
        VarId(id)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Identifier for a resistor in the component bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResistorId(usize);

impl ResistorId {
    #[inline]
    pub fn new(id: usize) -> Self {
        ResistorId(id)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Identifier for a diode in the component bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiodeId(usize);

impl DiodeId {
    #[inline]
    pub fn new(id: usize) -> Self {
        DiodeId(id)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Identifier for a current source in the component bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(usize);

impl SourceId {
    #[inline]
    pub fn new(id: usize) -> Self {
        SourceId(id)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Direction of travel along a line's stop sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward the end of the stop sequence.
    Forward,
    /// Toward the start of the stop sequence.
    Backward,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Forward, Direction::Backward];

    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    /// Index into per-direction pairs such as [`Station::segment`] storage.
    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Backward => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

/// Planar position of a station, used for distance sanity checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

impl Coords {
    pub fn distance_to(&self, other: &Coords) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Input description of a station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSpec {
    pub id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coords>,
}

/// Input description of a line.
///
/// Exactly one of `frequency` (vehicles per unit time) and `headway` (time
/// between vehicles) is required; when both are given, `frequency` wins and
/// a warning is raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSpec {
    pub id: usize,
    pub stations: Vec<usize>,
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headway: Option<f64>,
}

/// A service rate, given either way round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceRate {
    /// Vehicles per unit time.
    Frequency(f64),
    /// Time between consecutive vehicles.
    Headway(f64),
}

impl ServiceRate {
    /// Normalize to a frequency, validating the raw value.
    pub fn resolve(self, line: LineId) -> Result<f64, NetworkError> {
        match self {
            ServiceRate::Frequency(frequency) => {
                if !frequency.is_finite() || frequency <= 0.0 {
                    return Err(NetworkError::InvalidServiceRate {
                        line,
                        kind: "frequency",
                        value: frequency,
                    });
                }
                Ok(frequency)
            }
            ServiceRate::Headway(headway) => {
                if !headway.is_finite() || headway <= 0.0 {
                    return Err(NetworkError::InvalidServiceRate {
                        line,
                        kind: "headway",
                        value: headway,
                    });
                }
                Ok(headway.recip())
            }
        }
    }
}

/// Symmetric station-to-station distances.
///
/// Non-positive entries mean "not directly connected"; the matrix starts out
/// fully disconnected.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(stations: usize) -> Self {
        Self {
            n: stations,
            data: vec![-1.0; stations * stations],
        }
    }

    /// Number of stations the matrix covers.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Record a distance, symmetrically.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn set(&mut self, a: usize, b: usize, distance: f64) {
        assert!(a < self.n && b < self.n, "station index out of range");
        self.data[a * self.n + b] = distance;
        self.data[b * self.n + a] = distance;
    }

    /// The distance between two stations, if they are directly connected.
    pub fn get(&self, a: usize, b: usize) -> Option<f64> {
        if a >= self.n || b >= self.n {
            return None;
        }
        let distance = self.data[a * self.n + b];
        if distance.is_finite() && distance > 0.0 {
            Some(distance)
        } else {
            None
        }
    }
}

/// One stop of one line in one direction, with its circuit nodes.
///
/// `node` is the potential at the platform, `board` the potential on the
/// vehicle. The `gate` diode lets riders already on the vehicle continue
/// past the stop without paying another wait, and `travel` is the resistor
/// toward the next stop in this direction (`None` at the terminus).
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub id: SegmentId,
    pub station: StationId,
    pub line: LineId,
    pub direction: Direction,
    pub node: VarId,
    pub board: VarId,
    pub gate: DiodeId,
    pub travel: Option<ResistorId>,
}

/// Identifies one directed transfer move within a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferKey {
    pub from_line: LineId,
    pub from_direction: Direction,
    pub to_line: LineId,
    pub to_direction: Direction,
}

/// The components realizing one transfer move: an alighting gate followed by
/// a wait for the target line.
#[derive(Debug, Clone, Copy)]
pub struct TransferLink {
    pub gate: DiodeId,
    pub resistor: ResistorId,
}

/// A station and the per-line segments and transfer moves wired at it.
#[derive(Debug)]
pub struct Station {
    pub id: StationId,
    pub coords: Option<Coords>,
    stops: BTreeMap<LineId, [SegmentId; 2]>,
    transfers: BTreeMap<TransferKey, TransferLink>,
}

impl Station {
    /// Lines serving this station, in id order.
    pub fn lines(&self) -> impl Iterator<Item = LineId> + '_ {
        self.stops.keys().copied()
    }

    pub fn line_count(&self) -> usize {
        self.stops.len()
    }

    pub fn serves(&self, line: LineId) -> bool {
        self.stops.contains_key(&line)
    }

    pub fn is_served(&self) -> bool {
        !self.stops.is_empty()
    }

    /// The segment of `line` through this station in `direction`.
    pub fn segment(&self, line: LineId, direction: Direction) -> Option<SegmentId> {
        self.stops.get(&line).map(|pair| pair[direction.index()])
    }

    pub fn transfer(&self, key: TransferKey) -> Option<TransferLink> {
        self.transfers.get(&key).copied()
    }

    pub fn transfers(&self) -> impl Iterator<Item = (&TransferKey, &TransferLink)> {
        self.transfers.iter()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }
}

/// A line and its resolved service parameters.
#[derive(Debug, Clone)]
pub struct Line {
    pub id: LineId,
    pub stations: Vec<StationId>,
    pub speed: f64,
    frequency: f64,
}

impl Line {
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn headway(&self) -> f64 {
        self.frequency.recip()
    }

    pub fn stop_count(&self) -> usize {
        self.stations.len()
    }
}

/// Flow recorded on one line segment, in the segment's travel direction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SegmentFlow {
    pub station: StationId,
    pub line: LineId,
    pub direction: Direction,
    pub flow: f64,
}

/// The circuit wiring of one origin/destination pair.
///
/// Created once per pair and kept on the network, so repeated assignments
/// reuse the same components. `origin_node` is grounded by the solver and
/// the injected current makes `origin_node - destination_node` the
/// generalized cost of the pair.
#[derive(Debug)]
pub struct Trip {
    origin: StationId,
    destination: StationId,
    demand: f64,
    source: SourceId,
    origin_node: VarId,
    destination_node: VarId,
    access: Vec<(LineId, ResistorId)>,
    egress: Vec<DiodeId>,
    recorded: Option<Vec<SegmentFlow>>,
}

impl Trip {
    pub fn origin(&self) -> StationId {
        self.origin
    }

    pub fn destination(&self) -> StationId {
        self.destination
    }

    pub fn demand(&self) -> f64 {
        self.demand
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn origin_node(&self) -> VarId {
        self.origin_node
    }

    pub fn destination_node(&self) -> VarId {
        self.destination_node
    }

    /// Boarding resistors from the origin, one per line and direction.
    pub fn access(&self) -> &[(LineId, ResistorId)] {
        &self.access
    }

    /// Alighting diodes into the destination, one per line and direction.
    pub fn egress(&self) -> &[DiodeId] {
        &self.egress
    }

    /// Per-segment flows of this trip, when they were recorded.
    pub fn recorded_flows(&self) -> Option<&[SegmentFlow]> {
        self.recorded.as_deref()
    }
}

/// Origin/destination demand.
///
/// Entries are directed; the two directions of a pair are independent
/// demands. Diagonal entries are accepted but carry no trips.
#[derive(Debug, Clone, Default)]
pub struct DemandMatrix {
    entries: BTreeMap<(StationId, StationId), f64>,
}

impl DemandMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        origin: StationId,
        destination: StationId,
        demand: f64,
    ) -> Result<(), NetworkError> {
        if !demand.is_finite() || demand < 0.0 {
            return Err(NetworkError::InvalidDemand {
                origin,
                destination,
                demand,
            });
        }
        self.entries.insert((origin, destination), demand);
        Ok(())
    }

    pub fn get(&self, origin: StationId, destination: StationId) -> Option<f64> {
        self.entries.get(&(origin, destination)).copied()
    }

    /// All entries in origin-major order.
    pub fn pairs(&self) -> impl Iterator<Item = (StationId, StationId, f64)> + '_ {
        self.entries.iter().map(|(&(o, d), &flow)| (o, d, flow))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total demand over all off-diagonal pairs.
    pub fn total_demand(&self) -> f64 {
        self.entries
            .iter()
            .filter(|((o, d), _)| o != d)
            .map(|(_, &flow)| flow)
            .sum()
    }
}

/// Counts describing a built network.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NetworkStats {
    pub num_stations: usize,
    pub num_lines: usize,
    pub num_segments: usize,
    pub num_transfers: usize,
    pub num_resistors: usize,
    pub num_diodes: usize,
    pub num_sources: usize,
    pub num_trips: usize,
    pub num_variables: usize,
}

/// A transit network and its circuit analogue.
#[derive(Debug)]
pub struct Network {
    stations: Vec<Station>,
    lines: Vec<Line>,
    distances: DistanceMatrix,
    segments: Vec<Segment>,
    vars: VarPool,
    bank: CircuitBank,
    trips: BTreeMap<(StationId, StationId), Trip>,
}

impl Network {
    /// Build a network from its inputs, wiring all line and transfer
    /// components.
    ///
    /// Station and line specs must be sorted by id with ids equal to their
    /// positions. Non-fatal oddities are reported through the returned
    /// [`Diagnostics`].
    pub fn build(
        distances: DistanceMatrix,
        stations: Vec<StationSpec>,
        lines: Vec<LineSpec>,
    ) -> Result<(Network, Diagnostics), NetworkError> {
        let mut diagnostics = Diagnostics::new();

        if distances.len() != stations.len() {
            return Err(NetworkError::DistanceMatrixShape {
                matrix: distances.len(),
                stations: stations.len(),
            });
        }

        let mut network = Network {
            stations: Vec::with_capacity(stations.len()),
            lines: Vec::with_capacity(lines.len()),
            distances,
            segments: Vec::new(),
            vars: VarPool::new(),
            bank: CircuitBank::new(),
            trips: BTreeMap::new(),
        };

        for (index, spec) in stations.into_iter().enumerate() {
            if spec.id != index {
                return Err(NetworkError::StationIdOrder {
                    expected: index,
                    found: spec.id,
                });
            }
            let id = StationId::new(index);
            if let Some(coords) = spec.coords {
                if !coords.x.is_finite() || !coords.y.is_finite() {
                    return Err(NetworkError::InvalidCoords(id));
                }
            }
            network.stations.push(Station {
                id,
                coords: spec.coords,
                stops: BTreeMap::new(),
                transfers: BTreeMap::new(),
            });
        }

        for (index, spec) in lines.into_iter().enumerate() {
            if spec.id != index {
                return Err(NetworkError::LineIdOrder {
                    expected: index,
                    found: spec.id,
                });
            }
            network.add_line(spec, &mut diagnostics)?;
        }

        Ok((network, diagnostics))
    }

    fn add_line(
        &mut self,
        spec: LineSpec,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), NetworkError> {
        let line = LineId::new(self.lines.len());
        let frequency = resolve_line_rate(&spec, line, diagnostics)?;
        if !spec.speed.is_finite() || spec.speed <= 0.0 {
            return Err(NetworkError::InvalidSpeed {
                line,
                speed: spec.speed,
            });
        }
        if spec.stations.len() < 2 {
            return Err(NetworkError::LineTooShort {
                line,
                stops: spec.stations.len(),
            });
        }

        let mut stops: Vec<StationId> = Vec::with_capacity(spec.stations.len());
        let mut seen: HashSet<usize> = HashSet::new();
        for &raw in &spec.stations {
            if raw >= self.stations.len() {
                return Err(NetworkError::UnknownStation(StationId::new(raw)));
            }
            if !seen.insert(raw) {
                return Err(NetworkError::RepeatedStop {
                    line,
                    station: StationId::new(raw),
                });
            }
            stops.push(StationId::new(raw));
        }

        // Resolve all travel times up front so a bad distance cannot leave
        // the line half wired.
        let mut travel_times = Vec::with_capacity(stops.len() - 1);
        for pair in stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let distance = self
                .distances
                .get(a.value(), b.value())
                .ok_or(NetworkError::MissingDistance { a, b })?;
            travel_times.push(distance / spec.speed);
        }

        let mut pairs: Vec<[SegmentId; 2]> = Vec::with_capacity(stops.len());
        for &station in &stops {
            let pair = [
                self.add_segment(station, line, Direction::Forward),
                self.add_segment(station, line, Direction::Backward),
            ];
            self.wire_transfers(station, line, frequency, pair)?;
            self.stations[station.value()].stops.insert(line, pair);
            pairs.push(pair);
        }

        for (i, &travel_time) in travel_times.iter().enumerate() {
            // forward: stop i toward stop i+1
            let source = self.segments[pairs[i][0].value()].board;
            let drain = self.segments[pairs[i + 1][0].value()].node;
            let forward = self
                .bank
                .add_resistor(Resistor::from_travel_time(travel_time, source, drain)?);
            self.segments[pairs[i][0].value()].travel = Some(forward);

            // backward: stop i+1 toward stop i
            let source = self.segments[pairs[i + 1][1].value()].board;
            let drain = self.segments[pairs[i][1].value()].node;
            let backward = self
                .bank
                .add_resistor(Resistor::from_travel_time(travel_time, source, drain)?);
            self.segments[pairs[i + 1][1].value()].travel = Some(backward);
        }

        self.lines.push(Line {
            id: line,
            stations: stops,
            speed: spec.speed,
            frequency,
        });
        Ok(())
    }

    fn add_segment(&mut self, station: StationId, line: LineId, direction: Direction) -> SegmentId {
        let id = SegmentId::new(self.segments.len());
        let node = self.vars.fresh();
        let board = self.vars.fresh();
        let gate = self.bank.add_diode(Diode::new(node, board));
        self.segments.push(Segment {
            id,
            station,
            line,
            direction,
            node,
            board,
            gate,
            travel: None,
        });
        id
    }

    /// Wire transfer moves between the new line and every line already
    /// serving the station, in both orders and all direction combinations.
    fn wire_transfers(
        &mut self,
        station: StationId,
        line: LineId,
        frequency: f64,
        pair: [SegmentId; 2],
    ) -> Result<(), NetworkError> {
        let existing: Vec<(LineId, [SegmentId; 2])> = self.stations[station.value()]
            .stops
            .iter()
            .map(|(&l, &p)| (l, p))
            .collect();
        for (other, other_pair) in existing {
            let other_frequency = self.lines[other.value()].frequency;
            for from_direction in Direction::BOTH {
                for to_direction in Direction::BOTH {
                    self.add_transfer(
                        station,
                        (other, from_direction, other_pair[from_direction.index()]),
                        (line, to_direction, pair[to_direction.index()]),
                        frequency,
                    )?;
                    self.add_transfer(
                        station,
                        (line, from_direction, pair[from_direction.index()]),
                        (other, to_direction, other_pair[to_direction.index()]),
                        other_frequency,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn add_transfer(
        &mut self,
        station: StationId,
        from: (LineId, Direction, SegmentId),
        to: (LineId, Direction, SegmentId),
        to_frequency: f64,
    ) -> Result<(), NetworkError> {
        let from_node = self.segments[from.2.value()].node;
        let to_board = self.segments[to.2.value()].board;
        let mid = self.vars.fresh();
        let gate = self.bank.add_diode(Diode::new(from_node, mid));
        let resistor = self
            .bank
            .add_resistor(Resistor::from_frequency(to_frequency, mid, to_board)?);
        let key = TransferKey {
            from_line: from.0,
            from_direction: from.1,
            to_line: to.0,
            to_direction: to.1,
        };
        self.stations[station.value()]
            .transfers
            .insert(key, TransferLink { gate, resistor });
        Ok(())
    }

    /// Create the trip wiring for a pair, or update its demand if the pair
    /// already has one.
    ///
    /// A trip's access resistors, egress diodes, and current source are
    /// built once and kept; only the injected demand changes on later calls.
    pub fn ensure_trip(
        &mut self,
        origin: StationId,
        destination: StationId,
        demand: f64,
    ) -> Result<(), NetworkError> {
        if origin.value() >= self.stations.len() {
            return Err(NetworkError::UnknownStation(origin));
        }
        if destination.value() >= self.stations.len() {
            return Err(NetworkError::UnknownStation(destination));
        }
        if origin == destination {
            return Err(NetworkError::SelfPair(origin));
        }
        if !demand.is_finite() || demand < 0.0 {
            return Err(NetworkError::InvalidDemand {
                origin,
                destination,
                demand,
            });
        }
        if !self.stations[origin.value()].is_served() {
            return Err(NetworkError::NoService(origin));
        }
        if !self.stations[destination.value()].is_served() {
            return Err(NetworkError::NoService(destination));
        }

        if let Some(trip) = self.trips.get_mut(&(origin, destination)) {
            trip.demand = demand;
            let source = trip.source;
            match self.bank.source_mut(source) {
                Some(current_source) => current_source.set_injection(demand)?,
                None => return Err(NetworkError::UnknownComponent),
            }
            return Ok(());
        }

        let origin_node = self.vars.fresh();
        let destination_node = self.vars.fresh();
        let source = self
            .bank
            .add_source(CurrentSource::new(demand, destination_node, origin_node)?);

        let origin_stops: Vec<(LineId, [SegmentId; 2])> = self.stations[origin.value()]
            .stops
            .iter()
            .map(|(&l, &p)| (l, p))
            .collect();
        let mut access = Vec::with_capacity(origin_stops.len() * 2);
        for (line, pair) in origin_stops {
            let frequency = self.lines[line.value()].frequency;
            for direction in Direction::BOTH {
                let board = self.segments[pair[direction.index()].value()].board;
                let id = self
                    .bank
                    .add_resistor(Resistor::from_frequency(frequency, origin_node, board)?);
                access.push((line, id));
            }
        }

        let destination_stops: Vec<[SegmentId; 2]> = self.stations[destination.value()]
            .stops
            .values()
            .copied()
            .collect();
        let mut egress = Vec::with_capacity(destination_stops.len() * 2);
        for pair in destination_stops {
            for direction in Direction::BOTH {
                let node = self.segments[pair[direction.index()].value()].node;
                egress.push(self.bank.add_diode(Diode::new(node, destination_node)));
            }
        }

        self.trips.insert(
            (origin, destination),
            Trip {
                origin,
                destination,
                demand,
                source,
                origin_node,
                destination_node,
                access,
                egress,
                recorded: None,
            },
        );
        Ok(())
    }

    /// Change a line's service rate in place.
    ///
    /// Updates the line and the conductance of every waiting resistor that
    /// targets it: transfers into the line and access resistors of existing
    /// trips boarding it. Travel resistors are unaffected.
    pub fn update_service_rate(
        &mut self,
        line: LineId,
        rate: ServiceRate,
    ) -> Result<(), NetworkError> {
        if line.value() >= self.lines.len() {
            return Err(NetworkError::UnknownLine(line));
        }
        let frequency = rate.resolve(line)?;
        self.lines[line.value()].frequency = frequency;

        let mut touched: Vec<ResistorId> = Vec::new();
        for station in &self.stations {
            for (key, link) in &station.transfers {
                if key.to_line == line {
                    touched.push(link.resistor);
                }
            }
        }
        for trip in self.trips.values() {
            for &(access_line, id) in &trip.access {
                if access_line == line {
                    touched.push(id);
                }
            }
        }

        let conductance = 2.0 * frequency;
        for id in touched {
            match self.bank.resistor_mut(id) {
                Some(resistor) => resistor.set_conductance(conductance)?,
                None => return Err(NetworkError::UnknownComponent),
            }
        }
        Ok(())
    }

    /// Fold one solve's realized voltages into the component histories.
    pub fn record_solution(&mut self, voltages: &ComponentVoltages) -> Result<(), NetworkError> {
        for &(id, voltage) in &voltages.resistors {
            match self.bank.resistor_mut(id) {
                Some(resistor) => resistor.record(voltage),
                None => return Err(NetworkError::UnknownComponent),
            }
        }
        for &(id, voltage) in &voltages.diodes {
            match self.bank.diode_mut(id) {
                Some(diode) => diode.record(voltage),
                None => return Err(NetworkError::UnknownComponent),
            }
        }
        for &(id, voltage) in &voltages.sources {
            match self.bank.source_mut(id) {
                Some(source) => source.record(voltage),
                None => return Err(NetworkError::UnknownComponent),
            }
        }
        Ok(())
    }

    /// Keep a per-segment breakdown of one pair's flows on its trip.
    ///
    /// The aggregate histories already superpose all pairs; this stores the
    /// disaggregated share of a single pair from its own solve.
    pub fn record_trip_flows(
        &mut self,
        origin: StationId,
        destination: StationId,
        voltages: &ComponentVoltages,
    ) -> Result<(), NetworkError> {
        if !self.trips.contains_key(&(origin, destination)) {
            return Err(NetworkError::TripNotFound {
                origin,
                destination,
            });
        }

        let by_id: HashMap<ResistorId, f64> = voltages.resistors.iter().copied().collect();
        let mut flows = Vec::new();
        for segment in &self.segments {
            let travel = match segment.travel {
                Some(travel) => travel,
                None => continue,
            };
            let voltage = match by_id.get(&travel) {
                Some(&voltage) => voltage,
                None => continue,
            };
            let conductance = match self.bank.resistor(travel) {
                Some(resistor) => resistor.conductance(),
                None => return Err(NetworkError::UnknownComponent),
            };
            flows.push(SegmentFlow {
                station: segment.station,
                line: segment.line,
                direction: segment.direction,
                flow: conductance * voltage,
            });
        }

        if let Some(trip) = self.trips.get_mut(&(origin, destination)) {
            trip.recorded = Some(flows);
        }
        Ok(())
    }

    /// The recorded per-segment flows of one pair.
    pub fn trip_flows(
        &self,
        origin: StationId,
        destination: StationId,
    ) -> Result<&[SegmentFlow], NetworkError> {
        let trip = self
            .trips
            .get(&(origin, destination))
            .ok_or(NetworkError::TripNotFound {
                origin,
                destination,
            })?;
        match &trip.recorded {
            Some(flows) => Ok(flows.as_slice()),
            None => Err(NetworkError::FlowsNotRecorded {
                origin,
                destination,
            }),
        }
    }

    /// Aggregate flow leaving `station` on `line` in `direction`.
    ///
    /// `None` when the station is not served by the line or the segment is a
    /// terminus in that direction.
    pub fn segment_flow(
        &self,
        station: StationId,
        line: LineId,
        direction: Direction,
    ) -> Option<f64> {
        let station = self.stations.get(station.value())?;
        let pair = station.stops.get(&line)?;
        let segment = &self.segments[pair[direction.index()].value()];
        let travel = segment.travel?;
        self.bank
            .resistor(travel)
            .map(|resistor| resistor.total_current())
    }

    /// Aggregate flows of every non-terminus segment.
    pub fn segment_flows(&self) -> Vec<SegmentFlow> {
        let mut flows = Vec::new();
        for segment in &self.segments {
            let travel = match segment.travel {
                Some(travel) => travel,
                None => continue,
            };
            if let Some(resistor) = self.bank.resistor(travel) {
                flows.push(SegmentFlow {
                    station: segment.station,
                    line: segment.line,
                    direction: segment.direction,
                    flow: resistor.total_current(),
                });
            }
        }
        flows
    }

    /// Clear all component histories and recorded per-trip flows.
    ///
    /// Topology, trips, and demands stay intact, ready for a fresh
    /// assignment.
    pub fn reset(&mut self) {
        self.bank.reset();
        for trip in self.trips.values_mut() {
            trip.recorded = None;
        }
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            num_stations: self.stations.len(),
            num_lines: self.lines.len(),
            num_segments: self.segments.len(),
            num_transfers: self.stations.iter().map(|s| s.transfers.len()).sum(),
            num_resistors: self.bank.resistor_count(),
            num_diodes: self.bank.diode_count(),
            num_sources: self.bank.source_count(),
            num_trips: self.trips.len(),
            num_variables: self.vars.len(),
        }
    }

    /// Structural sanity checks that do not prevent building.
    pub fn validate_into(&self, diagnostics: &mut Diagnostics) {
        if self.stations.is_empty() {
            diagnostics.add_error("structure", "network has no stations");
            return;
        }
        if self.lines.is_empty() {
            diagnostics.add_error("structure", "network has no lines");
            return;
        }

        for station in &self.stations {
            if !station.is_served() {
                diagnostics.add_warning_with_entity(
                    "structure",
                    "station is not served by any line",
                    &format!("Station {}", station.id),
                );
            }
        }

        let islands = graph_utils::find_islands(self);
        let served_islands = islands
            .iter()
            .filter(|island| {
                island
                    .stations
                    .iter()
                    .any(|&s| self.stations[s.value()].is_served())
            })
            .count();
        if served_islands > 1 {
            diagnostics.add_warning(
                "structure",
                &format!("service is split into {} disconnected islands", served_islands),
            );
        }

        for line in &self.lines {
            for window in line.stations.windows(2) {
                let (a, b) = (window[0], window[1]);
                let (ca, cb) = match (
                    self.stations[a.value()].coords,
                    self.stations[b.value()].coords,
                ) {
                    (Some(ca), Some(cb)) => (ca, cb),
                    _ => continue,
                };
                let matrix = match self.distances.get(a.value(), b.value()) {
                    Some(distance) => distance,
                    None => continue,
                };
                let euclid = ca.distance_to(&cb);
                if euclid > 0.0 && (matrix - euclid).abs() / matrix.max(euclid) > 1e-6 {
                    diagnostics.add_warning_with_entity(
                        "distance",
                        &format!(
                            "matrix distance {} disagrees with coordinate distance {:.6}",
                            matrix, euclid
                        ),
                        &format!("Stations {} and {}", a, b),
                    );
                }
            }
        }
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn variable_count(&self) -> usize {
        self.vars.len()
    }

    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.get(id.value())
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.get(id.value())
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id.value())
    }

    /// The segment of `line` through `station` in `direction`.
    pub fn segment_at(
        &self,
        station: StationId,
        line: LineId,
        direction: Direction,
    ) -> Option<&Segment> {
        let station = self.stations.get(station.value())?;
        let pair = station.stops.get(&line)?;
        self.segments.get(pair[direction.index()].value())
    }

    pub fn bank(&self) -> &CircuitBank {
        &self.bank
    }

    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }

    pub fn trip(&self, origin: StationId, destination: StationId) -> Option<&Trip> {
        self.trips.get(&(origin, destination))
    }

    pub fn trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.values()
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }
}

fn resolve_line_rate(
    spec: &LineSpec,
    line: LineId,
    diagnostics: &mut Diagnostics,
) -> Result<f64, NetworkError> {
    match (spec.frequency, spec.headway) {
        (Some(frequency), headway) => {
            if headway.is_some() {
                diagnostics.add_warning_with_entity(
                    "rate",
                    "both frequency and headway given, using frequency",
                    &format!("Line {}", line),
                );
            }
            ServiceRate::Frequency(frequency).resolve(line)
        }
        (None, Some(headway)) => ServiceRate::Headway(headway).resolve(line),
        (None, None) => Err(NetworkError::MissingServiceRate { line }),
    }
}
