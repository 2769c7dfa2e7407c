//! Error types for network construction and mutation.

use thiserror::Error;

use crate::circuit::ComponentError;
use crate::{LineId, StationId};

/// Errors raised while building or mutating a [`crate::Network`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("distance matrix is {matrix}x{matrix} but {stations} stations were given")]
    DistanceMatrixShape { matrix: usize, stations: usize },

    #[error("station specs must be ordered by id: expected {expected}, found {found}")]
    StationIdOrder { expected: usize, found: usize },

    #[error("line specs must be ordered by id: expected {expected}, found {found}")]
    LineIdOrder { expected: usize, found: usize },

    #[error("station {0} does not exist")]
    UnknownStation(StationId),

    #[error("line {0} does not exist")]
    UnknownLine(LineId),

    #[error("line {line} visits only {stops} stations, need at least 2")]
    LineTooShort { line: LineId, stops: usize },

    #[error("line {line} visits station {station} more than once")]
    RepeatedStop { line: LineId, station: StationId },

    #[error("no distance between stations {a} and {b}")]
    MissingDistance { a: StationId, b: StationId },

    #[error("line {line} has invalid speed {speed}")]
    InvalidSpeed { line: LineId, speed: f64 },

    #[error("line {line} has neither frequency nor headway")]
    MissingServiceRate { line: LineId },

    #[error("line {line} has invalid {kind} {value}")]
    InvalidServiceRate {
        line: LineId,
        kind: &'static str,
        value: f64,
    },

    #[error("station {0} has non-finite coordinates")]
    InvalidCoords(StationId),

    #[error("station {0} is not served by any line")]
    NoService(StationId),

    #[error("origin and destination are both station {0}")]
    SelfPair(StationId),

    #[error("demand {demand} for pair {origin} -> {destination} is invalid")]
    InvalidDemand {
        origin: StationId,
        destination: StationId,
        demand: f64,
    },

    #[error("no trip exists for pair {origin} -> {destination}")]
    TripNotFound {
        origin: StationId,
        destination: StationId,
    },

    #[error("per-trip flows were not recorded for pair {origin} -> {destination}")]
    FlowsNotRecorded {
        origin: StationId,
        destination: StationId,
    },

    #[error("solution references a component this network does not contain")]
    UnknownComponent,

    #[error(transparent)]
    Component(#[from] ComponentError),
}
