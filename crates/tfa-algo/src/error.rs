//! Error types for problem assembly, solving, and assignment.

use std::time::Duration;

use tfa_core::{NetworkError, StationId};

use crate::problem::ComponentRef;

/// Errors from lowering a circuit to conic form or solving it.
#[derive(thiserror::Error, Debug)]
pub enum SolveError {
    /// The solver proved the constraints inconsistent. With all
    /// right-hand sides at zero this should not happen for circuits
    /// assembled through [`Problem`](crate::problem::Problem).
    #[error("problem is primal infeasible")]
    Infeasible,

    /// The objective decreases without bound, which means some injected
    /// demand has no conducting path to its destination.
    #[error("problem is unbounded; some injected demand has no path to its destination")]
    Unbounded,

    /// The solver hit its wall-clock limit before converging.
    #[error("solver exceeded the time limit of {limit:?}")]
    TimedOut { limit: Duration },

    /// The solver hit its iteration cap before converging.
    #[error("solver stopped after {iterations} iterations without converging")]
    IterationLimit { iterations: u32 },

    /// The solver terminated with a numerical failure.
    #[error("solver failed: {0}")]
    Numerical(String),

    /// The solver settings were rejected.
    #[error("invalid solver settings: {0}")]
    Settings(String),

    /// The solver rejected the assembled problem data.
    #[error("solver setup failed: {0}")]
    Setup(String),

    /// The same component was added to a problem twice.
    #[error("{0} is already registered")]
    DuplicateComponent(ComponentRef),

    /// No variables were registered before solving.
    #[error("problem has no variables")]
    EmptyProblem,

    /// A trip was expected on the network but has not been created.
    #[error("no trip from station {origin} to station {destination}")]
    MissingTrip {
        origin: StationId,
        destination: StationId,
    },

    /// The destination cannot be reached from the origin on the service
    /// graph, so solving would be unbounded.
    #[error("station {destination} is not reachable from station {origin}")]
    Unreachable {
        origin: StationId,
        destination: StationId,
    },

    /// A component id from the problem was not found in the network bank.
    #[error("{0} is not present in the network")]
    UnknownComponent(ComponentRef),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Errors from assigning a full demand matrix.
#[derive(thiserror::Error, Debug)]
pub enum AssignError {
    /// A single origin-destination pair failed to solve in strict mode.
    #[error("pair {origin} -> {destination} failed: {source}")]
    Pair {
        origin: StationId,
        destination: StationId,
        source: SolveError,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),
}
