//! # tfa-algo: Flow Assignment Solvers for Transit Networks
//!
//! This crate turns the circuit networks built by `tfa-core` into convex
//! programs and solves them, one program per origin-destination pair.
//!
//! ## Pipeline
//!
//! | Stage | Module | What happens |
//! |-------|--------|--------------|
//! | Lowering | [`subcircuit`] | Infrastructure plus one trip becomes a [`Problem`] |
//! | Solving | [`problem`] | Clarabel minimizes energy subject to gates and grounds |
//! | Assignment | [`assign`] | All pairs solve in parallel, voltages superpose |
//!
//! At the optimum of each program, current through every resistor obeys
//! Ohm's law and splits across parallel routes in proportion to their
//! conductance, while diode constraints keep passengers from riding
//! against the direction of service. Summing the per-pair voltage drops
//! on the network afterwards yields total link flows.
//!
//! ## Example
//!
//! ```ignore
//! use tfa_algo::{assign, AssignOptions};
//! use tfa_core::{DemandMatrix, StationId};
//!
//! let mut demand = DemandMatrix::new();
//! demand.set(StationId::new(0), StationId::new(4), 20.0)?;
//!
//! let report = assign(&mut network, &demand, &AssignOptions::default())?;
//! for pair in &report.pairs {
//!     println!("{} -> {}: cost {:.2}", pair.origin, pair.destination, pair.potential_gap);
//! }
//! ```

pub mod assign;
pub mod error;
pub mod problem;
pub mod subcircuit;
pub mod test_utils;

pub use assign::{
    assign, solve_pair, AssignOptions, AssignmentReport, PairFailure, PairSolution, PairSummary,
};
pub use error::{AssignError, SolveError};
pub use problem::{ComponentRef, Problem, Solution, SolveOptions};
pub use subcircuit::{register_infrastructure, trip_problem};
