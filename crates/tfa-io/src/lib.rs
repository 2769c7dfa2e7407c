//! # tfa-io: Case Files and State Export
//!
//! Input and output around the core model:
//!
//! - [`case`]: JSON case files holding stations, distances, lines, and
//!   demand, loaded into a built [`tfa_core::Network`] plus its
//!   [`tfa_core::DemandMatrix`] and construction diagnostics.
//! - [`state`]: write-only JSON exports of network state and realized
//!   segment flows. Exports are never read back.

pub mod case;
pub mod state;

pub use case::{
    build_case, load_case, parse_case_str, CaseError, CaseFile, CaseImport, DemandEntry,
    DistanceEntry,
};
pub use state::{FlowDump, LineState, NetworkState, StationState, TripState};
