//! JSON case file importer.
//!
//! A case file is one JSON document holding everything needed to build a
//! network and its demand: stations (with optional coordinates), symmetric
//! distance entries, line definitions, and demand triples.
//!
//! ```json
//! {
//!   "name": "cross",
//!   "stations": [{ "id": 0 }, { "id": 1, "coords": { "x": 0.0, "y": 1.0 } }],
//!   "distances": [{ "from": 0, "to": 1, "distance": 10.0 }],
//!   "lines": [{ "id": 0, "stations": [0, 1], "speed": 10.0, "frequency": 1.0 }],
//!   "demand": [{ "origin": 0, "destination": 1, "flow": 20.0 }]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use tfa_core::{
    DemandMatrix, Diagnostics, DistanceMatrix, LineSpec, Network, NetworkError, StationId,
    StationSpec,
};

/// Errors specific to case-file interpretation.
#[derive(thiserror::Error, Debug)]
pub enum CaseError {
    #[error("parsing case JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("distance entry references unknown station {station}")]
    UnknownDistanceStation { station: usize },

    #[error("distance between stations {from} and {to} must be finite and positive, got {value}")]
    InvalidDistance { from: usize, to: usize, value: f64 },

    #[error("demand entry references unknown station {station}")]
    UnknownDemandStation { station: usize },

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Top-level case document.
#[derive(Debug, Deserialize)]
pub struct CaseFile {
    #[serde(default)]
    pub name: String,
    pub stations: Vec<StationSpec>,
    #[serde(default)]
    pub distances: Vec<DistanceEntry>,
    pub lines: Vec<LineSpec>,
    #[serde(default)]
    pub demand: Vec<DemandEntry>,
}

/// One symmetric station-to-station distance.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DistanceEntry {
    pub from: usize,
    pub to: usize,
    pub distance: f64,
}

/// One origin-destination demand triple.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DemandEntry {
    pub origin: usize,
    pub destination: usize,
    pub flow: f64,
}

/// A fully interpreted case.
#[derive(Debug)]
pub struct CaseImport {
    pub name: String,
    pub network: Network,
    pub demand: DemandMatrix,
    pub diagnostics: Diagnostics,
}

/// Parse a case from a JSON string.
pub fn parse_case_str(content: &str) -> Result<CaseImport, CaseError> {
    let case: CaseFile = serde_json::from_str(content)?;
    build_case(case)
}

/// Interpret an already deserialized case document.
pub fn build_case(case: CaseFile) -> Result<CaseImport, CaseError> {
    let station_count = case.stations.len();

    let mut distances = DistanceMatrix::new(station_count);
    for entry in &case.distances {
        if entry.from >= station_count {
            return Err(CaseError::UnknownDistanceStation {
                station: entry.from,
            });
        }
        if entry.to >= station_count {
            return Err(CaseError::UnknownDistanceStation { station: entry.to });
        }
        if !entry.distance.is_finite() || entry.distance <= 0.0 {
            return Err(CaseError::InvalidDistance {
                from: entry.from,
                to: entry.to,
                value: entry.distance,
            });
        }
        distances.set(entry.from, entry.to, entry.distance);
    }

    let (network, diagnostics) = Network::build(distances, case.stations, case.lines)?;

    let mut demand = DemandMatrix::new();
    for entry in &case.demand {
        if entry.origin >= station_count {
            return Err(CaseError::UnknownDemandStation {
                station: entry.origin,
            });
        }
        if entry.destination >= station_count {
            return Err(CaseError::UnknownDemandStation {
                station: entry.destination,
            });
        }
        demand.set(
            StationId::new(entry.origin),
            StationId::new(entry.destination),
            entry.flow,
        )?;
    }

    Ok(CaseImport {
        name: case.name,
        network,
        demand,
        diagnostics,
    })
}

/// Load a case from a path.
pub fn load_case<P: AsRef<Path>>(path: P) -> anyhow::Result<CaseImport> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading case file: {:?}", path.as_ref()))?;
    let case = parse_case_str(&content)
        .with_context(|| format!("loading case file: {:?}", path.as_ref()))?;
    Ok(case)
}
