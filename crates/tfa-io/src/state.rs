//! Write-only JSON exports of network state and realized flows.
//!
//! These documents are for people and downstream tooling. Nothing here
//! is ever read back into a live network.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use tfa_core::{Coords, LineId, Network, SegmentFlow, StationId};

/// Snapshot of one station.
#[derive(Debug, Clone, Serialize)]
pub struct StationState {
    pub id: StationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coords>,
    pub lines: Vec<LineId>,
}

/// Snapshot of one line with its resolved frequency.
#[derive(Debug, Clone, Serialize)]
pub struct LineState {
    pub id: LineId,
    pub stations: Vec<StationId>,
    pub speed: f64,
    pub frequency: f64,
}

/// One wired trip's demand.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TripState {
    pub origin: StationId,
    pub destination: StationId,
    pub demand: f64,
}

/// The full state document.
#[derive(Debug, Serialize)]
pub struct NetworkState {
    pub generated_at: DateTime<Utc>,
    pub name: String,
    pub stations: Vec<StationState>,
    pub lines: Vec<LineState>,
    pub trips: Vec<TripState>,
}

impl NetworkState {
    /// Capture the network's current state under a document name.
    pub fn capture(name: &str, network: &Network) -> Self {
        let stations = network
            .stations()
            .iter()
            .map(|station| StationState {
                id: station.id,
                coords: station.coords,
                lines: station.lines().collect(),
            })
            .collect();
        let lines = network
            .lines()
            .iter()
            .map(|line| LineState {
                id: line.id,
                stations: line.stations.clone(),
                speed: line.speed,
                frequency: line.frequency(),
            })
            .collect();
        let trips = network
            .trips()
            .map(|trip| TripState {
                origin: trip.origin(),
                destination: trip.destination(),
                demand: trip.demand(),
            })
            .collect();
        NetworkState {
            generated_at: Utc::now(),
            name: name.to_string(),
            stations,
            lines,
            trips,
        }
    }

    /// Write the document as pretty-printed JSON.
    pub fn to_json(&self, path: &Path) -> anyhow::Result<()> {
        let file =
            File::create(path).with_context(|| format!("creating state export: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("writing state export")?;
        Ok(())
    }

    pub fn to_json_value(&self) -> anyhow::Result<serde_json::Value> {
        serde_json::to_value(self).context("converting state export")
    }
}

/// Aggregate segment flows, one entry per non-terminus segment.
#[derive(Debug, Serialize)]
pub struct FlowDump {
    pub generated_at: DateTime<Utc>,
    pub flows: Vec<SegmentFlow>,
}

impl FlowDump {
    pub fn capture(network: &Network) -> Self {
        FlowDump {
            generated_at: Utc::now(),
            flows: network.segment_flows(),
        }
    }

    /// Write the flows as pretty-printed JSON.
    pub fn to_json(&self, path: &Path) -> anyhow::Result<()> {
        let file =
            File::create(path).with_context(|| format!("creating flow dump: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("writing flow dump")?;
        Ok(())
    }

    pub fn to_json_value(&self) -> anyhow::Result<serde_json::Value> {
        serde_json::to_value(self).context("converting flow dump")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfa_core::{DistanceMatrix, LineSpec, StationSpec};

    #[test]
    fn test_state_covers_network() {
        let mut network = tfa_algo::test_utils::cross_network().unwrap();
        network
            .ensure_trip(StationId::new(0), StationId::new(4), 20.0)
            .unwrap();

        let state = NetworkState::capture("cross", &network);
        assert_eq!(state.stations.len(), 5);
        assert_eq!(state.lines.len(), 2);
        assert_eq!(state.trips.len(), 1);
        assert!((state.trips[0].demand - 20.0).abs() < 1e-12);

        let fast = state
            .lines
            .iter()
            .find(|line| line.id == LineId::new(1))
            .unwrap();
        assert!((fast.frequency - 2.0).abs() < 1e-12);
        assert_eq!(
            fast.stations,
            vec![StationId::new(3), StationId::new(1), StationId::new(4)]
        );

        // Stations without coordinates leave the field out entirely.
        let value = state.to_json_value().unwrap();
        let first = &value["stations"][0];
        assert!(first.get("coords").is_none());
        assert_eq!(first["id"], 0);
    }

    #[test]
    fn test_state_keeps_coordinates() {
        let mut distances = DistanceMatrix::new(2);
        distances.set(0, 1, 10.0);
        let stations = vec![
            StationSpec {
                id: 0,
                coords: Some(Coords { x: 0.0, y: 0.0 }),
            },
            StationSpec {
                id: 1,
                coords: Some(Coords { x: 10.0, y: 0.0 }),
            },
        ];
        let lines = vec![LineSpec {
            id: 0,
            stations: vec![0, 1],
            speed: 10.0,
            frequency: Some(1.0),
            headway: None,
        }];
        let (network, diagnostics) = Network::build(distances, stations, lines).unwrap();
        assert!(!diagnostics.has_issues());

        let value = NetworkState::capture("pair", &network)
            .to_json_value()
            .unwrap();
        assert!((value["stations"][1]["coords"]["x"].as_f64().unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_exports_write_files() {
        let network = tfa_algo::test_utils::cross_network().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let state_path = dir.path().join("state.json");
        NetworkState::capture("cross", &network)
            .to_json(&state_path)
            .unwrap();
        let raw = std::fs::read_to_string(&state_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["name"], "cross");
        assert_eq!(value["stations"].as_array().unwrap().len(), 5);

        let flows_path = dir.path().join("flows.json");
        let dump = FlowDump::capture(&network);
        // Four of the twelve segments are termini with no outgoing link.
        assert_eq!(dump.flows.len(), 8);
        dump.to_json(&flows_path).unwrap();
        let raw = std::fs::read_to_string(&flows_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let first = &value["flows"][0];
        assert!(first["direction"] == "forward" || first["direction"] == "backward");
        assert_eq!(first["flow"], 0.0);
    }
}
