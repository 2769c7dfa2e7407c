//! Shared network fixtures for unit and integration tests.

use tfa_core::{DistanceMatrix, LineSpec, Network, NetworkError, StationSpec};

fn stations(count: usize) -> Vec<StationSpec> {
    (0..count)
        .map(|id| StationSpec { id, coords: None })
        .collect()
}

fn line(id: usize, stops: &[usize], speed: f64, frequency: f64) -> LineSpec {
    LineSpec {
        id,
        stations: stops.to_vec(),
        speed,
        frequency: Some(frequency),
        headway: None,
    }
}

/// Distances of the five-station cross: station 1 in the middle, arms to
/// 0, 2, 3, and 4.
pub fn cross_distances() -> DistanceMatrix {
    let mut distances = DistanceMatrix::new(5);
    distances.set(0, 1, 10.0);
    distances.set(1, 2, 8.0);
    distances.set(1, 3, 5.0);
    distances.set(1, 4, 4.0);
    distances
}

/// Two lines crossing at station 1: a slow east-west line 0-1-2 and a
/// fast north-south line 3-1-4.
pub fn cross_network() -> Result<Network, NetworkError> {
    let lines = vec![
        line(0, &[0, 1, 2], 10.0, 1.0),
        line(1, &[3, 1, 4], 20.0, 2.0),
    ];
    let (network, _) = Network::build(cross_distances(), stations(5), lines)?;
    Ok(network)
}

/// Only the east-west line of the cross, leaving stations 3 and 4
/// unserved.
pub fn cross_single_line() -> Result<Network, NetworkError> {
    let lines = vec![line(0, &[0, 1, 2], 10.0, 1.0)];
    let (network, _) = Network::build(cross_distances(), stations(5), lines)?;
    Ok(network)
}

/// A twelve-station grid with four lines meeting at stations 3, 4, 7,
/// and 8, giving parallel routes between most pairs.
pub fn grid_network() -> Result<Network, NetworkError> {
    let mut distances = DistanceMatrix::new(12);
    for &(a, b) in &[
        (3, 0),
        (3, 2),
        (3, 4),
        (3, 7),
        (4, 1),
        (4, 5),
        (4, 8),
        (7, 6),
        (7, 8),
        (7, 10),
        (8, 9),
        (8, 11),
    ] {
        distances.set(a, b, 10.0);
    }

    let lines = vec![
        line(0, &[0, 3, 7, 10], 10.0, 10.0),
        line(1, &[1, 4, 8, 11], 10.0, 5.0),
        line(2, &[2, 3, 4, 5], 10.0, 10.0),
        line(3, &[6, 7, 8, 9], 10.0, 10.0),
    ];
    let (network, _) = Network::build(distances, stations(12), lines)?;
    Ok(network)
}
