//! End-to-end assignment tests on small reference networks.
//!
//! Tests cover:
//! - Potential gaps and link flows on a single line
//! - Transfers between crossing lines
//! - Route splitting across parallel paths on a grid
//! - Superposition of several demand pairs
//! - Service rate updates, idempotent reruns, and failure handling

use tfa_algo::test_utils::{cross_network, cross_single_line, grid_network};
use tfa_algo::{assign, solve_pair, AssignError, AssignOptions, SolveError, SolveOptions};
use tfa_core::{
    DemandMatrix, Direction, DistanceMatrix, LineId, LineSpec, Network, NetworkError, ServiceRate,
    StationId, StationSpec,
};

/// Two three-stop lines with no stations in common, so nothing connects
/// the 0-1-2 island to the 3-4-5 island.
fn split_network() -> Network {
    let mut distances = DistanceMatrix::new(6);
    distances.set(0, 1, 10.0);
    distances.set(1, 2, 10.0);
    distances.set(3, 4, 10.0);
    distances.set(4, 5, 10.0);
    let stations = (0..6).map(|id| StationSpec { id, coords: None }).collect();
    let lines = vec![
        LineSpec {
            id: 0,
            stations: vec![0, 1, 2],
            speed: 10.0,
            frequency: Some(1.0),
            headway: None,
        },
        LineSpec {
            id: 1,
            stations: vec![3, 4, 5],
            speed: 10.0,
            frequency: Some(1.0),
            headway: None,
        },
    ];
    let (network, _) =
        Network::build(distances, stations, lines).expect("split network should build");
    network
}

#[test]
fn test_single_line_gap_and_flows() {
    let mut network = cross_single_line().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");

    assert!(report.is_complete());
    assert_eq!(report.pairs.len(), 1);
    // Waiting (1/2) plus riding 0->1 (1.0) and 1->2 (0.8) at 10 riders.
    let gap = report.pairs[0].potential_gap;
    assert!((gap - 23.0).abs() < 1e-3, "potential gap was {}", gap);

    let line = LineId::new(0);
    let fwd0 = network
        .segment_flow(StationId::new(0), line, Direction::Forward)
        .unwrap();
    let fwd1 = network
        .segment_flow(StationId::new(1), line, Direction::Forward)
        .unwrap();
    assert!((fwd0 - 10.0).abs() < 1e-3, "flow leaving 0 was {}", fwd0);
    assert!((fwd1 - 10.0).abs() < 1e-3, "flow leaving 1 was {}", fwd1);
    // The forward terminus has no outgoing segment.
    assert!(network
        .segment_flow(StationId::new(2), line, Direction::Forward)
        .is_none());
    // Nothing rides against the demand.
    let bwd1 = network
        .segment_flow(StationId::new(1), line, Direction::Backward)
        .unwrap();
    assert!(bwd1.abs() < 1e-3, "backward flow was {}", bwd1);
}

#[test]
fn test_solve_pair_potentials() {
    let mut network = cross_single_line().expect("network should build");
    network
        .ensure_trip(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();

    let pair = solve_pair(
        &network,
        StationId::new(0),
        StationId::new(2),
        &SolveOptions::default(),
    )
    .expect("pair should solve");

    assert!((pair.demand - 10.0).abs() < 1e-12);
    assert!((pair.potential_gap - 23.0).abs() < 1e-3);

    let trip = network.trip(StationId::new(0), StationId::new(2)).unwrap();
    let origin = pair.solution.potential(trip.origin_node()).unwrap();
    let destination = pair.solution.potential(trip.destination_node()).unwrap();
    assert!(origin.abs() < 1e-6, "origin should be grounded, was {}", origin);
    assert!((destination + 23.0).abs() < 1e-3);
}

#[test]
fn test_single_line_direction_symmetry() {
    let mut network = cross_single_line().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();
    demand
        .set(StationId::new(2), StationId::new(0), 10.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");

    assert_eq!(report.pairs.len(), 2);
    // The line is symmetric, so both directions cost the same.
    let gap_out = report.pairs[0].potential_gap;
    let gap_back = report.pairs[1].potential_gap;
    assert!((gap_out - gap_back).abs() < 1e-3);

    let line = LineId::new(0);
    let fwd = network
        .segment_flow(StationId::new(0), line, Direction::Forward)
        .unwrap();
    let bwd = network
        .segment_flow(StationId::new(2), line, Direction::Backward)
        .unwrap();
    assert!((fwd - 10.0).abs() < 1e-3);
    assert!((bwd - 10.0).abs() < 1e-3);
}

#[test]
fn test_cross_transfer_gap() {
    let mut network = cross_network().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(4), 20.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");

    // Wait 1/2, ride 0->1 (1.0), transfer to the fast line (1/4), ride
    // 1->4 (0.2), all at 20 riders.
    let gap = report.pairs[0].potential_gap;
    assert!((gap - 39.0).abs() < 1e-3, "potential gap was {}", gap);

    let slow = LineId::new(0);
    let fast = LineId::new(1);
    let leave_origin = network
        .segment_flow(StationId::new(0), slow, Direction::Forward)
        .unwrap();
    let after_transfer = network
        .segment_flow(StationId::new(1), fast, Direction::Forward)
        .unwrap();
    assert!((leave_origin - 20.0).abs() < 1e-3);
    assert!((after_transfer - 20.0).abs() < 1e-3);
    // Nobody stays on the slow line past the interchange.
    let past_interchange = network
        .segment_flow(StationId::new(1), slow, Direction::Forward)
        .unwrap();
    assert!(past_interchange.abs() < 1e-3);
}

#[test]
fn test_cross_superposition() {
    let mut network = cross_network().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(4), 20.0)
        .unwrap();
    demand
        .set(StationId::new(3), StationId::new(2), 7.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");

    assert!(report.is_complete());
    assert!((report.total_demand - 27.0).abs() < 1e-12);
    assert!((report.assigned_demand - 27.0).abs() < 1e-12);

    let by_pair = |origin: usize, destination: usize| {
        report
            .pairs
            .iter()
            .find(|p| {
                p.origin == StationId::new(origin) && p.destination == StationId::new(destination)
            })
            .expect("pair should be in report")
            .potential_gap
    };
    assert!((by_pair(0, 4) - 39.0).abs() < 1e-3);
    // Wait 1/4, ride 3->1 (0.25), transfer to the slow line (1/2), ride
    // 1->2 (0.8), at 7 riders.
    assert!((by_pair(3, 2) - 12.6).abs() < 1e-3);

    // The two pairs use disjoint segments; each shows only its own flow.
    let slow = LineId::new(0);
    let fast = LineId::new(1);
    let flows = [
        (StationId::new(0), slow, 20.0),
        (StationId::new(1), fast, 20.0),
        (StationId::new(3), fast, 7.0),
        (StationId::new(1), slow, 7.0),
    ];
    for (station, line, expected) in flows {
        let flow = network
            .segment_flow(station, line, Direction::Forward)
            .unwrap();
        assert!(
            (flow - expected).abs() < 1e-3,
            "flow leaving {} on line {} was {}, expected {}",
            station,
            line,
            flow,
            expected
        );
    }
}

#[test]
fn test_grid_even_split_across_parallel_routes() {
    let mut network = grid_network().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(2), StationId::new(8), 20.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");

    // Two routes of equal cost 2.1 from the first interchange, on top of
    // access (0.05) and the ride 2->3 (1.0).
    let gap = report.pairs[0].potential_gap;
    assert!((gap - 42.0).abs() < 1e-3, "potential gap was {}", gap);

    let feeder = network
        .segment_flow(StationId::new(2), LineId::new(2), Direction::Forward)
        .unwrap();
    assert!((feeder - 20.0).abs() < 1e-3);

    // Half rides via line 0 and line 3, half stays on line 2 then line 1.
    let via_line0 = network
        .segment_flow(StationId::new(3), LineId::new(0), Direction::Forward)
        .unwrap();
    let via_line2 = network
        .segment_flow(StationId::new(3), LineId::new(2), Direction::Forward)
        .unwrap();
    assert!((via_line0 - 10.0).abs() < 1e-3, "line 0 carried {}", via_line0);
    assert!((via_line2 - 10.0).abs() < 1e-3, "line 2 carried {}", via_line2);

    let into_8_on_3 = network
        .segment_flow(StationId::new(7), LineId::new(3), Direction::Forward)
        .unwrap();
    let into_8_on_1 = network
        .segment_flow(StationId::new(4), LineId::new(1), Direction::Forward)
        .unwrap();
    assert!((into_8_on_3 - 10.0).abs() < 1e-3);
    assert!((into_8_on_1 - 10.0).abs() < 1e-3);
}

#[test]
fn test_grid_split_follows_conductance() {
    let mut network = grid_network().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(2), StationId::new(7), 20.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");

    // Branches of resistance 1.05 and 3.15 in parallel (0.7875), after
    // access (0.05) and the ride 2->3 (1.0).
    let gap = report.pairs[0].potential_gap;
    assert!((gap - 36.75).abs() < 1e-3, "potential gap was {}", gap);

    // The direct branch carries three quarters of the demand.
    let direct = network
        .segment_flow(StationId::new(3), LineId::new(0), Direction::Forward)
        .unwrap();
    let detour = network
        .segment_flow(StationId::new(3), LineId::new(2), Direction::Forward)
        .unwrap();
    assert!((direct - 15.0).abs() < 1e-3, "direct branch carried {}", direct);
    assert!((detour - 5.0).abs() < 1e-3, "detour branch carried {}", detour);

    // The detour rides line 1 to station 8, then line 3 backwards.
    let via_line1 = network
        .segment_flow(StationId::new(4), LineId::new(1), Direction::Forward)
        .unwrap();
    let back_on_line3 = network
        .segment_flow(StationId::new(8), LineId::new(3), Direction::Backward)
        .unwrap();
    assert!((via_line1 - 5.0).abs() < 1e-3);
    assert!((back_on_line3 - 5.0).abs() < 1e-3);
}

#[test]
fn test_assign_rerun_replaces_flows() {
    let mut network = cross_single_line().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();
    let options = AssignOptions {
        record_trip_flows: true,
        ..AssignOptions::default()
    };

    assign(&mut network, &demand, &options).expect("first run should succeed");
    assign(&mut network, &demand, &options).expect("second run should succeed");

    // Rerunning replaces the recorded state instead of stacking it.
    let flow = network
        .segment_flow(StationId::new(0), LineId::new(0), Direction::Forward)
        .unwrap();
    assert!((flow - 10.0).abs() < 1e-3, "flow was {}", flow);

    let flows = network
        .trip_flows(StationId::new(0), StationId::new(2))
        .expect("per-trip flows should be recorded");
    assert_eq!(flows.len(), 4);
    let outbound: f64 = flows.iter().map(|f| f.flow).sum();
    assert!((outbound - 20.0).abs() < 1e-3);
    let at_origin = flows
        .iter()
        .find(|f| f.station == StationId::new(0) && f.direction == Direction::Forward)
        .expect("origin segment should be present");
    assert!((at_origin.flow - 10.0).abs() < 1e-3);
}

#[test]
fn test_trip_flow_queries_require_recording() {
    let mut network = cross_single_line().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();

    assign(&mut network, &demand, &AssignOptions::default()).expect("assignment should succeed");

    let err = network
        .trip_flows(StationId::new(0), StationId::new(2))
        .unwrap_err();
    assert!(matches!(err, NetworkError::FlowsNotRecorded { .. }));

    let err = network
        .trip_flows(StationId::new(0), StationId::new(1))
        .unwrap_err();
    assert!(matches!(err, NetworkError::TripNotFound { .. }));
}

#[test]
fn test_service_rate_update_changes_cost() {
    let mut network = cross_single_line().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");
    assert!((report.pairs[0].potential_gap - 23.0).abs() < 1e-3);

    // Doubling the frequency halves the expected wait at the origin.
    network
        .update_service_rate(LineId::new(0), ServiceRate::Frequency(2.0))
        .unwrap();
    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("assignment should succeed");
    let gap = report.pairs[0].potential_gap;
    assert!((gap - 20.5).abs() < 1e-3, "potential gap was {}", gap);
}

#[test]
fn test_unreachable_pair_lenient() {
    let mut network = split_network();
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();
    demand
        .set(StationId::new(0), StationId::new(4), 5.0)
        .unwrap();

    let report = assign(&mut network, &demand, &AssignOptions::default())
        .expect("lenient assignment should not abort");

    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(!report.is_complete());
    assert!((report.assigned_demand - 10.0).abs() < 1e-12);
    assert!((report.total_demand - 15.0).abs() < 1e-12);
    let failure = &report.failures[0];
    assert_eq!(failure.destination, StationId::new(4));
    assert!(
        failure.message.contains("not reachable"),
        "message was {:?}",
        failure.message
    );
}

#[test]
fn test_unreachable_pair_strict() {
    let mut network = split_network();
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();
    demand
        .set(StationId::new(0), StationId::new(4), 5.0)
        .unwrap();
    let options = AssignOptions {
        strict: true,
        ..AssignOptions::default()
    };

    let err = assign(&mut network, &demand, &options).unwrap_err();
    match err {
        AssignError::Pair {
            origin,
            destination,
            source,
        } => {
            assert_eq!(origin, StationId::new(0));
            assert_eq!(destination, StationId::new(4));
            assert!(matches!(source, SolveError::Unreachable { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unreachable_surfaces_at_solver_without_screen() {
    let mut network = split_network();
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(2), 10.0)
        .unwrap();
    demand
        .set(StationId::new(0), StationId::new(4), 5.0)
        .unwrap();
    let options = AssignOptions {
        check_reachability: false,
        ..AssignOptions::default()
    };

    let report = assign(&mut network, &demand, &options)
        .expect("lenient assignment should not abort");

    // Without the screen the disconnected pair reaches Clarabel, whose
    // failure lands in the report instead.
    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].destination, StationId::new(4));
}

#[test]
fn test_strict_assign_completes_when_all_pairs_solve() {
    let mut network = cross_network().expect("network should build");
    let mut demand = DemandMatrix::new();
    demand
        .set(StationId::new(0), StationId::new(4), 20.0)
        .unwrap();
    demand
        .set(StationId::new(3), StationId::new(2), 7.0)
        .unwrap();
    let options = AssignOptions {
        strict: true,
        ..AssignOptions::default()
    };

    let report = assign(&mut network, &demand, &options).expect("strict run should succeed");
    assert!(report.is_complete());
    assert_eq!(report.pairs.len(), 2);
}
