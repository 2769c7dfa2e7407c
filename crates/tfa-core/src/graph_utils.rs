//! Station-level connectivity over the line topology.
//!
//! The circuit formulation has no notion of "unreachable"; posing a problem
//! for a disconnected pair just produces an unbounded objective. These
//! helpers give callers a cheap structural screen before any solve.

use std::collections::{HashSet, VecDeque};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::{LineId, Network, StationId};

/// Directed station-to-station service topology.
///
/// One node per station and one edge per direction a line runs between
/// consecutive stops. Lines always run both ways, so the graph is
/// symmetric today; keeping it directed leaves room for one-way services.
#[derive(Debug)]
pub struct ServiceGraph {
    graph: DiGraph<StationId, LineId>,
    nodes: Vec<NodeIndex>,
}

impl ServiceGraph {
    pub fn from_network(network: &Network) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = network
            .stations()
            .iter()
            .map(|station| graph.add_node(station.id))
            .collect();
        for line in network.lines() {
            for window in line.stations.windows(2) {
                let (a, b) = (window[0], window[1]);
                graph.add_edge(nodes[a.value()], nodes[b.value()], line.id);
                graph.add_edge(nodes[b.value()], nodes[a.value()], line.id);
            }
        }
        Self { graph, nodes }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether any sequence of line segments leads from `origin` to
    /// `destination`.
    pub fn is_reachable(&self, origin: StationId, destination: StationId) -> bool {
        match (
            self.nodes.get(origin.value()),
            self.nodes.get(destination.value()),
        ) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }

    /// All stations reachable from `origin`, including itself.
    pub fn reachable_from(&self, origin: StationId) -> HashSet<StationId> {
        let mut reached = HashSet::new();
        let start = match self.nodes.get(origin.value()) {
            Some(&start) => start,
            None => return reached,
        };
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            reached.insert(self.graph[node]);
        }
        reached
    }
}

/// Stations grouped by connected component of the service graph.
#[derive(Debug)]
pub struct IslandSummary {
    pub island_id: usize,
    pub stations: Vec<StationId>,
}

/// Labels connected components (breadth-first search) of the service
/// topology. Unserved stations come out as singleton islands.
pub fn find_islands(network: &Network) -> Vec<IslandSummary> {
    let service = ServiceGraph::from_network(network);
    let mut visited = HashSet::new();
    let mut islands = Vec::new();
    let mut island_id = 0;
    for start in service.graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(service.graph[node]);
            for neighbor in service.graph.neighbors_undirected(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        members.sort();
        islands.push(IslandSummary {
            island_id,
            stations: members,
        });
        island_id += 1;
    }
    islands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DistanceMatrix, LineSpec, StationSpec};

    /// Line 0 over stations 0-1-2, line 1 over 3-4, station 5 unserved.
    fn split_network() -> Network {
        let mut distances = DistanceMatrix::new(6);
        distances.set(0, 1, 10.0);
        distances.set(1, 2, 10.0);
        distances.set(3, 4, 5.0);
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
                stations: vec![3, 4],
                speed: 10.0,
                frequency: Some(2.0),
                headway: None,
            },
        ];
        let (network, _) = Network::build(distances, stations, lines).unwrap();
        network
    }

    #[test]
    fn test_reachability() {
        let network = split_network();
        let service = ServiceGraph::from_network(&network);

        assert_eq!(service.node_count(), 6);
        assert_eq!(service.edge_count(), 6);

        assert!(service.is_reachable(StationId::new(0), StationId::new(2)));
        assert!(service.is_reachable(StationId::new(2), StationId::new(0)));
        assert!(service.is_reachable(StationId::new(4), StationId::new(3)));
        assert!(!service.is_reachable(StationId::new(0), StationId::new(4)));
        assert!(!service.is_reachable(StationId::new(0), StationId::new(5)));
        assert!(!service.is_reachable(StationId::new(0), StationId::new(9)));
    }

    #[test]
    fn test_reachable_from() {
        let network = split_network();
        let service = ServiceGraph::from_network(&network);

        let reached = service.reachable_from(StationId::new(1));
        assert_eq!(reached.len(), 3);
        assert!(reached.contains(&StationId::new(0)));
        assert!(reached.contains(&StationId::new(2)));
        assert!(!reached.contains(&StationId::new(3)));

        let isolated = service.reachable_from(StationId::new(5));
        assert_eq!(isolated.len(), 1);

        assert!(service.reachable_from(StationId::new(9)).is_empty());
    }

    #[test]
    fn test_find_islands() {
        let network = split_network();
        let islands = find_islands(&network);
        assert_eq!(islands.len(), 3);
        assert_eq!(islands[0].stations, vec![StationId::new(0), StationId::new(1), StationId::new(2)]);
        assert_eq!(islands[1].stations, vec![StationId::new(3), StationId::new(4)]);
        assert_eq!(islands[2].stations, vec![StationId::new(5)]);
        assert_eq!(islands[2].island_id, 2);
    }
}
