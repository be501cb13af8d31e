use crate::graph::{CapacityGraph, EdgeId};
use crate::solution::{FlowInt, FlowSolution};
use crate::solver::FlowSolver;
use anyhow::{bail, Result};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Min-cost max-flow by successive shortest augmenting paths
///
/// Each round finds a cheapest `source -> sink` path in the residual graph with a
/// queue-based Bellman-Ford (negative costs on reverse edges are fine) and saturates
/// its bottleneck. Augmenting along cheapest paths only keeps the flow cost-minimal
/// for its value, so the final flow is the cheapest maximum flow.
#[derive(Clone, Debug)]
pub struct SuccessiveShortestPath<F: FlowInt> {
    graph: CapacityGraph<F>,
    distance: Vec<Option<F>>,
    parent_edge: Vec<Option<EdgeId>>,
    in_queue: Vec<bool>,
    // times a vertex entered the queue in the current search
    visits: Vec<usize>,

    pub naugmentations: u32,
}

impl<F: FlowInt> FlowSolver<F> for SuccessiveShortestPath<F> {
    fn from_graph(graph: CapacityGraph<F>) -> Self {
        let n = graph.num_nodes();
        Self {
            graph,
            distance: Vec::with_capacity(n),
            parent_edge: Vec::with_capacity(n),
            in_queue: Vec::with_capacity(n),
            visits: Vec::with_capacity(n),
            naugmentations: 0,
        }
    }

    fn graph(&self) -> &CapacityGraph<F> {
        &self.graph
    }
    fn graph_mut(&mut self) -> &mut CapacityGraph<F> {
        &mut self.graph
    }

    #[inline]
    fn max_flow(&mut self, source: usize, sink: usize) -> Result<F> {
        Ok(self.min_cost_max_flow(source, sink)?.flow)
    }
}

impl<F: FlowInt> SuccessiveShortestPath<F> {
    /// Returns the maximum flow value together with the minimum cost at that value.
    pub fn min_cost_max_flow(&mut self, source: usize, sink: usize) -> Result<FlowSolution<F>> {
        self.validate_terminals(source, sink)?;
        self.graph.reset_flow();
        self.naugmentations = 0;

        let mut solution = FlowSolution {
            flow: F::zero(),
            cost: F::zero(),
        };

        while self.shortest_path(source, sink)? {
            let path_cost = match self.distance[sink] {
                Some(d) => d,
                None => break,
            };

            let mut bottleneck = F::max_value();
            let mut v = sink;
            while let Some(e) = self.parent_edge[v] {
                let edge = self.graph.edge(e);
                bottleneck = bottleneck.min(edge.residual());
                v = edge.from;
            }
            debug_assert!(bottleneck > F::zero());

            let mut v = sink;
            while let Some(e) = self.parent_edge[v] {
                self.graph.push(e, bottleneck);
                v = self.graph.edge(e).from;
            }

            solution.flow += bottleneck;
            solution.cost += bottleneck * path_cost;
            self.naugmentations += 1;
            trace!(
                "augment {} along path of cost {}, flow {}",
                bottleneck,
                path_cost,
                solution.flow
            );
        }

        self.check_conservation(source, sink, solution.flow);
        debug_assert!(solution.cost == self.graph.flow_cost());
        debug!(
            "min cost flow {} cost {} after {} augmentations",
            solution.flow, solution.cost, self.naugmentations
        );
        Ok(solution)
    }

    /// Queue-based Bellman-Ford from `source`, returns whether `sink` is reachable.
    fn shortest_path(&mut self, source: usize, sink: usize) -> Result<bool> {
        let n = self.graph.num_nodes();
        self.distance.clear();
        self.distance.resize(n, None);
        self.parent_edge.clear();
        self.parent_edge.resize(n, None);
        self.in_queue.clear();
        self.in_queue.resize(n, false);
        self.visits.clear();
        self.visits.resize(n, 0);

        let mut queue = VecDeque::with_capacity(n);
        self.distance[source] = Some(F::zero());
        queue.push_back(source);
        self.in_queue[source] = true;

        while let Some(u) = queue.pop_front() {
            self.in_queue[u] = false;
            let du = match self.distance[u] {
                Some(d) => d,
                None => continue,
            };
            for &e in self.graph.out_edges(u) {
                let edge = self.graph.edge(e);
                if edge.residual() <= F::zero() {
                    continue;
                }
                let candidate = du + edge.cost;
                let improves = match self.distance[edge.to] {
                    Some(dv) => candidate < dv,
                    None => true,
                };
                if !improves {
                    continue;
                }
                self.distance[edge.to] = Some(candidate);
                self.parent_edge[edge.to] = Some(e);
                if !self.in_queue[edge.to] {
                    self.visits[edge.to] += 1;
                    if self.visits[edge.to] > n {
                        bail!("negative cost cycle reachable from source {}", source);
                    }
                    self.in_queue[edge.to] = true;
                    queue.push_back(edge.to);
                }
            }
        }
        Ok(self.distance[sink].is_some())
    }
}
