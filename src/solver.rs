use crate::graph::{CapacityGraph, EdgeId};
use crate::solution::FlowInt;
use anyhow::{ensure, Result};
use tracing::trace;

/// Maximum flow oracle over an owned capacity graph.
///
/// A solver is built per evaluation: edges are inserted through it and `max_flow`
/// starts from a zero flow on every call, so repeated calls return the same value.
pub trait FlowSolver<F: FlowInt> {
    fn from_graph(graph: CapacityGraph<F>) -> Self
    where
        Self: Sized;

    fn graph(&self) -> &CapacityGraph<F>;
    fn graph_mut(&mut self) -> &mut CapacityGraph<F>;

    /// Returns the value of a maximum `source -> sink` flow and leaves that flow on the graph.
    fn max_flow(&mut self, source: usize, sink: usize) -> Result<F>;

    fn new(num_nodes: usize) -> Self
    where
        Self: Sized,
    {
        Self::from_graph(CapacityGraph::new(num_nodes))
    }

    #[inline]
    fn num_nodes(&self) -> usize {
        self.graph().num_nodes()
    }

    #[inline]
    fn add_edge(&mut self, u: usize, v: usize, capacity: F) -> EdgeId {
        self.graph_mut().add_edge(u, v, capacity)
    }

    #[inline]
    fn add_edge_with_cost(&mut self, u: usize, v: usize, capacity: F, cost: F) -> EdgeId {
        self.graph_mut().add_edge_with_cost(u, v, capacity, cost)
    }

    fn validate_terminals(&self, source: usize, sink: usize) -> Result<()> {
        let n = self.num_nodes();
        ensure!(source < n && sink < n, "terminals {} -> {} outside of {} nodes", source, sink, n);
        ensure!(source != sink, "source and sink coincide at {}", source);
        Ok(())
    }

    /// Asserts that `flow` fits the terminal capacities and that every inner node conserves flow.
    fn check_conservation(&self, source: usize, sink: usize, flow: F) {
        let graph = self.graph();
        assert!(flow >= F::zero(), "negative flow {}", flow);
        assert!(
            flow <= graph.out_capacity(source),
            "flow {} exceeds source capacity {}",
            flow,
            graph.out_capacity(source)
        );
        assert!(
            flow <= graph.in_capacity(sink),
            "flow {} exceeds sink capacity {}",
            flow,
            graph.in_capacity(sink)
        );
        if cfg!(debug_assertions) {
            for u in (0..graph.num_nodes()).filter(|&u| u != source && u != sink) {
                debug_assert!(graph.net_outflow(u) == F::zero(), "node {} leaks flow", u);
            }
        }
        trace!("conservation holds for flow {}", flow);
    }
}
