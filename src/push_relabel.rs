use crate::graph::{CapacityGraph, EdgeId};
use crate::solution::FlowInt;
use crate::solver::FlowSolver;
use anyhow::Result;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Maximum flow by FIFO preflow-push with gap relabeling
///
/// Every vertex keeps a height label; excess is pushed along admissible residual edges
/// (`height[u] == height[v] + 1`) and a vertex is relabeled once none is left.
/// When the last vertex of some height is relabeled, everything above the gap is lifted
/// over the source so its excess drains back.
#[derive(Clone, Debug)]
pub struct PushRelabel<F: FlowInt> {
    graph: CapacityGraph<F>,
    excess: Vec<F>,
    height: Vec<usize>,
    // number of vertices at each height, heights are below 2n
    height_count: Vec<usize>,
    active: Vec<bool>,
    queue: VecDeque<usize>,

    pub npushes: u64,
    pub nrelabels: u64,
    pub ngaps: u64,
}

impl<F: FlowInt> FlowSolver<F> for PushRelabel<F> {
    fn from_graph(graph: CapacityGraph<F>) -> Self {
        let n = graph.num_nodes();
        Self {
            graph,
            excess: Vec::with_capacity(n),
            height: Vec::with_capacity(n),
            height_count: Vec::with_capacity(2 * n),
            active: Vec::with_capacity(n),
            queue: VecDeque::with_capacity(n),
            npushes: 0,
            nrelabels: 0,
            ngaps: 0,
        }
    }

    fn graph(&self) -> &CapacityGraph<F> {
        &self.graph
    }
    fn graph_mut(&mut self) -> &mut CapacityGraph<F> {
        &mut self.graph
    }

    fn max_flow(&mut self, source: usize, sink: usize) -> Result<F> {
        self.validate_terminals(source, sink)?;
        self.init_solve(source, sink);

        // saturate every edge leaving the source
        for idx in 0..self.graph.out_edges(source).len() {
            let e = self.graph.out_edges(source)[idx];
            let residual = self.graph.edge(e).residual();
            if residual > F::zero() {
                self.excess[source] += residual;
                self.push(e);
            }
        }

        while let Some(u) = self.queue.pop_front() {
            self.active[u] = false;
            self.discharge(u);
        }

        let flow = self.excess[sink];
        self.check_conservation(source, sink, flow);
        debug!(
            "max flow {} after {} pushes, {} relabels, {} gaps",
            flow, self.npushes, self.nrelabels, self.ngaps
        );
        Ok(flow)
    }
}

impl<F: FlowInt> PushRelabel<F> {
    fn init_solve(&mut self, source: usize, sink: usize) {
        let n = self.graph.num_nodes();
        self.graph.reset_flow();

        self.excess.clear();
        self.excess.resize(n, F::zero());
        self.height.clear();
        self.height.resize(n, 0);
        self.height_count.clear();
        self.height_count.resize(2 * n, 0);
        self.active.clear();
        self.active.resize(n, false);
        self.queue.clear();

        self.npushes = 0;
        self.nrelabels = 0;
        self.ngaps = 0;

        self.height[source] = n;
        self.height_count[0] = n - 1;
        self.height_count[n] = 1;
        // terminals never enter the queue
        self.active[source] = true;
        self.active[sink] = true;
    }

    #[inline]
    fn enqueue(&mut self, u: usize) {
        if !self.active[u] && self.excess[u] > F::zero() {
            self.active[u] = true;
            self.queue.push_back(u);
        }
    }

    #[inline]
    fn push(&mut self, e: EdgeId) {
        let edge = *self.graph.edge(e);
        let amount = self.excess[edge.from].min(edge.residual());
        if amount <= F::zero() {
            return;
        }
        self.graph.push(e, amount);
        self.excess[edge.from] -= amount;
        self.excess[edge.to] += amount;
        self.npushes += 1;
        self.enqueue(edge.to);
    }

    fn discharge(&mut self, u: usize) {
        for idx in 0..self.graph.out_edges(u).len() {
            if self.excess[u] <= F::zero() {
                break;
            }
            let e = self.graph.out_edges(u)[idx];
            let to = self.graph.edge(e).to;
            if self.height[u] == self.height[to] + 1 {
                self.push(e);
            }
        }

        if self.excess[u] > F::zero() {
            if self.height_count[self.height[u]] == 1 {
                self.gap(self.height[u]);
            } else {
                self.relabel(u);
            }
        }
    }

    fn relabel(&mut self, u: usize) {
        let n = self.graph.num_nodes();
        self.height_count[self.height[u]] -= 1;
        let mut lowest = 2 * n - 1;
        for &e in self.graph.out_edges(u) {
            let edge = self.graph.edge(e);
            if edge.residual() > F::zero() {
                lowest = lowest.min(self.height[edge.to] + 1);
            }
        }
        self.height[u] = lowest;
        self.height_count[lowest] += 1;
        self.nrelabels += 1;
        trace!("relabel {} to {}", u, lowest);
        self.enqueue(u);
    }

    /// No vertex is left at height `k`: vertices at or above it cannot reach the sink.
    fn gap(&mut self, k: usize) {
        let n = self.graph.num_nodes();
        self.ngaps += 1;
        trace!("gap at height {}", k);
        for u in 0..n {
            if self.height[u] < k {
                continue;
            }
            self.height_count[self.height[u]] -= 1;
            self.height[u] = self.height[u].max(n + 1);
            self.height_count[self.height[u]] += 1;
            self.enqueue(u);
        }
    }
}
