use crate::solution::FlowInt;

pub type EdgeId = usize;

/// Directed edge of a capacity graph.
///
/// Edges are stored in pairs: edge `2k` is the inserted edge and `2k + 1` its reverse
/// residual twin with zero capacity and negated cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge<F: FlowInt> {
    pub from: usize,
    pub to: usize,
    pub capacity: F,
    pub flow: F,
    pub cost: F,
}

impl<F: FlowInt> Edge<F> {
    #[inline]
    pub fn residual(&self) -> F {
        self.capacity - self.flow
    }
}

/// Directed graph with integer capacities and optional integer costs
#[derive(Debug, Clone)]
pub struct CapacityGraph<F: FlowInt> {
    edges: Vec<Edge<F>>,
    adjacency: Vec<Vec<EdgeId>>,
}

impl<F: FlowInt> CapacityGraph<F> {
    pub fn new(num_nodes: usize) -> Self {
        Self::with_capacity(num_nodes, 0)
    }

    pub fn with_capacity(num_nodes: usize, edge_capacity: usize) -> Self {
        Self {
            edges: Vec::with_capacity(2 * edge_capacity),
            adjacency: vec![Vec::new(); num_nodes],
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of inserted edges, reverse twins excluded.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len() / 2
    }

    #[inline]
    pub fn add_edge(&mut self, u: usize, v: usize, capacity: F) -> EdgeId {
        self.add_edge_with_cost(u, v, capacity, F::zero())
    }

    /// Appends `u -> v` and its reverse twin, returns the id of the forward edge.
    pub fn add_edge_with_cost(&mut self, u: usize, v: usize, capacity: F, cost: F) -> EdgeId {
        let n = self.num_nodes();
        assert!(u < n && v < n, "edge {} -> {} outside of {} nodes", u, v, n);
        assert!(capacity >= F::zero(), "negative capacity {}", capacity);

        let id = self.edges.len();
        self.edges.push(Edge {
            from: u,
            to: v,
            capacity,
            flow: F::zero(),
            cost,
        });
        self.edges.push(Edge {
            from: v,
            to: u,
            capacity: F::zero(),
            flow: F::zero(),
            cost: -cost,
        });
        self.adjacency[u].push(id);
        self.adjacency[v].push(id + 1);
        id
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> &Edge<F> {
        &self.edges[id]
    }

    #[inline]
    pub fn twin(id: EdgeId) -> EdgeId {
        id ^ 1
    }

    /// Ids of all residual edges leaving `u`, twins included.
    #[inline]
    pub fn out_edges(&self, u: usize) -> &[EdgeId] {
        &self.adjacency[u]
    }

    /// Sends `amount` along edge `id`, cancelling it on the twin.
    #[inline]
    pub fn push(&mut self, id: EdgeId, amount: F) {
        debug_assert!(amount <= self.edges[id].residual());
        self.edges[id].flow += amount;
        self.edges[Self::twin(id)].flow -= amount;
    }

    pub fn reset_flow(&mut self) {
        self.edges.iter_mut().for_each(|e| e.flow = F::zero());
    }

    /// Inserted edges only, in insertion order.
    pub fn forward_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge<F>)> + '_ {
        self.edges.iter().enumerate().step_by(2)
    }

    /// Total capacity of inserted edges leaving `u`.
    pub fn out_capacity(&self, u: usize) -> F {
        self.forward_edges()
            .filter(|(_, e)| e.from == u)
            .fold(F::zero(), |acc, (_, e)| acc + e.capacity)
    }

    /// Total capacity of inserted edges entering `v`.
    pub fn in_capacity(&self, v: usize) -> F {
        self.forward_edges()
            .filter(|(_, e)| e.to == v)
            .fold(F::zero(), |acc, (_, e)| acc + e.capacity)
    }

    /// Net flow leaving `u` over inserted edges.
    pub fn net_outflow(&self, u: usize) -> F {
        self.forward_edges().fold(F::zero(), |acc, (_, e)| {
            if e.from == u && e.to != u {
                acc + e.flow
            } else if e.to == u && e.from != u {
                acc - e.flow
            } else {
                acc
            }
        })
    }

    /// Cost of the current flow over inserted edges.
    pub fn flow_cost(&self) -> F {
        self.forward_edges()
            .fold(F::zero(), |acc, (_, e)| acc + e.flow * e.cost)
    }
}
