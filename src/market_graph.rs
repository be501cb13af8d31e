//! Compiles a priced market into a flow network.
//!
//! Layout: `source -> supply unit -> category -> demand request -> sink`. Only active
//! requests, their categories and the units belonging to those categories get a node,
//! so the network grows with the active part of the market.

use crate::graph::{CapacityGraph, EdgeId};
use crate::market::{Category, MarketInstance, Price, Pricing, Revenue};
use crate::min_cost_flow::SuccessiveShortestPath;
use crate::push_relabel::PushRelabel;
use crate::solution::Allocation;
use crate::solver::FlowSolver;
use anyhow::{ensure, Result};
use tracing::{debug, trace};

/// Edge costs of the request -> sink edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostModel {
    /// plain capacities, for max-flow only
    Uncosted,
    /// `ceiling - price` per unit, so the cheapest max flow is the most profitable one
    Margin { ceiling: Price },
}

/// Node and edge ids of a compiled market
#[derive(Debug, Clone)]
pub struct MarketNetwork {
    source: usize,
    sink: usize,
    num_nodes: usize,
    category_nodes: Vec<Option<usize>>,
    // (unit, category, unit -> category edge)
    unit_edges: Vec<(usize, Category, EdgeId)>,
    // (request, request -> sink edge)
    request_edges: Vec<(usize, EdgeId)>,
}

impl MarketNetwork {
    pub fn build(
        market: &MarketInstance,
        pricing: &Pricing,
        cost_model: CostModel,
    ) -> (MarketNetwork, CapacityGraph<Revenue>) {
        let active: Vec<usize> = market.active_requests(pricing).map(|(r, _)| r).collect();

        let (source, sink) = (0, 1);
        let mut next_node = 2;
        let mut category_nodes = vec![None; market.num_categories()];
        for &r in active.iter() {
            let c = market.demand()[r].category;
            if category_nodes[c].is_none() {
                category_nodes[c] = Some(next_node);
                next_node += 1;
            }
        }

        let units: Vec<usize> = (0..market.supply().len())
            .filter(|&u| {
                market.supply()[u]
                    .categories()
                    .iter()
                    .any(|&c| category_nodes[c].is_some())
            })
            .collect();
        let unit_base = next_node;
        let request_base = unit_base + units.len();
        let num_nodes = request_base + active.len();

        let num_unit_edges: usize = units
            .iter()
            .map(|&u| market.supply()[u].categories().len())
            .sum();
        let mut graph = CapacityGraph::with_capacity(
            num_nodes,
            units.len() + num_unit_edges + 2 * active.len(),
        );

        let mut unit_edges = Vec::with_capacity(num_unit_edges);
        for (i, &u) in units.iter().enumerate() {
            let node = unit_base + i;
            // a unit sells at most once
            graph.add_edge(source, node, 1);
            for &c in market.supply()[u].categories() {
                if let Some(category_node) = category_nodes[c] {
                    let e = graph.add_edge(node, category_node, 1);
                    unit_edges.push((u, c, e));
                }
            }
        }

        let mut request_edges = Vec::with_capacity(active.len());
        for (i, &r) in active.iter().enumerate() {
            let node = request_base + i;
            let request = &market.demand()[r];
            let category_node = category_nodes[request.category]
                .expect("categories of active requests have a node");
            graph.add_edge(
                category_node,
                node,
                market.supply_of(request.category) as Revenue,
            );
            let cost = match cost_model {
                CostModel::Uncosted => 0,
                CostModel::Margin { ceiling } => {
                    assert!(
                        pricing[request.category] <= ceiling,
                        "price {} above cost ceiling {}",
                        pricing[request.category],
                        ceiling
                    );
                    Revenue::from(ceiling - pricing[request.category])
                }
            };
            let e = graph.add_edge_with_cost(node, sink, Revenue::from(request.quantity), cost);
            request_edges.push((r, e));
        }

        trace!(
            "compiled {} active requests, {} units into {} nodes, {} edges",
            active.len(),
            units.len(),
            num_nodes,
            graph.num_edges()
        );
        (
            MarketNetwork {
                source,
                sink,
                num_nodes,
                category_nodes,
                unit_edges,
                request_edges,
            },
            graph,
        )
    }

    #[inline]
    pub fn source(&self) -> usize {
        self.source
    }

    #[inline]
    pub fn sink(&self) -> usize {
        self.sink
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    pub fn has_category(&self, category: Category) -> bool {
        self.category_nodes[category].is_some()
    }

    /// Decodes the flow left on `graph` into unit -> request assignments.
    ///
    /// Inside a category every unit is interchangeable, so units flowing into it are
    /// handed out to the requests drawing from it in order.
    pub fn allocation(
        &self,
        market: &MarketInstance,
        graph: &CapacityGraph<Revenue>,
    ) -> Allocation {
        let mut inflow: Vec<Vec<usize>> = vec![Vec::new(); market.num_categories()];
        for &(u, c, e) in self.unit_edges.iter() {
            if graph.edge(e).flow > 0 {
                inflow[c].push(u);
            }
        }

        let mut allocation = Allocation::new(market.supply().len());
        for &(r, e) in self.request_edges.iter() {
            let c = market.demand()[r].category;
            for _ in 0..graph.edge(e).flow {
                let unit = inflow[c]
                    .pop()
                    .expect("category outflow is covered by its inflow");
                allocation.assign(unit, r);
            }
        }
        allocation
    }
}

fn default_ceiling(market: &MarketInstance, pricing: &Pricing) -> Price {
    market
        .active_requests(pricing)
        .map(|(_, r)| pricing[r.category])
        .max()
        .unwrap_or(0)
}

fn check_revenue(market: &MarketInstance, pricing: &Pricing, flow: Revenue, revenue: Revenue) {
    assert!(
        flow <= market.supply().len() as Revenue,
        "flow {} exceeds {} supply units",
        flow,
        market.supply().len()
    );
    assert!(revenue >= 0, "negative revenue {}", revenue);
    assert!(
        revenue <= market.max_possible_revenue(pricing),
        "revenue {} exceeds the maximum possible {}",
        revenue,
        market.max_possible_revenue(pricing)
    );
}

/// Revenue when every category is priced at `price`: max flow times price.
pub fn evaluate_uniform_price(market: &MarketInstance, price: Price) -> Result<Revenue> {
    let pricing = Pricing::uniform(market.num_categories(), price);
    let (network, graph) = MarketNetwork::build(market, &pricing, CostModel::Uncosted);
    let mut solver = PushRelabel::from_graph(graph);
    let flow = solver.max_flow(network.source(), network.sink())?;
    let revenue = flow * Revenue::from(price);
    check_revenue(market, &pricing, flow, revenue);
    debug!("uniform price {}: flow {}, revenue {}", price, flow, revenue);
    Ok(revenue)
}

/// Exact revenue of an arbitrary pricing from the cheapest maximum flow.
pub fn evaluate_nonuniform_price(market: &MarketInstance, pricing: &Pricing) -> Result<Revenue> {
    market.check_pricing(pricing)?;
    evaluate_nonuniform_price_with_ceiling(market, pricing, default_ceiling(market, pricing))
}

/// Same as [`evaluate_nonuniform_price`] with an explicit cost ceiling.
///
/// Revenue is recovered as `ceiling * flow - cost`; the ceiling must not be below any
/// active price so every edge cost stays non-negative.
pub fn evaluate_nonuniform_price_with_ceiling(
    market: &MarketInstance,
    pricing: &Pricing,
    ceiling: Price,
) -> Result<Revenue> {
    market.check_pricing(pricing)?;
    let highest = default_ceiling(market, pricing);
    ensure!(
        highest <= ceiling,
        "cost ceiling {} is below the active price {}",
        ceiling,
        highest
    );

    let (network, graph) = MarketNetwork::build(market, pricing, CostModel::Margin { ceiling });
    let mut solver = SuccessiveShortestPath::from_graph(graph);
    let solution = solver.min_cost_max_flow(network.source(), network.sink())?;
    let revenue = Revenue::from(ceiling) * solution.flow - solution.cost;
    check_revenue(market, pricing, solution.flow, revenue);
    debug!(
        "nonuniform pricing: flow {}, cost {}, revenue {}",
        solution.flow, solution.cost, revenue
    );
    Ok(revenue)
}

/// Exact revenue, through max flow for uniform pricings and min-cost flow otherwise.
pub fn evaluate_pricing(market: &MarketInstance, pricing: &Pricing) -> Result<Revenue> {
    market.check_pricing(pricing)?;
    match pricing.as_slice().first() {
        Some(&price) if pricing.is_uniform() => evaluate_uniform_price(market, price),
        _ => evaluate_nonuniform_price(market, pricing),
    }
}

/// A revenue-maximal allocation decoded from the cheapest maximum flow.
pub fn exact_allocation(market: &MarketInstance, pricing: &Pricing) -> Result<Allocation> {
    market.check_pricing(pricing)?;
    let ceiling = default_ceiling(market, pricing);
    let (network, graph) = MarketNetwork::build(market, pricing, CostModel::Margin { ceiling });
    let mut solver = SuccessiveShortestPath::from_graph(graph);
    solver.min_cost_max_flow(network.source(), network.sink())?;
    Ok(network.allocation(market, solver.graph()))
}

#[cfg(test)]
mod tests {
    use super::{
        evaluate_nonuniform_price, evaluate_nonuniform_price_with_ceiling, evaluate_pricing,
        evaluate_uniform_price, exact_allocation, CostModel, MarketNetwork,
    };
    use crate::market::{DemandRequest, MarketInstance, Pricing, SupplyUnit};
    use crate::testkit::{init, random_market, random_pricing, MarketShape};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn single_category_market() -> MarketInstance {
        MarketInstance::new(
            1,
            vec![SupplyUnit::new(vec![0]).unwrap(); 3],
            vec![DemandRequest::new(0, 2, 5), DemandRequest::new(0, 2, 3)],
        )
        .unwrap()
    }

    #[test]
    fn test_only_active_requests_are_served() {
        init();
        let market = single_category_market();
        assert_eq!(evaluate_uniform_price(&market, 4).unwrap(), 8);
        assert_eq!(
            evaluate_nonuniform_price(&market, &Pricing::from(vec![4])).unwrap(),
            8
        );
        // both requests active at price 3, but only 3 units exist
        assert_eq!(evaluate_uniform_price(&market, 3).unwrap(), 9);
        assert_eq!(evaluate_uniform_price(&market, 6).unwrap(), 0);
    }

    #[test]
    fn test_inactive_parts_are_left_out_of_the_network() {
        let market = MarketInstance::new(
            3,
            vec![
                SupplyUnit::new(vec![0]).unwrap(),
                SupplyUnit::new(vec![1, 2]).unwrap(),
                SupplyUnit::new(vec![2]).unwrap(),
            ],
            vec![DemandRequest::new(0, 1, 9), DemandRequest::new(2, 1, 2)],
        )
        .unwrap();
        let (network, graph) =
            MarketNetwork::build(&market, &Pricing::from(vec![5, 5, 5]), CostModel::Uncosted);
        assert!(network.has_category(0));
        assert!(!network.has_category(2));
        // terminals, one category, one unit, one request
        assert_eq!(network.num_nodes(), 5);
        assert_eq!(graph.num_edges(), 4);
    }

    #[test]
    fn test_higher_prices_win_contested_units() {
        init();
        // unit 0 fits both categories, the expensive one must get it
        let market = MarketInstance::new(
            2,
            vec![
                SupplyUnit::new(vec![0, 1]).unwrap(),
                SupplyUnit::new(vec![0]).unwrap(),
            ],
            vec![DemandRequest::new(0, 2, 10), DemandRequest::new(1, 1, 10)],
        )
        .unwrap();
        let pricing = Pricing::from(vec![2, 7]);
        assert_eq!(evaluate_nonuniform_price(&market, &pricing).unwrap(), 9);
        let allocation = exact_allocation(&market, &pricing).unwrap();
        allocation.validate(&market, &pricing).unwrap();
        assert_eq!(allocation.request_of(0), Some(1));
        assert_eq!(allocation.request_of(1), Some(0));
        assert_eq!(allocation.revenue(&market, &pricing), 9);
    }

    #[test]
    fn test_explicit_ceiling_gives_the_same_revenue() {
        let market = single_category_market();
        let pricing = Pricing::from(vec![3]);
        assert_eq!(
            evaluate_nonuniform_price_with_ceiling(&market, &pricing, 100).unwrap(),
            9
        );
        assert!(evaluate_nonuniform_price_with_ceiling(&market, &pricing, 2).is_err());
    }

    #[test]
    fn test_uniform_and_min_cost_paths_agree() {
        init();
        let shape = MarketShape::default();
        for seed in 0..8 {
            let market = random_market(seed, &shape);
            for price in market.valuations() {
                let pricing = Pricing::uniform(market.num_categories(), price);
                assert_eq!(
                    evaluate_uniform_price(&market, price).unwrap(),
                    evaluate_nonuniform_price(&market, &pricing).unwrap(),
                    "seed {} price {}",
                    seed,
                    price
                );
            }
        }
    }

    #[test]
    fn test_evaluation_is_idempotent_and_allocation_matches() {
        init();
        let shape = MarketShape::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for seed in 0..8 {
            let market = random_market(seed, &shape);
            let pricing = random_pricing(&mut rng, &market, shape.max_valuation);
            let first = evaluate_pricing(&market, &pricing).unwrap();
            let second = evaluate_pricing(&market, &pricing).unwrap();
            assert_eq!(first, second);

            let allocation = exact_allocation(&market, &pricing).unwrap();
            allocation.validate(&market, &pricing).unwrap();
            assert_eq!(allocation.revenue(&market, &pricing), first);
            assert!(first <= market.max_possible_revenue(&pricing));
        }
    }

    #[test]
    fn test_wrong_pricing_length_is_rejected() {
        let market = single_category_market();
        assert!(evaluate_pricing(&market, &Pricing::from(vec![1, 2])).is_err());
    }
}
