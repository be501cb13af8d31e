//! Revenue oracles and searches for two-sided assignment markets.
//!
//! Supply units belong to one or more categories and are sold one at a time to demand
//! requests for a single category. Given per-category prices, [`evaluate_pricing`] computes
//! the best achievable revenue with a flow solve and [`approximate_revenue`] bounds it from
//! below without one. [`search_best_pricing`] and [`search_best_accepted_subset`] build on
//! these oracles.

pub mod acceptance;
pub mod graph;
pub mod greedy;
pub mod market;
pub mod market_graph;
pub mod min_cost_flow;
pub mod pricing;
pub mod push_relabel;
pub mod solution;
pub mod solver;

#[cfg(test)]
mod testkit;

pub use crate::acceptance::{
    is_acceptable, search_best_accepted_subset, AcceptanceProblem, AcceptanceStrategy,
};
pub use crate::graph::{CapacityGraph, Edge, EdgeId};
pub use crate::greedy::{approximate_revenue, GreedyAllocator, UnitPreference};
pub use crate::market::{
    Category, DemandRequest, MarketInstance, MarketLimits, Price, Pricing, Quantity, Revenue,
    SupplyUnit,
};
pub use crate::market_graph::{
    evaluate_nonuniform_price, evaluate_nonuniform_price_with_ceiling, evaluate_pricing,
    evaluate_uniform_price, exact_allocation,
};
pub use crate::min_cost_flow::SuccessiveShortestPath;
pub use crate::pricing::{
    find_optimal_uniform_price, search_best_pricing, ArbitrageMatrix, ExhaustiveParams,
    LocalSearchParams, PricingStrategy, RevenueOracle,
};
pub use crate::push_relabel::PushRelabel;
pub use crate::solution::{Allocation, FlowInt, FlowSolution, PricingSolution, Selection};
pub use crate::solver::FlowSolver;
