use crate::market::{MarketInstance, Price, Pricing, Revenue};
use anyhow::{ensure, Result};
use num_traits::{AsPrimitive, FromPrimitive, NumAssign, PrimInt, Signed};
use std::fmt::{Debug, Display};

/// Integer type usable for capacities, flows and costs.
///
/// Signed, because reverse residual edges carry negated flow and cost.
pub trait FlowInt:
    PrimInt
    + Signed
    + Display
    + Debug
    + AsPrimitive<usize>
    + AsPrimitive<f64>
    + FromPrimitive
    + NumAssign
{
}

impl<T> FlowInt for T where
    T: PrimInt
        + Signed
        + Display
        + Debug
        + AsPrimitive<usize>
        + AsPrimitive<f64>
        + FromPrimitive
        + NumAssign
{
}

///
/// Result of a min-cost max-flow computation
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSolution<F>
where
    F: FlowInt,
{
    /// value of the maximum flow
    pub flow: F,
    /// minimum total cost among all flows of value `flow`
    pub cost: F,
}

///
/// Partial assignment of supply units to demand requests
///
/// Each unit sells at most once: index u gives the request that bought unit u.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    unit_to_request: Vec<Option<usize>>,
}

impl Allocation {
    pub fn new(num_units: usize) -> Allocation {
        Allocation {
            unit_to_request: vec![None; num_units],
        }
    }

    #[inline]
    pub fn assign(&mut self, unit: usize, request: usize) {
        debug_assert!(self.unit_to_request[unit].is_none(), "unit {} sold twice", unit);
        self.unit_to_request[unit] = Some(request);
    }

    #[inline]
    pub fn request_of(&self, unit: usize) -> Option<usize> {
        self.unit_to_request[unit]
    }

    pub fn units_sold(&self) -> usize {
        self.unit_to_request.iter().filter(|r| r.is_some()).count()
    }

    /// Iterates over `(unit, request)` pairs of sold units.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.unit_to_request
            .iter()
            .enumerate()
            .filter_map(|(unit, request)| request.map(|r| (unit, r)))
    }

    /// Units sold to every request, indexed by request.
    pub fn units_per_request(&self, num_requests: usize) -> Vec<u64> {
        let mut counts = vec![0; num_requests];
        self.iter().for_each(|(_, r)| counts[r] += 1);
        counts
    }

    /// Sum of the category price over every sold unit.
    pub fn revenue(&self, market: &MarketInstance, pricing: &Pricing) -> Revenue {
        self.iter()
            .map(|(_, r)| Revenue::from(pricing[market.demand()[r].category]))
            .sum()
    }

    /// Checks that no request gets more than its quantity and that every sold unit went to
    /// an active request of one of its categories.
    pub fn validate(&self, market: &MarketInstance, pricing: &Pricing) -> Result<()> {
        ensure!(
            self.unit_to_request.len() == market.supply().len(),
            "allocation covers {} units, market has {}",
            self.unit_to_request.len(),
            market.supply().len()
        );
        for (unit, r) in self.iter() {
            ensure!(r < market.demand().len(), "unknown request {}", r);
            let request = &market.demand()[r];
            ensure!(
                market.supply()[unit].belongs_to(request.category),
                "unit {} is not in category {}",
                unit,
                request.category
            );
            ensure!(request.is_active(pricing), "request {} is not active", r);
        }
        for (r, sold) in self
            .units_per_request(market.demand().len())
            .into_iter()
            .enumerate()
        {
            ensure!(
                sold <= u64::from(market.demand()[r].quantity),
                "request {} got {} units",
                r,
                sold
            );
        }
        Ok(())
    }
}

///
/// Accepted subset of requests found by an acceptance search
///
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// total price of the accepted units
    pub revenue: f64,
    /// indices of accepted requests, ascending
    pub accepted: Vec<usize>,
    /// number of max-flow feasibility checks spent
    pub feasibility_checks: u32,
}

///
/// Price vector found by a pricing search
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingSolution {
    /// exact revenue of `pricing`
    pub revenue: Revenue,
    pub pricing: Pricing,
    /// number of revenue oracle calls spent
    pub evaluations: u32,
}

impl PricingSolution {
    pub fn uniform_price(&self) -> Option<Price> {
        if self.pricing.is_uniform() {
            self.pricing.as_slice().first().copied()
        } else {
            None
        }
    }
}
