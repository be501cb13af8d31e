//! Searching for the per-category prices that earn the most.
//!
//! Every search draws candidate prices from the distinct request valuations: between two
//! consecutive valuations the set of active requests does not change, so raising a price
//! to the next valuation never loses revenue.

use crate::greedy::approximate_revenue;
use crate::market::{Category, MarketInstance, Price, Pricing, Revenue};
use crate::market_graph::{evaluate_pricing, evaluate_uniform_price};
use crate::solution::PricingSolution;
use anyhow::{bail, Result};
use tracing::{debug, info, trace, warn};

/// Overlap ratios between category supplies
///
/// `ratio(i, j) = |S_i ∩ S_j| / |S_i|` where `S_c` is the set of units in category `c`.
/// A pricing is arbitrage-free when `price[i] >= ratio(i, j) * price[j]` for every pair,
/// otherwise buyers could reach units of `i` more cheaply through `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrageMatrix {
    num_categories: usize,
    // row-major
    ratios: Vec<f64>,
}

impl ArbitrageMatrix {
    pub const TOLERANCE: f64 = 1e-9;

    pub fn new(market: &MarketInstance) -> ArbitrageMatrix {
        let n = market.num_categories();
        let mut shared = vec![0_usize; n * n];
        for unit in market.supply() {
            let categories = unit.categories();
            for &i in categories {
                for &j in categories {
                    shared[i * n + j] += 1;
                }
            }
        }
        let ratios = shared
            .iter()
            .enumerate()
            .map(|(k, &count)| match market.supply_of(k / n) {
                0 => 0.,
                size => count as f64 / size as f64,
            })
            .collect();
        ArbitrageMatrix {
            num_categories: n,
            ratios,
        }
    }

    #[inline]
    pub fn num_categories(&self) -> usize {
        self.num_categories
    }

    #[inline]
    pub fn ratio(&self, i: Category, j: Category) -> f64 {
        self.ratios[i * self.num_categories + j]
    }

    /// Price range for `category` that keeps it arbitrage-free against the `others`.
    pub fn bounds<I>(&self, category: Category, prices: &[Price], others: I) -> (f64, f64)
    where
        I: IntoIterator<Item = Category>,
    {
        let mut lower = 0_f64;
        let mut upper = f64::INFINITY;
        for j in others.into_iter().filter(|&j| j != category) {
            let price = f64::from(prices[j]);
            lower = lower.max(self.ratio(category, j) * price);
            let ratio = self.ratio(j, category);
            if ratio > 0. {
                upper = upper.min(price / ratio);
            }
        }
        (lower, upper)
    }

    #[inline]
    pub fn admits(price: Price, (lower, upper): (f64, f64)) -> bool {
        let price = f64::from(price);
        price + Self::TOLERANCE * (1. + lower) >= lower
            && price <= upper + Self::TOLERANCE * (1. + price)
    }

    pub fn is_arbitrage_free(&self, pricing: &Pricing) -> bool {
        let prices = pricing.as_slice();
        (0..self.num_categories).all(|c| Self::admits(prices[c], self.bounds(c, prices, 0..c)))
    }
}

/// Revenue source of the local search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevenueOracle {
    /// min-cost flow
    Exact,
    /// greedy allocation, a lower bound
    Approximate,
}

impl Default for RevenueOracle {
    fn default() -> Self {
        RevenueOracle::Exact
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalSearchParams {
    pub oracle: RevenueOracle,
    /// `None` runs up to [`LocalSearchParams::MAX_ROUNDS`]
    pub max_rounds: Option<u32>,
}

impl LocalSearchParams {
    pub const MAX_ROUNDS: u32 = 1_000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExhaustiveParams {
    /// refuse searches over more complete price vectors than this
    pub max_assignments: Option<u64>,
}

impl ExhaustiveParams {
    pub const WARN_ASSIGNMENTS: u64 = 1_000_000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingStrategy {
    Uniform,
    LocalSearch(LocalSearchParams),
    Exhaustive(ExhaustiveParams),
}

struct PriceSearch<'a> {
    market: &'a MarketInstance,
    // distinct valuations, ascending
    candidates: Vec<Price>,
    evaluations: u32,
}

impl<'a> PriceSearch<'a> {
    fn new(market: &'a MarketInstance) -> Self {
        PriceSearch {
            market,
            candidates: market.valuations().into_iter().collect(),
            evaluations: 0,
        }
    }

    fn evaluate(&mut self, pricing: &Pricing, oracle: RevenueOracle) -> Result<Revenue> {
        self.evaluations += 1;
        match oracle {
            RevenueOracle::Exact => evaluate_pricing(self.market, pricing),
            RevenueOracle::Approximate => approximate_revenue(self.market, pricing),
        }
    }

    fn solution(&self, revenue: Revenue, pricing: Pricing) -> PricingSolution {
        PricingSolution {
            revenue,
            pricing,
            evaluations: self.evaluations,
        }
    }

    fn uniform(&mut self) -> Result<(Price, Revenue)> {
        let mut best = (0, 0);
        for idx in 0..self.candidates.len() {
            let price = self.candidates[idx];
            self.evaluations += 1;
            let revenue = evaluate_uniform_price(self.market, price)?;
            trace!("uniform price {} earns {}", price, revenue);
            if revenue > best.1 || idx == 0 {
                best = (price, revenue);
            }
        }
        Ok(best)
    }

    /// Coordinate moves from the best uniform price, each kept only if it strictly improves.
    fn local_search(&mut self, params: LocalSearchParams) -> Result<PricingSolution> {
        let num_categories = self.market.num_categories();
        let max_rounds = params.max_rounds.unwrap_or(LocalSearchParams::MAX_ROUNDS);
        let matrix = ArbitrageMatrix::new(self.market);

        let (start_price, start_revenue) = self.uniform()?;
        let mut pricing = Pricing::uniform(num_categories, start_price);
        let mut best = match params.oracle {
            RevenueOracle::Exact => start_revenue,
            RevenueOracle::Approximate => self.evaluate(&pricing, params.oracle)?,
        };

        let mut rounds = 0;
        while rounds < max_rounds {
            rounds += 1;
            let mut improved = false;
            for c in 0..num_categories {
                let range = matrix.bounds(c, pricing.as_slice(), 0..num_categories);
                let start = pricing[c];
                let mut kept = start;
                for idx in 0..self.candidates.len() {
                    let price = self.candidates[idx];
                    if price == start || price == kept || !ArbitrageMatrix::admits(price, range) {
                        continue;
                    }
                    pricing.set(c, price);
                    let revenue = self.evaluate(&pricing, params.oracle)?;
                    if revenue > best {
                        trace!("category {}: {} -> {} earns {}", c, kept, price, revenue);
                        best = revenue;
                        kept = price;
                        improved = true;
                    }
                }
                pricing.set(c, kept);
            }
            debug!("local search round {}: revenue {}", rounds, best);
            if !improved {
                break;
            }
        }
        debug_assert!(matrix.is_arbitrage_free(&pricing));

        if params.oracle == RevenueOracle::Approximate {
            best = self.evaluate(&pricing, RevenueOracle::Exact)?;
            if best < start_revenue {
                debug!("approximate optimum earns {}, keeping the uniform start", best);
                best = start_revenue;
                pricing = Pricing::uniform(num_categories, start_price);
            }
        }
        Ok(self.solution(best, pricing))
    }

    /// Depth-first over price vectors, one category per level, pruned when the newest
    /// price breaks arbitrage-freeness against the categories before it.
    fn exhaustive(&mut self, params: ExhaustiveParams) -> Result<PricingSolution> {
        let num_categories = self.market.num_categories();
        let width = self.candidates.len() as u64;
        let assignments = (0..num_categories).try_fold(1_u64, |acc, _| acc.checked_mul(width));
        match (assignments, params.max_assignments) {
            (None, Some(limit)) => bail!("price search space exceeds {} assignments", limit),
            (Some(size), Some(limit)) if size > limit => {
                bail!("price search space of {} exceeds {} assignments", size, limit)
            }
            (Some(size), _) if size <= ExhaustiveParams::WARN_ASSIGNMENTS => {}
            _ => warn!(
                "exhaustive search over {} prices in {} categories",
                width, num_categories
            ),
        }

        let matrix = ArbitrageMatrix::new(self.market);
        let mut prices: Vec<Price> = vec![0; num_categories];
        let mut cursor = vec![0_usize; num_categories];
        let mut best: Option<(Revenue, Vec<Price>)> = None;
        let mut level = 0;

        loop {
            if cursor[level] == self.candidates.len() {
                cursor[level] = 0;
                if level == 0 {
                    break;
                }
                level -= 1;
                continue;
            }
            prices[level] = self.candidates[cursor[level]];
            cursor[level] += 1;
            if !ArbitrageMatrix::admits(prices[level], matrix.bounds(level, &prices, 0..level)) {
                continue;
            }
            if level + 1 < num_categories {
                level += 1;
                continue;
            }

            let pricing = Pricing::from(prices.clone());
            let revenue = self.evaluate(&pricing, RevenueOracle::Exact)?;
            if best.as_ref().map_or(true, |(top, _)| revenue > *top) {
                trace!("{:?} earns {}", prices, revenue);
                best = Some((revenue, prices.clone()));
            }
        }

        // uniform vectors are always admitted, so a non-empty candidate list finds one
        let (revenue, prices) = best.unwrap_or_else(|| (0, vec![0; num_categories]));
        Ok(self.solution(revenue, Pricing::from(prices)))
    }
}

/// Best single price for all categories and its revenue; `(0, 0)` without requests.
pub fn find_optimal_uniform_price(market: &MarketInstance) -> Result<(Price, Revenue)> {
    PriceSearch::new(market).uniform()
}

pub fn search_best_pricing(
    market: &MarketInstance,
    strategy: PricingStrategy,
) -> Result<PricingSolution> {
    let mut search = PriceSearch::new(market);
    if search.candidates.is_empty() {
        return Ok(search.solution(0, Pricing::uniform(market.num_categories(), 0)));
    }
    let solution = match strategy {
        PricingStrategy::Uniform => {
            let (price, revenue) = search.uniform()?;
            search.solution(revenue, Pricing::uniform(market.num_categories(), price))
        }
        PricingStrategy::LocalSearch(params) => search.local_search(params)?,
        PricingStrategy::Exhaustive(params) => search.exhaustive(params)?,
    };
    info!(
        "{:?}: revenue {} with prices {:?} after {} evaluations",
        strategy,
        solution.revenue,
        solution.pricing.as_slice(),
        solution.evaluations
    );
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::{
        find_optimal_uniform_price, search_best_pricing, ArbitrageMatrix, ExhaustiveParams,
        LocalSearchParams, PricingStrategy, RevenueOracle,
    };
    use crate::market::{DemandRequest, MarketInstance, Pricing, SupplyUnit};
    use crate::market_graph::evaluate_pricing;
    use crate::testkit::{init, random_market, MarketShape};

    fn disjoint_market() -> MarketInstance {
        let mut supply = vec![SupplyUnit::new(vec![0]).unwrap(); 3];
        supply.extend(vec![SupplyUnit::new(vec![1]).unwrap(); 2]);
        MarketInstance::new(
            2,
            supply,
            vec![
                DemandRequest::new(0, 3, 2),
                DemandRequest::new(0, 1, 9),
                DemandRequest::new(1, 2, 5),
                DemandRequest::new(1, 1, 9),
            ],
        )
        .unwrap()
    }

    fn strategies() -> Vec<PricingStrategy> {
        vec![
            PricingStrategy::Uniform,
            PricingStrategy::LocalSearch(LocalSearchParams::default()),
            PricingStrategy::Exhaustive(ExhaustiveParams::default()),
        ]
    }

    #[test]
    fn test_overlap_ratios() {
        let market = MarketInstance::new(
            4,
            vec![
                SupplyUnit::new(vec![0, 1]).unwrap(),
                SupplyUnit::new(vec![0]).unwrap(),
                SupplyUnit::new(vec![1, 2]).unwrap(),
            ],
            vec![],
        )
        .unwrap();
        let matrix = ArbitrageMatrix::new(&market);
        assert_eq!(matrix.ratio(0, 0), 1.0);
        assert_eq!(matrix.ratio(0, 1), 0.5);
        assert_eq!(matrix.ratio(1, 0), 0.5);
        assert_eq!(matrix.ratio(1, 2), 0.5);
        assert_eq!(matrix.ratio(2, 1), 1.0);
        assert_eq!(matrix.ratio(0, 2), 0.0);
        // category without units
        assert_eq!(matrix.ratio(3, 0), 0.0);

        let (lower, upper) = matrix.bounds(1, &[4, 0, 2, 0], 0..4);
        assert!((lower - 2.0).abs() < ArbitrageMatrix::TOLERANCE);
        assert!((upper - 2.0).abs() < ArbitrageMatrix::TOLERANCE);
        assert!(matrix.is_arbitrage_free(&Pricing::from(vec![4, 2, 2, 7])));
        assert!(!matrix.is_arbitrage_free(&Pricing::from(vec![4, 1, 1, 0])));
    }

    #[test]
    fn test_disjoint_categories_are_priced_independently() {
        init();
        let market = disjoint_market();
        let matrix = ArbitrageMatrix::new(&market);
        assert_eq!(matrix.ratio(0, 1), 0.0);
        assert_eq!(matrix.ratio(1, 0), 0.0);

        assert_eq!(find_optimal_uniform_price(&market).unwrap(), (9, 18));
        let uniform = search_best_pricing(&market, PricingStrategy::Uniform).unwrap();
        assert_eq!(uniform.revenue, 18);
        assert_eq!(uniform.uniform_price(), Some(9));

        let local = search_best_pricing(
            &market,
            PricingStrategy::LocalSearch(LocalSearchParams::default()),
        )
        .unwrap();
        assert_eq!(local.revenue, 19);
        assert_eq!(local.pricing.as_slice(), &[9, 5]);
        assert_eq!(local.uniform_price(), None);

        let exhaustive = search_best_pricing(
            &market,
            PricingStrategy::Exhaustive(ExhaustiveParams::default()),
        )
        .unwrap();
        assert_eq!(exhaustive.revenue, 19);
        assert_eq!(exhaustive.evaluations, 9);
    }

    #[test]
    fn test_market_without_requests() {
        let market =
            MarketInstance::new(2, vec![SupplyUnit::new(vec![0, 1]).unwrap()], vec![]).unwrap();
        assert_eq!(find_optimal_uniform_price(&market).unwrap(), (0, 0));
        for strategy in strategies() {
            let solution = search_best_pricing(&market, strategy).unwrap();
            assert_eq!(solution.revenue, 0);
            assert_eq!(solution.pricing, Pricing::uniform(2, 0));
        }
    }

    #[test]
    fn test_oversized_exhaustive_search_is_refused() {
        let market = disjoint_market();
        let params = ExhaustiveParams {
            max_assignments: Some(8),
        };
        assert!(search_best_pricing(&market, PricingStrategy::Exhaustive(params)).is_err());
        let params = ExhaustiveParams {
            max_assignments: Some(9),
        };
        assert!(search_best_pricing(&market, PricingStrategy::Exhaustive(params)).is_ok());
    }

    #[test]
    fn test_strategies_form_a_monotone_chain() {
        init();
        let shape = MarketShape {
            num_categories: 3,
            num_units: 8,
            num_requests: 6,
            ..MarketShape::default()
        };
        for seed in 0..10 {
            let market = random_market(seed, &shape);
            let matrix = ArbitrageMatrix::new(&market);
            let solutions: Vec<_> = strategies()
                .into_iter()
                .map(|strategy| search_best_pricing(&market, strategy).unwrap())
                .collect();
            for solution in solutions.iter() {
                assert!(matrix.is_arbitrage_free(&solution.pricing), "seed {}", seed);
                assert_eq!(
                    evaluate_pricing(&market, &solution.pricing).unwrap(),
                    solution.revenue
                );
            }
            assert!(solutions[0].revenue <= solutions[1].revenue, "seed {}", seed);
            assert!(solutions[1].revenue <= solutions[2].revenue, "seed {}", seed);

            let approximate = search_best_pricing(
                &market,
                PricingStrategy::LocalSearch(LocalSearchParams {
                    oracle: RevenueOracle::Approximate,
                    max_rounds: None,
                }),
            )
            .unwrap();
            assert!(matrix.is_arbitrage_free(&approximate.pricing));
            assert!(solutions[0].revenue <= approximate.revenue, "seed {}", seed);
            assert!(approximate.revenue <= solutions[2].revenue, "seed {}", seed);
        }
    }

    #[test]
    fn test_round_limit_stops_local_search() {
        init();
        let market = disjoint_market();
        let params = LocalSearchParams {
            oracle: RevenueOracle::Exact,
            max_rounds: Some(1),
        };
        let solution =
            search_best_pricing(&market, PricingStrategy::LocalSearch(params)).unwrap();
        // 3 uniform evaluations and one round of two categories with two moves each;
        // category 1 improves 9 -> 5 and does not evaluate 9 again
        assert_eq!(solution.evaluations, 7);
        assert_eq!(solution.revenue, 19);

        // a second round without improvement ends the search
        let solution = search_best_pricing(
            &market,
            PricingStrategy::LocalSearch(LocalSearchParams::default()),
        )
        .unwrap();
        assert_eq!(solution.evaluations, 11);
        assert_eq!(solution.pricing.as_slice(), &[9, 5]);
    }
}
