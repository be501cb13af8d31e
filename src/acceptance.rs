//! Choosing which requests to accept when prices are fixed per category.
//!
//! An accepted set is feasible when every accepted unit of demand can be matched to a
//! distinct supply unit of its category, which a max-flow call decides.

use crate::market::{DemandRequest, MarketInstance, Revenue};
use crate::push_relabel::PushRelabel;
use crate::solution::Selection;
use crate::solver::FlowSolver;
use anyhow::{ensure, Result};
use std::cmp::Ordering;
use tracing::{debug, info, trace};

/// Largest number of the requested units that distinct supply units can cover.
fn max_assignable<'a, I>(market: &MarketInstance, requests: I) -> Result<Revenue>
where
    I: IntoIterator<Item = &'a DemandRequest>,
{
    let num_categories = market.num_categories();
    let (source, sink) = (0, 1);
    let unit_base = 2 + num_categories;
    let mut solver = PushRelabel::<Revenue>::new(unit_base + market.supply().len());

    let mut requested = vec![false; num_categories];
    for request in requests {
        solver.add_edge(source, 2 + request.category, Revenue::from(request.quantity));
        requested[request.category] = true;
    }

    let mut unit_linked = vec![false; market.supply().len()];
    for c in (0..num_categories).filter(|&c| requested[c]) {
        for &u in market.units_in(c) {
            solver.add_edge(2 + c, unit_base + u, 1);
            if !unit_linked[u] {
                unit_linked[u] = true;
                solver.add_edge(unit_base + u, sink, 1);
            }
        }
    }
    solver.max_flow(source, sink)
}

/// Whether all `accepted` requests can be served in full at the same time.
pub fn is_acceptable<'a, I>(market: &MarketInstance, accepted: I) -> Result<bool>
where
    I: IntoIterator<Item = &'a DemandRequest>,
    I::IntoIter: Clone,
{
    let accepted = accepted.into_iter();
    let required: Revenue = accepted.clone().map(|r| Revenue::from(r.quantity)).sum();
    if required > market.supply().len() as Revenue {
        trace!("{} units requested from {} in supply", required, market.supply().len());
        return Ok(false);
    }
    let flow = max_assignable(market, accepted)?;
    assert!(flow <= required, "flow {} above demand {}", flow, required);
    Ok(flow == required)
}

/// Search strategies, each at least as good as the one before
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceStrategy {
    /// by price, keeping each request that leaves the set feasible
    Greedy,
    /// greedy, or the best request accepted alone
    GreedyWithSingle,
    /// every feasible set of up to three requests, completed greedily
    GreedyWithTriples,
    /// all subsets; exponential, for small instances only
    Exhaustive,
}

/// Requests of a market with a fixed price per category
#[derive(Debug, Clone)]
pub struct AcceptanceProblem<'a> {
    market: &'a MarketInstance,
    prices: Vec<f64>,
    // requests by descending price
    order: Vec<usize>,
}

impl<'a> AcceptanceProblem<'a> {
    pub fn new(market: &'a MarketInstance, prices: Vec<f64>) -> Result<AcceptanceProblem<'a>> {
        ensure!(
            prices.len() == market.num_categories(),
            "{} prices for {} categories",
            prices.len(),
            market.num_categories()
        );
        ensure!(
            prices.iter().all(|p| p.is_finite() && *p >= 0.),
            "prices must be finite and non-negative"
        );
        let mut order: Vec<usize> = (0..market.demand().len()).collect();
        order.sort_by(|&a, &b| {
            let (pa, pb) = (
                prices[market.demand()[a].category],
                prices[market.demand()[b].category],
            );
            pb.partial_cmp(&pa).unwrap_or(Ordering::Equal)
        });
        Ok(AcceptanceProblem {
            market,
            prices,
            order,
        })
    }

    #[inline]
    pub fn market(&self) -> &MarketInstance {
        self.market
    }

    #[inline]
    fn request_revenue(&self, r: usize) -> f64 {
        let request = &self.market.demand()[r];
        self.prices[request.category] * f64::from(request.quantity)
    }

    pub fn revenue_of(&self, accepted: &[usize]) -> f64 {
        accepted.iter().map(|&r| self.request_revenue(r)).sum()
    }

    /// Bound on any feasible revenue: the units sellable with every request accepted,
    /// filled with the highest unit prices on offer.
    pub fn revenue_upper_bound(&self) -> Result<f64> {
        let mut sellable = max_assignable(self.market, self.market.demand())?;
        let mut bound = 0.;
        for &r in self.order.iter() {
            if sellable <= 0 {
                break;
            }
            let request = &self.market.demand()[r];
            let units = sellable.min(Revenue::from(request.quantity));
            bound += self.prices[request.category] * units as f64;
            sellable -= units;
        }
        Ok(bound)
    }
}

/// Search state of one strategy run
struct SubsetSearch<'p, 'a> {
    problem: &'p AcceptanceProblem<'a>,
    feasibility_checks: u32,
}

impl<'p, 'a> SubsetSearch<'p, 'a> {
    fn new(problem: &'p AcceptanceProblem<'a>) -> Self {
        SubsetSearch {
            problem,
            feasibility_checks: 0,
        }
    }

    fn is_feasible(&mut self, accepted: &[usize]) -> Result<bool> {
        self.feasibility_checks += 1;
        let demand = self.problem.market.demand();
        is_acceptable(self.problem.market, accepted.iter().map(|&r| &demand[r]))
    }

    fn selection(&self, mut accepted: Vec<usize>) -> Selection {
        accepted.sort_unstable();
        Selection {
            revenue: self.problem.revenue_of(&accepted),
            accepted,
            feasibility_checks: self.feasibility_checks,
        }
    }

    /// Adds requests in price order to `accepted`, skipping `fixed` ones, while feasible.
    fn greedy_extend(&mut self, mut accepted: Vec<usize>, fixed: &[bool]) -> Result<Vec<usize>> {
        for idx in 0..self.problem.order.len() {
            let r = self.problem.order[idx];
            if fixed[r] {
                continue;
            }
            accepted.push(r);
            if !self.is_feasible(&accepted)? {
                accepted.pop();
            }
        }
        Ok(accepted)
    }

    fn greedy(&mut self) -> Result<Vec<usize>> {
        let fixed = vec![false; self.problem.market.demand().len()];
        self.greedy_extend(Vec::new(), &fixed)
    }

    fn greedy_with_single(&mut self) -> Result<Vec<usize>> {
        let mut best = self.greedy()?;
        let mut best_revenue = self.problem.revenue_of(&best);
        for r in 0..self.problem.market.demand().len() {
            let revenue = self.problem.request_revenue(r);
            if revenue > best_revenue && self.is_feasible(&[r])? {
                best = vec![r];
                best_revenue = revenue;
            }
        }
        Ok(best)
    }

    fn greedy_with_triples(&mut self) -> Result<Vec<usize>> {
        let mut best = self.greedy_with_single()?;
        let mut best_revenue = self.problem.revenue_of(&best);
        let n = self.problem.market.demand().len();
        let mut fixed = vec![false; n];

        let mut seeds = Vec::new();
        for i in 0..n {
            if !self.is_feasible(&[i])? {
                continue;
            }
            seeds.push(vec![i]);
            for j in i + 1..n {
                if !self.is_feasible(&[i, j])? {
                    continue;
                }
                seeds.push(vec![i, j]);
                for k in j + 1..n {
                    if self.is_feasible(&[i, j, k])? {
                        seeds.push(vec![i, j, k]);
                    }
                }
            }
        }
        trace!("{} feasible seeds of up to three requests", seeds.len());

        for seed in seeds {
            seed.iter().for_each(|&r| fixed[r] = true);
            let extended = self.greedy_extend(seed.clone(), &fixed)?;
            seed.iter().for_each(|&r| fixed[r] = false);
            let revenue = self.problem.revenue_of(&extended);
            if revenue > best_revenue {
                best = extended;
                best_revenue = revenue;
            }
        }
        Ok(best)
    }

    /// Include/exclude search over all subsets, pruned when an inclusion is infeasible.
    fn exhaustive(&mut self) -> Result<Vec<usize>> {
        enum Step {
            Enter(usize),
            Include(usize),
            Remove,
        }

        let n = self.problem.market.demand().len();
        let mut current: Vec<usize> = Vec::with_capacity(n);
        let mut best: Vec<usize> = Vec::new();
        let mut best_revenue = 0.;
        let mut stack = vec![Step::Enter(0)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(level) => {
                    let revenue = self.problem.revenue_of(&current);
                    if revenue > best_revenue {
                        best_revenue = revenue;
                        best = current.clone();
                    }
                    if level == n {
                        continue;
                    }
                    // exclude `level` first, then include it
                    stack.push(Step::Include(level));
                    stack.push(Step::Enter(level + 1));
                }
                Step::Include(level) => {
                    current.push(level);
                    if self.is_feasible(&current)? {
                        stack.push(Step::Remove);
                        stack.push(Step::Enter(level + 1));
                    } else {
                        current.pop();
                    }
                }
                Step::Remove => {
                    current.pop();
                }
            }
        }
        Ok(best)
    }
}

/// Best accepted subset found by `strategy`.
pub fn search_best_accepted_subset(
    problem: &AcceptanceProblem,
    strategy: AcceptanceStrategy,
) -> Result<Selection> {
    let mut search = SubsetSearch::new(problem);
    let accepted = match strategy {
        AcceptanceStrategy::Greedy => search.greedy()?,
        AcceptanceStrategy::GreedyWithSingle => search.greedy_with_single()?,
        AcceptanceStrategy::GreedyWithTriples => search.greedy_with_triples()?,
        AcceptanceStrategy::Exhaustive => search.exhaustive()?,
    };
    let selection = search.selection(accepted);
    debug_assert!(search.is_feasible(&selection.accepted)?);
    info!(
        "{:?} accepted {} of {} requests for revenue {:.3} after {} feasibility checks",
        strategy,
        selection.accepted.len(),
        problem.market.demand().len(),
        selection.revenue,
        selection.feasibility_checks
    );
    debug!("accepted requests {:?}", selection.accepted);
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::{is_acceptable, search_best_accepted_subset, AcceptanceProblem, AcceptanceStrategy};
    use crate::market::{DemandRequest, MarketInstance, SupplyUnit};
    use crate::testkit::{init, random_market, MarketShape};
    use rand::distributions::{Distribution, Uniform};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const TOLERANCE: f64 = 1e-8;

    fn two_unit_market() -> MarketInstance {
        MarketInstance::new(
            2,
            vec![
                SupplyUnit::new(vec![0]).unwrap(),
                SupplyUnit::new(vec![0, 1]).unwrap(),
            ],
            vec![
                DemandRequest::new(0, 2, 0),
                DemandRequest::new(0, 1, 0),
                DemandRequest::new(1, 1, 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_demand_above_category_supply_is_rejected() {
        init();
        let market = two_unit_market();
        let demand = market.demand();
        assert!(is_acceptable(&market, [demand[0]].iter()).unwrap());
        assert!(!is_acceptable(&market, [demand[0], demand[1]].iter()).unwrap());
        // a category with one unit cannot take two
        assert!(!is_acceptable(&market, [DemandRequest::new(1, 2, 0)].iter()).unwrap());
        assert!(is_acceptable(&market, [demand[1], demand[2]].iter()).unwrap());
        assert!(!is_acceptable(&market, [demand[0], demand[2]].iter()).unwrap());
    }

    #[test]
    fn test_single_request_beats_greedy() {
        init();
        // greedy takes the pricier small request, the large one alone earns more
        let market = MarketInstance::new(
            2,
            vec![SupplyUnit::new(vec![0, 1]).unwrap(); 3],
            vec![DemandRequest::new(1, 1, 0), DemandRequest::new(0, 3, 0)],
        )
        .unwrap();
        let problem = AcceptanceProblem::new(&market, vec![2.0, 3.0]).unwrap();
        let greedy = search_best_accepted_subset(&problem, AcceptanceStrategy::Greedy).unwrap();
        assert_eq!(greedy.accepted, vec![0]);
        assert!((greedy.revenue - 3.0).abs() < TOLERANCE);

        let single =
            search_best_accepted_subset(&problem, AcceptanceStrategy::GreedyWithSingle).unwrap();
        assert_eq!(single.accepted, vec![1]);
        assert!((single.revenue - 6.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_invalid_prices_are_rejected() {
        let market = two_unit_market();
        assert!(AcceptanceProblem::new(&market, vec![1.0]).is_err());
        assert!(AcceptanceProblem::new(&market, vec![1.0, -1.0]).is_err());
        assert!(AcceptanceProblem::new(&market, vec![1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_strategies_form_a_monotone_chain() {
        init();
        let shape = MarketShape {
            num_categories: 5,
            num_units: 10,
            num_requests: 7,
            categories_per_unit: 2,
            max_quantity: 4,
            ..MarketShape::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let price = Uniform::from(1..=1000_u32);
        for seed in 0..12 {
            let market = random_market(seed, &shape);
            let prices = (0..shape.num_categories)
                .map(|_| f64::from(price.sample(&mut rng)) / 50.0)
                .collect();
            let problem = AcceptanceProblem::new(&market, prices).unwrap();

            let mut previous = 0.;
            for &strategy in [
                AcceptanceStrategy::Greedy,
                AcceptanceStrategy::GreedyWithSingle,
                AcceptanceStrategy::GreedyWithTriples,
                AcceptanceStrategy::Exhaustive,
            ]
            .iter()
            {
                let selection = search_best_accepted_subset(&problem, strategy).unwrap();
                let demand = market.demand();
                let accepted = selection.accepted.iter().map(|&r| &demand[r]);
                assert!(is_acceptable(&market, accepted).unwrap());
                let recomputed = problem.revenue_of(&selection.accepted);
                assert!((recomputed - selection.revenue).abs() < TOLERANCE);
                assert!(
                    selection.revenue + TOLERANCE >= previous,
                    "seed {}: {:?} earned {} after {}",
                    seed,
                    strategy,
                    selection.revenue,
                    previous
                );
                previous = selection.revenue;
            }
            assert!(previous <= problem.revenue_upper_bound().unwrap() + TOLERANCE);
        }
    }
}
