use crate::market::{Category, MarketInstance, Price, Pricing, Revenue};
use crate::solution::Allocation;
use anyhow::Result;
#[cfg(feature = "shuffle")]
use rand::{seq::SliceRandom, Rng};
use std::cmp::Reverse;
use tracing::{debug, trace};

/// Which free unit a request takes first when it cannot take all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPreference {
    /// the unit whose best other still-demanded category is cheapest
    LowestAlternativePrice,
    /// the unit with the fewest still-demanded categories
    LeastFlexible,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    unit: usize,
    max_other_price: Price,
    flexibility: usize,
}

/// Greedy allocation heuristic
///
/// Serves active requests by descending `(valuation, quantity)` from the units still free
/// in their category, without solving a flow problem. The result is a feasible allocation,
/// so its revenue never exceeds the optimum.
#[derive(Debug, Clone)]
pub struct GreedyAllocator<'a> {
    market: &'a MarketInstance,
    pricing: &'a Pricing,
    // active requests, service order
    order: Vec<usize>,
}

impl<'a> GreedyAllocator<'a> {
    pub fn new(market: &'a MarketInstance, pricing: &'a Pricing) -> Result<GreedyAllocator<'a>> {
        market.check_pricing(pricing)?;
        let mut order: Vec<usize> = market.active_requests(pricing).map(|(r, _)| r).collect();
        order.sort_by_key(|&r| {
            let request = &market.demand()[r];
            Reverse((request.valuation, request.quantity))
        });
        Ok(GreedyAllocator {
            market,
            pricing,
            order,
        })
    }

    pub fn allocate(&self, preference: UnitPreference) -> Allocation {
        self.allocate_with(|candidates| match preference {
            UnitPreference::LowestAlternativePrice => {
                candidates.sort_by_key(|candidate| candidate.max_other_price)
            }
            UnitPreference::LeastFlexible => {
                candidates.sort_by_key(|candidate| candidate.flexibility)
            }
        })
    }

    /// Takes free units in random order; a caller-owned `rng` keeps runs reproducible.
    #[cfg(feature = "shuffle")]
    pub fn allocate_shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Allocation {
        self.allocate_with(|candidates| candidates.shuffle(rng))
    }

    fn allocate_with<O>(&self, mut order_candidates: O) -> Allocation
    where
        O: FnMut(&mut Vec<Candidate>),
    {
        let market = self.market;
        let num_categories = market.num_categories();
        let mut allocation = Allocation::new(market.supply().len());
        let mut sold = vec![false; market.supply().len()];
        let mut free: Vec<Vec<usize>> = (0..num_categories)
            .map(|c| market.units_in(c).to_vec())
            .collect();

        // active requests not served yet, per category
        let mut pending = vec![0_usize; num_categories];
        for &r in self.order.iter() {
            pending[market.demand()[r].category] += 1;
        }

        let mut candidates = Vec::new();
        for &r in self.order.iter() {
            let request = &market.demand()[r];
            let c: Category = request.category;
            let mut remaining = request.quantity;
            candidates.clear();

            for &u in free[c].iter() {
                if sold[u] {
                    continue;
                }
                let mut flexibility = 0;
                let mut max_other_price = 0;
                for &l in market.supply()[u].categories() {
                    if pending[l] > 0 {
                        flexibility += 1;
                        if l != c {
                            max_other_price = max_other_price.max(self.pricing[l]);
                        }
                    }
                }
                if flexibility == 1 && remaining > 0 {
                    // nobody else will ask for this unit
                    allocation.assign(u, r);
                    sold[u] = true;
                    remaining -= 1;
                } else {
                    candidates.push(Candidate {
                        unit: u,
                        max_other_price,
                        flexibility,
                    });
                }
            }

            order_candidates(&mut candidates);
            let mut taken = 0;
            for candidate in candidates.iter() {
                if remaining == 0 {
                    break;
                }
                allocation.assign(candidate.unit, r);
                sold[candidate.unit] = true;
                remaining -= 1;
                taken += 1;
            }
            free[c] = candidates[taken..].iter().map(|k| k.unit).collect();
            pending[c] -= 1;
            trace!(
                "request {} got {} of {} units",
                r,
                request.quantity - remaining,
                request.quantity
            );
        }
        allocation
    }
}

/// Lower bound on the optimal revenue: the better of the deterministic greedy variants.
pub fn approximate_revenue(market: &MarketInstance, pricing: &Pricing) -> Result<Revenue> {
    let allocator = GreedyAllocator::new(market, pricing)?;
    let revenue = [
        UnitPreference::LeastFlexible,
        UnitPreference::LowestAlternativePrice,
    ]
    .iter()
    .map(|&preference| allocator.allocate(preference).revenue(market, pricing))
    .max()
    .unwrap_or(0);
    assert!(
        revenue <= market.max_possible_revenue(pricing),
        "greedy revenue {} exceeds the maximum possible {}",
        revenue,
        market.max_possible_revenue(pricing)
    );
    debug!("approximate revenue {}", revenue);
    Ok(revenue)
}
