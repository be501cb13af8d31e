use anyhow::{ensure, Result};
use std::collections::BTreeSet;
use std::ops::Index;
use tracing::debug;

/// Category id in `[0, L)`.
pub type Category = usize;
pub type Price = u32;
pub type Quantity = u32;
pub type Revenue = i64;

/// Upper bounds on instance sizes checked at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketLimits {
    pub max_supply_units: usize,
    pub max_demand_requests: usize,
    pub max_categories: usize,
}

impl MarketLimits {
    pub const MAX_SUPPLY_UNITS: usize = 500_000;
    pub const MAX_DEMAND_REQUESTS: usize = 1_000;
    pub const MAX_CATEGORIES: usize = 500;
}

impl Default for MarketLimits {
    fn default() -> Self {
        MarketLimits {
            max_supply_units: Self::MAX_SUPPLY_UNITS,
            max_demand_requests: Self::MAX_DEMAND_REQUESTS,
            max_categories: Self::MAX_CATEGORIES,
        }
    }
}

/// Indivisible unit of inventory that can satisfy any of its categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyUnit {
    // sorted, without duplicates
    categories: Vec<Category>,
}

impl SupplyUnit {
    pub fn new<C: IntoIterator<Item = Category>>(categories: C) -> Result<SupplyUnit> {
        let mut categories: Vec<Category> = categories.into_iter().collect();
        categories.sort_unstable();
        categories.dedup();
        ensure!(!categories.is_empty(), "supply unit without categories");
        Ok(SupplyUnit { categories })
    }

    #[inline]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[inline]
    pub fn belongs_to(&self, category: Category) -> bool {
        self.categories.binary_search(&category).is_ok()
    }
}

/// Request for up to `quantity` units of `category` at `valuation` per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandRequest {
    pub category: Category,
    pub quantity: Quantity,
    pub valuation: Price,
}

impl DemandRequest {
    pub fn new(category: Category, quantity: Quantity, valuation: Price) -> DemandRequest {
        DemandRequest {
            category,
            quantity,
            valuation,
        }
    }

    /// A request buys only when its valuation meets the price of its category.
    #[inline]
    pub fn is_active(&self, pricing: &Pricing) -> bool {
        self.valuation >= pricing[self.category]
    }
}

/// Per-category price vector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pricing {
    prices: Vec<Price>,
}

impl Pricing {
    pub fn uniform(num_categories: usize, price: Price) -> Pricing {
        Pricing {
            prices: vec![price; num_categories],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    #[inline]
    pub fn set(&mut self, category: Category, price: Price) {
        self.prices[category] = price;
    }

    #[inline]
    pub fn as_slice(&self) -> &[Price] {
        &self.prices
    }

    pub fn is_uniform(&self) -> bool {
        self.prices.windows(2).all(|w| w[0] == w[1])
    }
}

impl From<Vec<Price>> for Pricing {
    fn from(prices: Vec<Price>) -> Pricing {
        Pricing { prices }
    }
}

impl Index<Category> for Pricing {
    type Output = Price;

    #[inline]
    fn index(&self, category: Category) -> &Price {
        &self.prices[category]
    }
}

/// Supply units and demand requests over `L` categories
#[derive(Debug, Clone)]
pub struct MarketInstance {
    num_categories: usize,
    supply: Vec<SupplyUnit>,
    demand: Vec<DemandRequest>,
    // index c gives the units belonging to category c, ascending
    category_units: Vec<Vec<usize>>,
}

impl MarketInstance {
    pub fn new(
        num_categories: usize,
        supply: Vec<SupplyUnit>,
        demand: Vec<DemandRequest>,
    ) -> Result<MarketInstance> {
        Self::with_limits(num_categories, supply, demand, MarketLimits::default())
    }

    pub fn with_limits(
        num_categories: usize,
        supply: Vec<SupplyUnit>,
        demand: Vec<DemandRequest>,
        limits: MarketLimits,
    ) -> Result<MarketInstance> {
        ensure!(num_categories > 0, "market without categories");
        ensure!(
            num_categories <= limits.max_categories,
            "{} categories exceed the limit of {}",
            num_categories,
            limits.max_categories
        );
        ensure!(
            supply.len() <= limits.max_supply_units,
            "{} supply units exceed the limit of {}",
            supply.len(),
            limits.max_supply_units
        );
        ensure!(
            demand.len() <= limits.max_demand_requests,
            "{} demand requests exceed the limit of {}",
            demand.len(),
            limits.max_demand_requests
        );

        let mut category_units = vec![Vec::new(); num_categories];
        for (u, unit) in supply.iter().enumerate() {
            for &c in unit.categories() {
                ensure!(
                    c < num_categories,
                    "supply unit {} has category {} outside of [0, {})",
                    u,
                    c,
                    num_categories
                );
                category_units[c].push(u);
            }
        }
        for (r, request) in demand.iter().enumerate() {
            ensure!(
                request.category < num_categories,
                "demand request {} targets category {} outside of [0, {})",
                r,
                request.category,
                num_categories
            );
        }

        debug!(
            "market with {} categories, {} units, {} requests",
            num_categories,
            supply.len(),
            demand.len()
        );
        Ok(MarketInstance {
            num_categories,
            supply,
            demand,
            category_units,
        })
    }

    #[inline]
    pub fn num_categories(&self) -> usize {
        self.num_categories
    }

    #[inline]
    pub fn supply(&self) -> &[SupplyUnit] {
        &self.supply
    }

    #[inline]
    pub fn demand(&self) -> &[DemandRequest] {
        &self.demand
    }

    /// Units belonging to `category`, ascending.
    #[inline]
    pub fn units_in(&self, category: Category) -> &[usize] {
        &self.category_units[category]
    }

    #[inline]
    pub fn supply_of(&self, category: Category) -> usize {
        self.category_units[category].len()
    }

    /// Distinct valuations of all requests, ascending.
    pub fn valuations(&self) -> BTreeSet<Price> {
        self.demand.iter().map(|r| r.valuation).collect()
    }

    pub fn active_requests<'a>(
        &'a self,
        pricing: &'a Pricing,
    ) -> impl Iterator<Item = (usize, &'a DemandRequest)> + 'a {
        self.demand
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.is_active(pricing))
    }

    /// Revenue if every active request were served in full.
    pub fn max_possible_revenue(&self, pricing: &Pricing) -> Revenue {
        self.active_requests(pricing)
            .map(|(_, r)| Revenue::from(r.quantity) * Revenue::from(pricing[r.category]))
            .sum()
    }

    pub fn check_pricing(&self, pricing: &Pricing) -> Result<()> {
        ensure!(
            pricing.len() == self.num_categories,
            "pricing covers {} categories, market has {}",
            pricing.len(),
            self.num_categories
        );
        Ok(())
    }
}
