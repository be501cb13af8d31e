use crate::market::{DemandRequest, MarketInstance, Price, Pricing, Quantity, SupplyUnit};
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reservoir_sampling::unweighted::core::r as reservoir_sample;

pub(crate) fn init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug, Clone)]
pub(crate) struct MarketShape {
    pub num_categories: usize,
    pub num_units: usize,
    pub num_requests: usize,
    pub categories_per_unit: usize,
    pub max_quantity: Quantity,
    pub max_valuation: Price,
}

impl Default for MarketShape {
    fn default() -> Self {
        MarketShape {
            num_categories: 4,
            num_units: 12,
            num_requests: 6,
            categories_per_unit: 2,
            max_quantity: 4,
            max_valuation: 6,
        }
    }
}

/// Every category gets at least one request while there are enough of them.
pub(crate) fn random_market(seed: u64, shape: &MarketShape) -> MarketInstance {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let category = Uniform::from(0..shape.num_categories);
    let quantity = Uniform::from(1..=shape.max_quantity);
    let valuation = Uniform::from(1..=shape.max_valuation);

    let supply = (0..shape.num_units)
        .map(|_| {
            let mut samples = vec![0; shape.categories_per_unit.min(shape.num_categories)];
            reservoir_sample(0..shape.num_categories, samples.as_mut_slice(), &mut rng);
            SupplyUnit::new(samples).unwrap()
        })
        .collect();
    let demand = (0..shape.num_requests)
        .map(|i| {
            let c = if i < shape.num_categories {
                i
            } else {
                category.sample(&mut rng)
            };
            DemandRequest::new(c, quantity.sample(&mut rng), valuation.sample(&mut rng))
        })
        .collect();
    MarketInstance::new(shape.num_categories, supply, demand).unwrap()
}

pub(crate) fn random_pricing<R: Rng>(
    rng: &mut R,
    market: &MarketInstance,
    max_price: Price,
) -> Pricing {
    let price = Uniform::from(0..=max_price);
    Pricing::from(
        (0..market.num_categories())
            .map(|_| price.sample(rng))
            .collect::<Vec<_>>(),
    )
}
