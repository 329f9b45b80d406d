use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use rand_distr::Distribution;

use crate::bid_table::BidRow;

/// Object-safe wrapper for Distribution<f64> that works with StdRng
/// This is needed because Distribution<f64> cannot be made into a trait object
/// due to its generic sample method
pub trait DistributionF64 {
    fn sample(&self, rng: &mut StdRng) -> f64;
}

impl<D: Distribution<f64>> DistributionF64 for D {
    fn sample(&self, rng: &mut StdRng) -> f64 {
        Distribution::sample(self, rng)
    }
}

/// Parameters of a randomly generated bidder dataset
pub struct DatasetParam {
    pub advertisers: usize,
    pub keywords: usize,
    /// How many distinct keywords each advertiser bids on (capped at `keywords`)
    pub keywords_per_advertiser: usize,
    pub budget_dist: Box<dyn DistributionF64>,
    pub bid_dist: Box<dyn DistributionF64>,
}

impl DatasetParam {
    /// Create a new DatasetParam with Distribution<f64> types
    /// The distributions will be boxed internally
    pub fn new<D1, D2>(
        advertisers: usize,
        keywords: usize,
        keywords_per_advertiser: usize,
        budget_dist: D1,
        bid_dist: D2,
    ) -> Self
    where
        D1: Distribution<f64> + 'static,
        D2: Distribution<f64> + 'static,
    {
        Self {
            advertisers,
            keywords,
            keywords_per_advertiser,
            budget_dist: Box::new(budget_dist),
            bid_dist: Box::new(bid_dist),
        }
    }
}

pub fn keyword_name(index: usize) -> String {
    format!("keyword-{}", index)
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Generate dataset rows; the budget is written on each advertiser's first row only,
/// the same layout as the reference dataset
pub fn generate_bid_rows(param: &DatasetParam, seed: u64) -> Vec<BidRow> {
    let mut rng_budget = StdRng::seed_from_u64(seed.wrapping_add(1991));
    let mut rng_keywords = StdRng::seed_from_u64(seed.wrapping_add(2992));
    let mut rng_bid = StdRng::seed_from_u64(seed.wrapping_add(3993));

    let keywords_per_advertiser = param.keywords_per_advertiser.min(param.keywords);
    let mut rows = Vec::with_capacity(param.advertisers * keywords_per_advertiser);
    for advertiser_id in 0..param.advertisers as u64 {
        let budget = round_to_cents(param.budget_dist.sample(&mut rng_budget).max(0.0));
        let chosen = index::sample(&mut rng_keywords, param.keywords, keywords_per_advertiser);
        for (position, keyword) in chosen.iter().enumerate() {
            let bid_value = round_to_cents(param.bid_dist.sample(&mut rng_bid)).max(0.01);
            rows.push(BidRow {
                line: rows.len() + 2,
                advertiser_id,
                keyword: keyword_name(keyword),
                bid_value,
                budget: (position == 0).then_some(budget),
            });
        }
    }
    rows
}

/// Draw queries uniformly over the keyword space
pub fn generate_queries(keywords: usize, count: usize, seed: u64) -> Vec<String> {
    if keywords == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(4994));
    (0..count).map(|_| keyword_name(rng.gen_range(0..keywords))).collect()
}
