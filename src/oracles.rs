use std::collections::HashMap;
use std::str::FromStr;

use crate::bid_table::BidTable;
use crate::errors::ConfigError;

/// Provider of the offline optimal revenue used as the competitive-ratio denominator
///
/// Implementations are estimators over the static input; none of them solves the
/// offline allocation problem exactly.
pub trait OfflineOracleTrait {
    fn optimal_revenue(&self, bid_table: &BidTable, queries: &[String]) -> f64;

    fn oracle_name(&self) -> String;
}

/// Sum of all advertiser budgets
pub struct OracleBudgetSum;

impl OfflineOracleTrait for OracleBudgetSum {
    fn optimal_revenue(&self, bid_table: &BidTable, _queries: &[String]) -> f64 {
        bid_table.total_budget()
    }

    fn oracle_name(&self) -> String {
        "budget sum".to_string()
    }
}

/// Tightest of two bounds no offline allocation can beat:
/// - each advertiser earns at most min(budget, sum of its bids over the query sequence)
/// - each query earns at most its highest bid
pub struct OracleUpperBound;

impl OfflineOracleTrait for OracleUpperBound {
    fn optimal_revenue(&self, bid_table: &BidTable, queries: &[String]) -> f64 {
        let mut query_counts: HashMap<&str, usize> = HashMap::new();
        for query in queries {
            *query_counts.entry(query.as_str()).or_insert(0) += 1;
        }

        let mut demand = vec![0.0; bid_table.advertisers.len()];
        let mut per_query_bound = 0.0;
        for (keyword, count) in &query_counts {
            let bids = bid_table.bids_for(keyword);
            for bid in bids {
                demand[bid.advertiser_index] += bid.value * *count as f64;
            }
            let best = bids.iter().map(|bid| bid.value).fold(0.0, f64::max);
            per_query_bound += best * *count as f64;
        }

        let per_advertiser_bound: f64 = bid_table
            .advertisers
            .iter()
            .zip(&demand)
            .map(|(advertiser, demand)| advertiser.budget.min(*demand))
            .sum();

        per_advertiser_bound.min(per_query_bound)
    }

    fn oracle_name(&self) -> String {
        "upper bound".to_string()
    }
}

/// Externally known optimum
pub struct OracleFixed {
    pub revenue: f64,
}

impl OfflineOracleTrait for OracleFixed {
    fn optimal_revenue(&self, _bid_table: &BidTable, _queries: &[String]) -> f64 {
        self.revenue
    }

    fn oracle_name(&self) -> String {
        format!("fixed {:.2}", self.revenue)
    }
}

/// Where the competitive-ratio denominator comes from, as chosen on the command line
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimalSource {
    BUDGET_SUM,
    UPPER_BOUND,
    NONE,
    FIXED(f64),
}

impl OptimalSource {
    /// Oracle for this source; None disables the competitive ratio
    pub fn create_oracle(&self) -> Option<Box<dyn OfflineOracleTrait>> {
        match self {
            OptimalSource::BUDGET_SUM => Some(Box::new(OracleBudgetSum)),
            OptimalSource::UPPER_BOUND => Some(Box::new(OracleUpperBound)),
            OptimalSource::NONE => None,
            OptimalSource::FIXED(revenue) => Some(Box::new(OracleFixed { revenue: *revenue })),
        }
    }
}

impl FromStr for OptimalSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "budget-sum" => Ok(OptimalSource::BUDGET_SUM),
            "upper-bound" => Ok(OptimalSource::UPPER_BOUND),
            "none" => Ok(OptimalSource::NONE),
            other => other.parse::<f64>().map(OptimalSource::FIXED).map_err(|_| {
                ConfigError::InvalidArgument(format!(
                    "invalid optimal revenue source '{}' (expected budget-sum, upper-bound, none or a number)",
                    other
                ))
            }),
        }
    }
}
