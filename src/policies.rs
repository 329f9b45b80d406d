/// Allocation policies deciding which eligible advertiser receives a query.
///
/// Every policy is a scoring rule over (bid, advertiser budget state). Selection is shared:
/// the highest score wins and equal scores go to the lowest advertiser id. The matching
/// engine only ever talks to `AllocationPolicyTrait`, it never asks which policy it holds.
///
/// - Greedy: score is the bid value
/// - Balance: score is the remaining budget, bid size is ignored for ranking
/// - MSVV: score is the bid value discounted by ψ(fraction of budget spent)

use std::fmt;
use std::str::FromStr;

use crate::advertisers::AdvertiserState;
use crate::bid_table::Bid;
use crate::errors::ConfigError;

/// Trait for allocation policies
pub trait AllocationPolicyTrait: Send + Sync {
    /// Score of giving the query to the bidder, given its current budget state
    fn score(&self, bid: &Bid, state: &AdvertiserState) -> f64;

    /// Short name used in logs and reports
    fn policy_name(&self) -> &'static str;

    /// Pick the winner among bids that are already known to be affordable
    ///
    /// # Arguments
    /// * `eligible_bids` - Bids on the current query whose advertiser can pay the full bid
    /// * `advertiser_states` - Budget state of every advertiser, indexed by `Bid::advertiser_index`
    ///
    /// # Returns
    /// The winning bid, or None if there are no eligible bids
    fn select(&self, eligible_bids: &[Bid], advertiser_states: &[AdvertiserState]) -> Option<Bid> {
        let mut best: Option<(Bid, f64)> = None;
        for bid in eligible_bids {
            let score = self.score(bid, &advertiser_states[bid.advertiser_index]);
            let better = match &best {
                None => true,
                Some((best_bid, best_score)) => {
                    score > *best_score || (score == *best_score && bid.advertiser_id < best_bid.advertiser_id)
                }
            };
            if better {
                best = Some((*bid, score));
            }
        }
        best.map(|(bid, _)| bid)
    }
}

/// Highest bid wins
pub struct PolicyGreedy;

impl AllocationPolicyTrait for PolicyGreedy {
    fn score(&self, bid: &Bid, _state: &AdvertiserState) -> f64 {
        bid.value
    }

    fn policy_name(&self) -> &'static str {
        "greedy"
    }
}

/// Largest unspent budget wins
pub struct PolicyBalance;

impl AllocationPolicyTrait for PolicyBalance {
    fn score(&self, _bid: &Bid, state: &AdvertiserState) -> f64 {
        state.remaining()
    }

    fn policy_name(&self) -> &'static str {
        "balance"
    }
}

/// Bid scaled by how much budget is left (Mehta, Saberi, Vazirani, Vazirani)
pub struct PolicyMsvv;

impl PolicyMsvv {
    /// ψ(x) = 1 - e^(x - 1), x being the fraction of budget spent
    pub fn psi(fraction_spent: f64) -> f64 {
        1.0 - (fraction_spent - 1.0).exp()
    }
}

impl AllocationPolicyTrait for PolicyMsvv {
    fn score(&self, bid: &Bid, state: &AdvertiserState) -> f64 {
        bid.value * Self::psi(state.fraction_spent())
    }

    fn policy_name(&self) -> &'static str {
        "msvv"
    }
}

/// Policy selector as named on the command line
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyType {
    GREEDY,
    BALANCE,
    MSVV,
}

impl PolicyType {
    pub const ALL: [PolicyType; 3] = [PolicyType::GREEDY, PolicyType::BALANCE, PolicyType::MSVV];

    pub fn create_policy(&self) -> Box<dyn AllocationPolicyTrait> {
        match self {
            PolicyType::GREEDY => Box::new(PolicyGreedy),
            PolicyType::BALANCE => Box::new(PolicyBalance),
            PolicyType::MSVV => Box::new(PolicyMsvv),
        }
    }
}

impl FromStr for PolicyType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" => Ok(PolicyType::GREEDY),
            "balance" => Ok(PolicyType::BALANCE),
            "msvv" => Ok(PolicyType::MSVV),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyType::GREEDY => "greedy",
            PolicyType::BALANCE => "balance",
            PolicyType::MSVV => "msvv",
        };
        f.pad(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(advertiser_id: u64, budget: f64, spent: f64) -> AdvertiserState {
        AdvertiserState { advertiser_id, budget, spent }
    }

    fn bid(advertiser_index: usize, advertiser_id: u64, value: f64) -> Bid {
        Bid { advertiser_index, advertiser_id, value }
    }

    #[test]
    fn test_empty_eligible_set_selects_nothing() {
        for policy_type in PolicyType::ALL {
            let policy = policy_type.create_policy();
            assert_eq!(policy.select(&[], &[]), None);
        }
    }

    #[test]
    fn test_greedy_picks_highest_bid() {
        let states = vec![state(1, 100.0, 0.0), state(2, 100.0, 0.0)];
        let bids = vec![bid(0, 1, 3.0), bid(1, 2, 4.0)];
        assert_eq!(PolicyGreedy.select(&bids, &states).map(|b| b.advertiser_id), Some(2));
    }

    #[test]
    fn test_greedy_tie_goes_to_lowest_id() {
        let states = vec![state(4, 100.0, 90.0), state(9, 100.0, 0.0)];
        // Order of eligible bids must not matter
        let bids = vec![bid(1, 9, 5.0), bid(0, 4, 5.0)];
        assert_eq!(PolicyGreedy.select(&bids, &states).map(|b| b.advertiser_id), Some(4));
    }

    #[test]
    fn test_balance_ignores_bid_size() {
        let states = vec![state(1, 100.0, 10.0), state(2, 100.0, 50.0)];
        let bids = vec![bid(0, 1, 1.0), bid(1, 2, 40.0)];
        let winner = PolicyBalance.select(&bids, &states).unwrap();
        assert_eq!(winner.advertiser_id, 1);
        // Charged amount is still the bid of the winner
        assert_eq!(winner.value, 1.0);
    }

    #[test]
    fn test_balance_tie_goes_to_lowest_id() {
        let states = vec![state(1, 50.0, 0.0), state(2, 80.0, 30.0)];
        let bids = vec![bid(1, 2, 1.0), bid(0, 1, 1.0)];
        assert_eq!(PolicyBalance.select(&bids, &states).map(|b| b.advertiser_id), Some(1));
    }

    #[test]
    fn test_psi_boundaries() {
        assert!((PolicyMsvv::psi(0.0) - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
        assert_eq!(PolicyMsvv::psi(1.0), 0.0);
        assert!(PolicyMsvv::psi(0.999) < 0.001);
        assert!(PolicyMsvv::psi(0.2) > PolicyMsvv::psi(0.8));
    }

    #[test]
    fn test_msvv_score_at_zero_spend() {
        let score = PolicyMsvv.score(&bid(0, 1, 10.0), &state(1, 100.0, 0.0));
        assert!((score - 10.0 * (1.0 - (-1.0f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_msvv_prefers_less_depleted_bidder_on_equal_bids() {
        let states = vec![state(1, 100.0, 95.0), state(2, 100.0, 20.0)];
        let bids = vec![bid(0, 1, 5.0), bid(1, 2, 5.0)];
        assert_eq!(PolicyMsvv.select(&bids, &states).map(|b| b.advertiser_id), Some(2));
    }

    #[test]
    fn test_msvv_trades_off_bid_and_spend() {
        // 10 * psi(0.9) ≈ 0.95 vs 2 * psi(0) ≈ 1.26
        let states = vec![state(1, 100.0, 90.0), state(2, 100.0, 0.0)];
        let bids = vec![bid(0, 1, 10.0), bid(1, 2, 2.0)];
        assert_eq!(PolicyMsvv.select(&bids, &states).map(|b| b.advertiser_id), Some(2));
        // Greedy on the same input takes the big bid
        assert_eq!(PolicyGreedy.select(&bids, &states).map(|b| b.advertiser_id), Some(1));
    }

    #[test]
    fn test_policy_type_parsing() {
        assert_eq!("greedy".parse::<PolicyType>(), Ok(PolicyType::GREEDY));
        assert_eq!("Balance".parse::<PolicyType>(), Ok(PolicyType::BALANCE));
        assert_eq!("MSVV".parse::<PolicyType>(), Ok(PolicyType::MSVV));
        assert_eq!("random".parse::<PolicyType>(), Err(ConfigError::UnknownPolicy("random".to_string())));
        for policy_type in PolicyType::ALL {
            assert_eq!(policy_type.create_policy().policy_name(), policy_type.to_string());
        }
    }
}
