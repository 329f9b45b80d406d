/// Advertiser identifier as it appears in the bidder dataset
/// Ordering on ids is the tie-break order of every allocation policy
pub type AdvertiserId = u64;

/// Static description of an advertiser, read-only for the lifetime of a simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Advertiser {
    pub advertiser_id: AdvertiserId,
    pub budget: f64,
}

/// Budget state of one advertiser inside one trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvertiserState {
    pub advertiser_id: AdvertiserId,
    pub budget: f64,
    pub spent: f64,
}

impl AdvertiserState {
    /// Budget still available to be charged
    pub fn remaining(&self) -> f64 {
        self.budget - self.spent
    }

    /// Fraction of the budget already spent, 0 for a zero budget
    pub fn fraction_spent(&self) -> f64 {
        if self.budget > 0.0 {
            self.spent / self.budget
        } else {
            0.0
        }
    }

    /// Whether the full bid value fits in the remaining budget
    /// Bids are small relative to budgets, so a bid is never charged partially
    pub fn can_afford(&self, value: f64) -> bool {
        self.spent < self.budget && value <= self.remaining()
    }
}

/// Per-trial arena of advertiser budget states, indexed like `BidTable::advertisers`
///
/// A ledger is created fresh (every `spent` at 0) for each matching pass and owned by
/// that pass alone, so concurrent trials never share mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLedger {
    pub states: Vec<AdvertiserState>,
}

impl BudgetLedger {
    /// Create a ledger with nothing spent
    pub fn new(advertisers: &[Advertiser]) -> Self {
        Self {
            states: advertisers
                .iter()
                .map(|advertiser| AdvertiserState {
                    advertiser_id: advertiser.advertiser_id,
                    budget: advertiser.budget,
                    spent: 0.0,
                })
                .collect(),
        }
    }

    /// Charge an advertiser the given amount
    /// Callers only charge advertisers that passed the eligibility check for this amount
    pub fn charge(&mut self, advertiser_index: usize, amount: f64) {
        let state = &mut self.states[advertiser_index];
        debug_assert!(state.can_afford(amount), "charging advertiser {} beyond its budget", state.advertiser_id);
        state.spent += amount;
    }

    pub fn total_spent(&self) -> f64 {
        self.states.iter().map(|state| state.spent).sum()
    }

    /// True when no advertiser has spent more than its budget
    pub fn within_budgets(&self) -> bool {
        self.states.iter().all(|state| state.spent <= state.budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisers() -> Vec<Advertiser> {
        vec![
            Advertiser { advertiser_id: 1, budget: 100.0 },
            Advertiser { advertiser_id: 2, budget: 0.0 },
        ]
    }

    #[test]
    fn test_new_ledger_starts_empty() {
        let ledger = BudgetLedger::new(&advertisers());
        assert_eq!(ledger.states.len(), 2);
        assert!(ledger.states.iter().all(|state| state.spent == 0.0));
        assert_eq!(ledger.total_spent(), 0.0);
    }

    #[test]
    fn test_can_afford_exact_remaining_budget() {
        let mut ledger = BudgetLedger::new(&advertisers());
        for _ in 0..9 {
            ledger.charge(0, 10.0);
        }
        assert!(ledger.states[0].can_afford(10.0));
        ledger.charge(0, 10.0);
        assert_eq!(ledger.states[0].spent, 100.0);
        assert!(!ledger.states[0].can_afford(10.0));
        assert!(ledger.within_budgets());
    }

    #[test]
    fn test_zero_budget_is_never_eligible() {
        let ledger = BudgetLedger::new(&advertisers());
        let state = ledger.states[1];
        assert_eq!(state.fraction_spent(), 0.0);
        assert!(!state.can_afford(0.01));
    }

    #[test]
    fn test_fraction_spent() {
        let mut ledger = BudgetLedger::new(&advertisers());
        ledger.charge(0, 25.0);
        assert_eq!(ledger.states[0].fraction_spent(), 0.25);
        assert_eq!(ledger.states[0].remaining(), 75.0);
    }
}
