/// This file contains the MatchingEngine, which runs one single online pass over a query sequence
/// (which is then repeated over many permutations by evaluation.rs).
///
/// Queries are processed strictly in arrival order. For every query the engine filters the bids on
/// its keyword down to advertisers that can still pay the full bid, lets the allocation policy pick
/// one, and charges exactly that bid. Nothing is ever reassigned.


use crate::advertisers::{AdvertiserId, BudgetLedger};
use crate::bid_table::{Bid, BidTable};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::policies::AllocationPolicyTrait;
use crate::utils::TOTAL_SIMULATION_RUNS;
use std::sync::atomic::Ordering;

/// Outcome of one query
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Advertiser {
        advertiser_id: AdvertiserId,
        advertiser_index: usize,
        charged: f64,
    },
    /// Nobody bids on the keyword
    NO_BIDS,
    /// There are bids, but no bidder has enough budget left
    BUDGETS_EXHAUSTED,
}

impl Assignment {
    pub fn is_matched(&self) -> bool {
        matches!(self, Assignment::Advertiser { .. })
    }

    pub fn charged(&self) -> f64 {
        match self {
            Assignment::Advertiser { charged, .. } => *charged,
            _ => 0.0,
        }
    }
}

/// Result of one matching pass
/// Note: assignments are matched to the processed query sequence by index
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub revenue: f64,
    pub assignments: Vec<Assignment>,
    /// Budget state after the last query
    pub ledger: BudgetLedger,
}

impl RunResult {
    pub fn matched_count(&self) -> usize {
        self.assignments.iter().filter(|assignment| assignment.is_matched()).count()
    }

    /// Write the assignment trace in CSV format to the Assignment event
    pub fn log_trace<Q: AsRef<str>>(&self, queries: &[Q], logger: &mut Logger) {
        logln!(logger, LogEvent::Assignment, "query_index,keyword,advertiser_id,charged");
        for (index, (query, assignment)) in queries.iter().zip(&self.assignments).enumerate() {
            let winner = match assignment {
                Assignment::Advertiser { advertiser_id, .. } => advertiser_id.to_string(),
                Assignment::NO_BIDS => "NO_BIDS".to_string(),
                Assignment::BUDGETS_EXHAUSTED => "BUDGETS_EXHAUSTED".to_string(),
            };
            logln!(logger, LogEvent::Assignment, "{},{},{},{:.4}", index, query.as_ref(), winner, assignment.charged());
        }
    }
}

/// Runs queries against a bid table, one pass at a time
pub struct MatchingEngine<'a> {
    pub bid_table: &'a BidTable,
}

impl<'a> MatchingEngine<'a> {
    pub fn new(bid_table: &'a BidTable) -> Self {
        Self { bid_table }
    }

    /// Run a single online pass
    ///
    /// # Arguments
    /// * `queries` - Query keywords in arrival order
    /// * `policy` - Allocation policy consulted once per query
    ///
    /// # Returns
    /// Total revenue, one assignment per query and the final ledger
    pub fn run<Q: AsRef<str>>(&self, queries: &[Q], policy: &dyn AllocationPolicyTrait) -> RunResult {
        TOTAL_SIMULATION_RUNS.fetch_add(1, Ordering::Relaxed);

        let mut ledger = BudgetLedger::new(&self.bid_table.advertisers);
        let mut assignments = Vec::with_capacity(queries.len());
        let mut revenue = 0.0;
        let mut eligible_bids: Vec<Bid> = Vec::new();

        for query in queries {
            let bids = self.bid_table.bids_for(query.as_ref());

            eligible_bids.clear();
            eligible_bids.extend(
                bids.iter()
                    .filter(|bid| ledger.states[bid.advertiser_index].can_afford(bid.value))
                    .copied(),
            );

            let assignment = match policy.select(&eligible_bids, &ledger.states) {
                Some(bid) => {
                    ledger.charge(bid.advertiser_index, bid.value);
                    revenue += bid.value;
                    Assignment::Advertiser {
                        advertiser_id: bid.advertiser_id,
                        advertiser_index: bid.advertiser_index,
                        charged: bid.value,
                    }
                }
                None if bids.is_empty() => Assignment::NO_BIDS,
                None => Assignment::BUDGETS_EXHAUSTED,
            };
            assignments.push(assignment);
        }

        RunResult { revenue, assignments, ledger }
    }
}

/// Statistics for a single advertiser
pub struct AdvertiserStat {
    pub advertiser_id: AdvertiserId,
    pub queries_won: usize,
    pub spent: f64,
    pub budget: f64,
}

/// Complete statistics of one matching pass
pub struct RunStat {
    pub advertiser_stats: Vec<AdvertiserStat>,
    pub revenue: f64,
    pub matched_count: usize,
    pub no_bids_count: usize,
    pub budgets_exhausted_count: usize,
}

impl RunStat {
    /// Generate statistics from a run result
    pub fn new(run_result: &RunResult) -> Self {
        let mut advertiser_stats: Vec<AdvertiserStat> = run_result
            .ledger
            .states
            .iter()
            .map(|state| AdvertiserStat {
                advertiser_id: state.advertiser_id,
                queries_won: 0,
                spent: state.spent,
                budget: state.budget,
            })
            .collect();

        let mut matched_count = 0;
        let mut no_bids_count = 0;
        let mut budgets_exhausted_count = 0;
        for assignment in &run_result.assignments {
            match assignment {
                Assignment::Advertiser { advertiser_index, .. } => {
                    matched_count += 1;
                    advertiser_stats[*advertiser_index].queries_won += 1;
                }
                Assignment::NO_BIDS => no_bids_count += 1,
                Assignment::BUDGETS_EXHAUSTED => budgets_exhausted_count += 1,
            }
        }

        Self {
            advertiser_stats,
            revenue: run_result.revenue,
            matched_count,
            no_bids_count,
            budgets_exhausted_count,
        }
    }

    /// Output advertiser statistics
    pub fn printout_advertisers(&self, logger: &mut Logger, event: LogEvent) {
        for stat in &self.advertiser_stats {
            let utilization = if stat.budget > 0.0 { stat.spent / stat.budget } else { 0.0 };
            logln!(logger, event, "  Advertiser {}: won {} queries, spent {:.2} / {:.2} ({:.1}%)",
                     stat.advertiser_id, stat.queries_won, stat.spent, stat.budget, utilization * 100.0);
        }
    }

    /// Output overall statistics
    pub fn printout_overall(&self, logger: &mut Logger, event: LogEvent) {
        logln!(logger, event, "Revenue: {:.2}", self.revenue);
        logln!(logger, event, "Queries (matched/no bids/budgets exhausted): {} / {} / {}",
                 self.matched_count, self.no_bids_count, self.budgets_exhausted_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bid_table::tests::row;
    use crate::policies::{PolicyBalance, PolicyGreedy, PolicyMsvv, PolicyType};

    fn two_equal_bidders() -> BidTable {
        BidTable::new(vec![
            row(2, 1, "x", 10.0, Some(100.0)),
            row(3, 2, "x", 10.0, Some(100.0)),
        ])
        .unwrap()
    }

    fn winners(result: &RunResult) -> Vec<Option<AdvertiserId>> {
        result
            .assignments
            .iter()
            .map(|assignment| match assignment {
                Assignment::Advertiser { advertiser_id, .. } => Some(*advertiser_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_two_equal_bidders_greedy() {
        let table = two_equal_bidders();
        let queries = vec!["x"; 11];
        let result = MatchingEngine::new(&table).run(&queries, &PolicyGreedy);

        assert_eq!(result.revenue, 110.0);
        assert_eq!(result.matched_count(), 11);
        let stat = RunStat::new(&result);
        // Ties on the bid keep going to advertiser 1 until it is exhausted
        assert_eq!(stat.advertiser_stats[0].queries_won, 10);
        assert_eq!(stat.advertiser_stats[1].queries_won, 1);
        assert_eq!(result.ledger.states[0].spent, 100.0);
    }

    #[test]
    fn test_two_equal_bidders_balance_and_msvv_alternate() {
        let table = two_equal_bidders();
        let queries = vec!["x"; 11];
        let policies: [&dyn AllocationPolicyTrait; 2] = [&PolicyBalance, &PolicyMsvv];
        for policy in policies {
            let result = MatchingEngine::new(&table).run(&queries, policy);
            assert_eq!(result.revenue, 110.0);
            assert_eq!(
                winners(&result),
                vec![Some(1), Some(2), Some(1), Some(2), Some(1), Some(2), Some(1), Some(2), Some(1), Some(2), Some(1)]
            );
            let stat = RunStat::new(&result);
            assert_eq!(stat.advertiser_stats[0].queries_won, 6);
            assert_eq!(stat.advertiser_stats[1].queries_won, 5);
        }
    }

    #[test]
    fn test_budgets_run_out() {
        let table = two_equal_bidders();
        let queries = vec!["x"; 25];
        for policy_type in PolicyType::ALL {
            let result = MatchingEngine::new(&table).run(&queries, policy_type.create_policy().as_ref());
            assert_eq!(result.revenue, 200.0);
            assert_eq!(result.matched_count(), 20);
            assert!(result.assignments[20..].iter().all(|a| *a == Assignment::BUDGETS_EXHAUSTED));
            assert!(result.ledger.within_budgets());
        }
    }

    #[test]
    fn test_unknown_keyword_is_unassigned() {
        let table = two_equal_bidders();
        let queries = vec!["y", "x", "y"];
        for policy_type in PolicyType::ALL {
            let result = MatchingEngine::new(&table).run(&queries, policy_type.create_policy().as_ref());
            assert_eq!(result.revenue, 10.0);
            assert_eq!(result.assignments[0], Assignment::NO_BIDS);
            assert_eq!(result.assignments[2], Assignment::NO_BIDS);
            let stat = RunStat::new(&result);
            assert_eq!(stat.no_bids_count, 2);
            assert_eq!(stat.matched_count, 1);
        }
    }

    #[test]
    fn test_bid_larger_than_remaining_budget_is_skipped() {
        let table = BidTable::new(vec![
            row(2, 1, "x", 8.0, Some(10.0)),
            row(3, 2, "x", 3.0, Some(10.0)),
        ])
        .unwrap();
        let result = MatchingEngine::new(&table).run(&["x", "x", "x"], &PolicyGreedy);
        // 1 pays 8, then cannot afford another 8, so 2 takes the rest
        assert_eq!(winners(&result), vec![Some(1), Some(2), Some(2)]);
        assert_eq!(result.revenue, 14.0);
    }

    #[test]
    fn test_empty_sequence() {
        let table = two_equal_bidders();
        let queries: Vec<String> = Vec::new();
        let result = MatchingEngine::new(&table).run(&queries, &PolicyMsvv);
        assert_eq!(result.revenue, 0.0);
        assert!(result.assignments.is_empty());
    }

    #[test]
    fn test_run_is_deterministic() {
        let table = BidTable::new(vec![
            row(2, 1, "a", 1.0, Some(4.0)),
            row(3, 1, "b", 2.0, None),
            row(4, 2, "a", 3.0, Some(5.0)),
            row(5, 3, "b", 2.0, Some(3.0)),
        ])
        .unwrap();
        let queries = vec!["a", "b", "b", "a", "c", "b", "a", "a"];
        for policy_type in PolicyType::ALL {
            let policy = policy_type.create_policy();
            let first = MatchingEngine::new(&table).run(&queries, policy.as_ref());
            let second = MatchingEngine::new(&table).run(&queries, policy.as_ref());
            assert_eq!(first, second);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        const KEYWORDS: [&str; 5] = ["a", "b", "c", "d", "unbid"];

        fn instance() -> impl Strategy<Value = (Vec<(u64, usize, u32, u32)>, Vec<usize>)> {
            (
                prop::collection::vec((0u64..6, 0usize..4, 1u32..10, 0u32..40), 1..20),
                prop::collection::vec(0usize..5, 0..80),
            )
        }

        fn build(raw_bids: &[(u64, usize, u32, u32)]) -> BidTable {
            let mut seen = HashSet::new();
            let mut budgets = std::collections::HashMap::new();
            let mut rows = Vec::new();
            for (line, &(advertiser_id, keyword, value, budget)) in raw_bids.iter().enumerate() {
                if !seen.insert((advertiser_id, keyword)) {
                    continue;
                }
                let budget = *budgets.entry(advertiser_id).or_insert(budget);
                rows.push(row(line + 2, advertiser_id, KEYWORDS[keyword], value as f64, Some(budget as f64)));
            }
            BidTable::new(rows).unwrap()
        }

        proptest! {
            #[test]
            fn prop_budget_invariant_and_revenue_bounds((raw_bids, raw_queries) in instance()) {
                let table = build(&raw_bids);
                let queries: Vec<&str> = raw_queries.iter().map(|&k| KEYWORDS[k]).collect();
                let max_chargeable: f64 = queries
                    .iter()
                    .map(|q| table.bids_for(q).iter().map(|bid| bid.value).fold(0.0, f64::max))
                    .sum();

                for policy_type in PolicyType::ALL {
                    let policy = policy_type.create_policy();
                    let result = MatchingEngine::new(&table).run(&queries, policy.as_ref());

                    // Replay the trace and check the invariant after every step
                    let mut spent = vec![0.0; table.advertisers.len()];
                    for assignment in &result.assignments {
                        if let Assignment::Advertiser { advertiser_index, charged, .. } = assignment {
                            spent[*advertiser_index] += charged;
                            prop_assert!(spent[*advertiser_index] <= table.advertisers[*advertiser_index].budget);
                        }
                    }
                    prop_assert!(result.ledger.within_budgets());
                    prop_assert!(result.revenue <= table.total_budget());
                    prop_assert!(result.revenue <= max_chargeable);
                    prop_assert_eq!(result.revenue, result.ledger.total_spent());

                    let again = MatchingEngine::new(&table).run(&queries, policy.as_ref());
                    prop_assert_eq!(&result, &again);
                }
            }
        }
    }
}
