/// Two advertisers with identical budgets (100) bid 10 on the same keyword, and the keyword
/// arrives 11 times.
///
/// Every policy sells all 11 queries (revenue 110), but they split them differently:
///
/// - Greedy: the bids tie, so the lower id keeps winning until its budget is gone (10 / 1)
///
/// - Balance: alternates on remaining budget, lower id first (6 / 5)
///
/// - MSVV: same alternation, since equal bids leave only the spent fraction to compare (6 / 5)


use crate::bid_table::{BidRow, BidTable};
use crate::evaluation::{EvaluationConfig, EvaluationHarness};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::oracles::{OfflineOracleTrait, OracleBudgetSum};
use crate::policies::PolicyType;
use crate::scenarios::Validation;
use crate::simulationrun::{MatchingEngine, RunStat};
use crate::utils::get_seed;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "two_equal_bidders",
    run,
});

fn prepare_bid_table() -> Result<BidTable, crate::errors::DataError> {
    let rows = [1, 2]
        .into_iter()
        .enumerate()
        .map(|(index, advertiser_id)| BidRow {
            line: index + 2,
            advertiser_id,
            keyword: "x".to_string(),
            bid_value: 10.0,
            budget: Some(100.0),
        })
        .collect();
    BidTable::new(rows)
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bid_table = prepare_bid_table()?;
    let queries = vec!["x".to_string(); 11];
    let optimal_revenue = OracleBudgetSum.optimal_revenue(&bid_table, &queries);

    let harness = EvaluationHarness::new(MatchingEngine::new(&bid_table));
    let config = EvaluationConfig::new(20, get_seed(0), Some(optimal_revenue));

    logln!(logger, LogEvent::Scenario, "");
    let mut validation = Validation::new();

    for policy_type in PolicyType::ALL {
        let policy = policy_type.create_policy();
        let variant = harness.run_variant(scenario_name, &queries, policy.as_ref(), &config, logger)?;
        let evaluation = variant.evaluation;
        let stat = RunStat::new(&variant.base_run);

        validation.check(logger, stat.revenue == 110.0, format!(
            "{}: all 11 queries sold for 110 on base order: {:.2}",
            policy_type, stat.revenue
        ));

        let expected_split = match policy_type {
            PolicyType::GREEDY => (10, 1),
            PolicyType::BALANCE | PolicyType::MSVV => (6, 5),
        };
        let split = (stat.advertiser_stats[0].queries_won, stat.advertiser_stats[1].queries_won);
        validation.check(logger, split == expected_split, format!(
            "{}: queries split {} / {} between advertisers 1 and 2 (expected {} / {})",
            policy_type, split.0, split.1, expected_split.0, expected_split.1
        ));

        // Every permutation of identical queries is the same sequence
        validation.check(logger, evaluation.average_revenue == 110.0, format!(
            "{}: average revenue over {} permutations is 110: {:.2}",
            policy_type, config.trials, evaluation.average_revenue
        ));
    }

    validation.finish(scenario_name)
}
