/// The textbook instance where Greedy only gets half of the optimum.
///
/// Advertiser 1 bids 1 on "x" and "y", advertiser 2 bids 1 on "x" only, both with budget 4.
/// Four "x" queries arrive, then four "y" queries. The offline optimum gives the "x" queries
/// to advertiser 2 and the "y" queries to advertiser 1, earning 8.
///
/// - Greedy: advertiser 1 wins every tied "x" and has nothing left for "y" (4)
///
/// - Balance / MSVV: the "x" queries are shared, so advertiser 1 still pays for two "y" (6)
///
/// Over random permutations no policy can drop below half of the optimum here, since a query
/// only goes unsold once advertiser 1 has spent its whole budget.


use crate::bid_table::{BidRow, BidTable};
use crate::evaluation::{EvaluationConfig, EvaluationHarness};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::oracles::{OfflineOracleTrait, OracleUpperBound};
use crate::policies::PolicyType;
use crate::scenarios::Validation;
use crate::simulationrun::MatchingEngine;
use crate::utils::get_seed;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "greedy_adversarial",
    run,
});

fn prepare_bid_table() -> Result<BidTable, crate::errors::DataError> {
    let bids = [(1, "x", Some(4.0)), (1, "y", None), (2, "x", Some(4.0))];
    let rows = bids
        .into_iter()
        .enumerate()
        .map(|(index, (advertiser_id, keyword, budget))| BidRow {
            line: index + 2,
            advertiser_id,
            keyword: keyword.to_string(),
            bid_value: 1.0,
            budget,
        })
        .collect();
    BidTable::new(rows)
}

fn prepare_queries() -> Vec<String> {
    ["x", "x", "x", "x", "y", "y", "y", "y"].iter().map(|q| q.to_string()).collect()
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bid_table = prepare_bid_table()?;
    let queries = prepare_queries();
    let optimal_revenue = OracleUpperBound.optimal_revenue(&bid_table, &queries);

    let harness = EvaluationHarness::new(MatchingEngine::new(&bid_table));
    let config = EvaluationConfig::new(200, get_seed(0), Some(optimal_revenue));

    logln!(logger, LogEvent::Scenario, "");
    let mut validation = Validation::new();

    validation.check(logger, optimal_revenue == 8.0, format!(
        "Upper bound equals the known optimum of 8: {:.2}", optimal_revenue
    ));

    for policy_type in PolicyType::ALL {
        let policy = policy_type.create_policy();
        let variant = harness.run_variant(scenario_name, &queries, policy.as_ref(), &config, logger)?;
        let evaluation = variant.evaluation;
        let base_revenue = variant.base_run.revenue;

        let expected = match policy_type {
            PolicyType::GREEDY => 4.0,
            PolicyType::BALANCE | PolicyType::MSVV => 6.0,
        };
        validation.check(logger, base_revenue == expected, format!(
            "{}: base order revenue is {:.0}: {:.2}", policy_type, expected, base_revenue
        ));

        validation.check(logger, evaluation.min_revenue >= optimal_revenue / 2.0, format!(
            "{}: every permutation earns at least half the optimum: min {:.2} >= {:.2}",
            policy_type, evaluation.min_revenue, optimal_revenue / 2.0
        ));

        let ratio = evaluation.competitive_ratio.unwrap_or(f64::NAN);
        validation.check(logger, ratio <= 1.0, format!(
            "{}: competitive ratio does not exceed 1: {:.4}", policy_type, ratio
        ));
    }

    validation.finish(scenario_name)
}
