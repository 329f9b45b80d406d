/// A randomly generated market: advertisers with log-normal budgets bid log-normal values on
/// a subset of keywords, and queries are drawn uniformly over the keyword space.
///
/// There is no closed form for the outcome here, so the scenario checks properties that hold
/// for any market:
///
/// - No policy beats the offline upper bound on average
///
/// - No advertiser is charged beyond its budget
///
/// - Sequential and parallel evaluation of the same seed agree exactly


use crate::bid_table::BidTable;
use crate::evaluation::{EvaluationConfig, EvaluationHarness};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::oracles::{OfflineOracleTrait, OracleUpperBound};
use crate::policies::PolicyType;
use crate::scenarios::Validation;
use crate::simulationrun::MatchingEngine;
use crate::synthetic::{generate_bid_rows, generate_queries, DatasetParam};
use crate::utils::{get_seed, lognormal_dist};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "synthetic_market",
    run,
});

const KEYWORDS: usize = 12;
const QUERIES: usize = 200;

fn prepare_bid_table() -> Result<BidTable, Box<dyn std::error::Error>> {
    let param = DatasetParam::new(
        8,
        KEYWORDS,
        5,
        lognormal_dist(50.0, 10.0)?,
        lognormal_dist(1.0, 0.5)?,
    );
    Ok(BidTable::new(generate_bid_rows(&param, get_seed(3111)))?)
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let bid_table = prepare_bid_table()?;
    let queries = generate_queries(KEYWORDS, QUERIES, get_seed(4222));
    let oracle = OracleUpperBound;
    let optimal_revenue = oracle.optimal_revenue(&bid_table, &queries);

    logln!(logger, LogEvent::Scenario, "Market: {} advertisers, {} bids, {} queries, {} {:.2}",
             bid_table.advertisers.len(), bid_table.bid_count(), queries.len(), oracle.oracle_name(), optimal_revenue);

    let harness = EvaluationHarness::new(MatchingEngine::new(&bid_table));
    let config = EvaluationConfig::new(50, get_seed(5333), Some(optimal_revenue));
    let mut sequential_config = config.clone();
    sequential_config.force_sequential = true;

    let mut validation = Validation::new();

    for policy_type in PolicyType::ALL {
        let policy = policy_type.create_policy();
        let variant = harness.run_variant(scenario_name, &queries, policy.as_ref(), &config, logger)?;
        let (base_run, evaluation) = (variant.base_run, variant.evaluation);

        validation.check(logger, base_run.revenue > 0.0, format!(
            "{}: base order sells something: {:.2}", policy_type, base_run.revenue
        ));
        validation.check(logger, base_run.ledger.within_budgets(), format!(
            "{}: no advertiser charged beyond its budget", policy_type
        ));
        validation.check(logger, (base_run.revenue - base_run.ledger.total_spent()).abs() < 1e-9, format!(
            "{}: revenue matches the total charged to advertisers", policy_type
        ));

        let ratio = evaluation.competitive_ratio.unwrap_or(f64::NAN);
        validation.check(logger, ratio <= 1.0, format!(
            "{}: average revenue {:.2} does not exceed the upper bound {:.2} (ratio {:.4})",
            policy_type, evaluation.average_revenue, optimal_revenue, ratio
        ));

        let sequential = harness.evaluate(&queries, policy.as_ref(), &sequential_config)?;
        validation.check(logger, sequential.revenues() == evaluation.revenues()
            && sequential.average_revenue == evaluation.average_revenue, format!(
            "{}: sequential evaluation reproduces every trial", policy_type
        ));
    }

    validation.finish(scenario_name)
}
