
mod utils;
mod logger;
mod errors;
mod advertisers;
mod bid_table;
mod policies;
mod simulationrun;
mod evaluation;
mod oracles;
mod dataset;
mod synthetic;
mod charts;
mod scenarios;


use bid_table::BidTable;
use errors::ConfigError;
use evaluation::{EvaluationConfig, EvaluationHarness};
use logger::{Logger, LogEvent, ConsoleReceiver, FileReceiver, sanitize_filename};
use oracles::OptimalSource;
use policies::PolicyType;
use simulationrun::MatchingEngine;
use std::error::Error;
use std::path::{Path, PathBuf};

use scenarios::get_scenario_catalog;
use utils::{DEFAULT_TRIALS, RAND_SEED, TOTAL_SIMULATION_RUNS, VERBOSE_ASSIGNMENTS};
use std::sync::atomic::Ordering;

/// Arguments of the `evaluate` command
#[derive(Debug, PartialEq)]
struct EvaluateArgs {
    policies: Vec<PolicyType>,
    bidders_path: PathBuf,
    queries_path: PathBuf,
    trials: usize,
    seed: u64,
    optimal: OptimalSource,
    sequential: bool,
    charts: bool,
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::InvalidArgument(format!("{} expects a value", flag)))?;
    value
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidArgument(format!("invalid value '{}' for {}. Expected a number.", value, flag)))
}

/// Parse everything after `evaluate`
fn parse_evaluate_args(args: &[String]) -> Result<EvaluateArgs, ConfigError> {
    let mut positional = Vec::new();
    let mut trials = DEFAULT_TRIALS;
    let mut seed = 0;
    let mut optimal = OptimalSource::BUDGET_SUM;
    let mut sequential = false;
    let mut charts = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--trials" => trials = parse_number("--trials", iter.next())?,
            "--seed" => seed = parse_number("--seed", iter.next())?,
            "--optimal" => {
                let value = iter
                    .next()
                    .ok_or_else(|| ConfigError::InvalidArgument("--optimal expects a value".to_string()))?;
                optimal = value.parse()?;
            }
            "--sequential" => sequential = true,
            "--charts" => charts = true,
            flag if flag.starts_with("--") => {
                return Err(ConfigError::InvalidArgument(format!("unknown option '{}'", flag)));
            }
            _ => positional.push(arg.clone()),
        }
    }

    if positional.len() != 3 {
        return Err(ConfigError::InvalidArgument(
            "usage: evaluate <greedy|balance|msvv|all> <bidders.csv> <queries.txt> [--trials N] [--seed N] \
             [--optimal budget-sum|upper-bound|none|<value>] [--sequential] [--charts] [--verbose assignments]"
                .to_string(),
        ));
    }
    let policies = if positional[0] == "all" {
        PolicyType::ALL.to_vec()
    } else {
        vec![positional[0].parse()?]
    };

    Ok(EvaluateArgs {
        policies,
        bidders_path: PathBuf::from(&positional[1]),
        queries_path: PathBuf::from(&positional[2]),
        trials,
        seed,
        optimal,
        sequential,
        charts,
    })
}

/// Load the datasets and evaluate every requested policy
fn run_evaluate(args: &EvaluateArgs) -> Result<(), Box<dyn Error>> {
    let bid_table = BidTable::new(dataset::read_bidder_dataset(&args.bidders_path)?)?;
    let queries = dataset::read_queries(&args.queries_path)?;

    let mut logger = Logger::new();
    logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Policy, LogEvent::Validation]));

    let optimal_revenue = match args.optimal.create_oracle() {
        Some(oracle) => {
            let optimal_revenue = oracle.optimal_revenue(&bid_table, &queries);
            logln!(&mut logger, LogEvent::Validation, "Optimal revenue ({}): {:.2}", oracle.oracle_name(), optimal_revenue);
            Some(optimal_revenue)
        }
        None => None,
    };
    logln!(&mut logger, LogEvent::Validation, "{} advertisers, {} keywords, {} bids, {} queries, {} trials, seed {}",
             bid_table.advertisers.len(), bid_table.keywords().len(), bid_table.bid_count(), queries.len(), args.trials, args.seed);
    let unbid = queries.iter().filter(|query| bid_table.bids_for(query).is_empty()).count();
    if unbid > 0 {
        warnln!(&mut logger, LogEvent::Validation, "{} of {} queries have no bids and can never be matched", unbid, queries.len());
    }

    let mut config = EvaluationConfig::new(args.trials, args.seed, optimal_revenue);
    config.force_sequential = args.sequential;
    config.validate()?;

    let harness = EvaluationHarness::new(MatchingEngine::new(&bid_table));
    let mut evaluations = Vec::with_capacity(args.policies.len());
    let mut summaries = Vec::with_capacity(args.policies.len());
    for policy_type in &args.policies {
        let policy = policy_type.create_policy();
        let variant = harness.run_variant("evaluate", &queries, policy.as_ref(), &config, &mut logger)?;
        let evaluation = variant.evaluation;
        let base_revenue = variant.base_run.revenue;
        let ratio = match evaluation.competitive_ratio {
            Some(ratio) => format!("{:.4}", ratio),
            None => "n/a".to_string(),
        };
        summaries.push(format!("{:<8} base order {:>12.2}   average {:>12.2}   competitive ratio {}",
                               policy_type, base_revenue, evaluation.average_revenue, ratio));
        evaluations.push(evaluation);
    }

    logln!(&mut logger, LogEvent::Validation, "\n=== Summary ===");
    for summary in &summaries {
        logln!(&mut logger, LogEvent::Validation, "{}", summary);
    }

    if args.charts {
        for path in charts::generate_revenue_histograms(&evaluations, Path::new("charts"))? {
            logln!(&mut logger, LogEvent::Validation, "Histogram written to {}", path.display());
        }
    }
    logger.flush()?;
    Ok(())
}

/// Run catalog scenarios for a number of seeded iterations
fn run_scenarios(scenario_arg: &str, iterations: u64, start_iteration: u64, fastbreak: bool) -> Result<(), Box<dyn Error>> {
    // Get all scenarios from the catalog
    let all_scenarios = get_scenario_catalog();

    // Filter scenarios: if "all", use all scenarios; otherwise filter to the named scenario
    let scenarios: Vec<_> = if scenario_arg == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                let names: Vec<&str> = all_scenarios.iter().map(|s| s.short_name).collect();
                return Err(format!("Scenario '{}' not found. Available scenarios: {}", scenario_arg, names.join(", ")).into());
            }
        }
    };

    // Show individual validations only for a single scenario run once
    let mut logger = Logger::new();
    if scenario_arg != "all" && iterations == 1 {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    }
    let summary_receiver_id = logger.add_receiver(FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation])?);

    TOTAL_SIMULATION_RUNS.store(0, Ordering::Relaxed);
    let target = if scenario_arg == "all" { "all scenarios".to_string() } else { format!("scenario '{}'", scenario_arg) };
    if iterations > 1 {
        logln!(&mut logger, LogEvent::Validation, "Running {} {} times...\n", target, iterations);
    } else {
        logln!(&mut logger, LogEvent::Validation, "Running {}...\n", target);
    }

    let mut failures = 0;
    'scenarios: for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

        let scenario_log = PathBuf::from("log").join(sanitize_filename(scenario.short_name)).join("scenario.log");
        let scenario_receiver_id = logger.add_receiver(FileReceiver::new(&scenario_log, vec![LogEvent::Scenario])?);

        for i in start_iteration..(start_iteration + iterations) {
            if iterations > 1 {
                log!(&mut logger, LogEvent::Validation, "[{}/{}] ", i - start_iteration + 1, iterations);
            }

            // Every iteration explores different randomness
            RAND_SEED.store(i, Ordering::Relaxed);

            match (scenario.run)(scenario.short_name, &mut logger) {
                Ok(()) => {
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✓");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                    }
                }
                Err(e) => {
                    failures += 1;
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✗");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                    }

                    if fastbreak {
                        logger.remove_receiver(scenario_receiver_id);
                        logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                        logln!(&mut logger, LogEvent::Validation, "Error at iteration {} (seed {}): {}", i - start_iteration + 1, i, e);
                        break 'scenarios;
                    }
                }
            }

            // Keep summary.log current between iterations
            let _ = logger.flush();
        }

        logger.remove_receiver(scenario_receiver_id);
    }

    logln!(&mut logger, LogEvent::Validation, "\nTotal matching passes completed: {}", TOTAL_SIMULATION_RUNS.load(Ordering::Relaxed));
    logger.remove_receiver(summary_receiver_id);

    if failures > 0 {
        return Err(format!("{} scenario run(s) failed", failures).into());
    }
    Ok(())
}

fn parse_iteration_arg(args: &[String], index: usize, default: u64, what: &str) -> Result<u64, ConfigError> {
    match args.get(index) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidArgument(format!("Invalid {} parameter '{}'. Expected a number.", what, value))),
        None => Ok(default),
    }
}

fn run(args: &[String], fastbreak: bool) -> Result<(), Box<dyn Error>> {
    if args.len() > 1 && args[1] == "evaluate" {
        run_evaluate(&parse_evaluate_args(&args[2..])?)
    } else if args.len() > 1 {
        let iterations = parse_iteration_arg(args, 2, 1, "iterations")?;
        let start_iteration = parse_iteration_arg(args, 3, 0, "start iteration")?;
        run_scenarios(&args[1], iterations, start_iteration, fastbreak)
    } else {
        // Default: the two equal bidders walkthrough, with every validation on the console
        let mut logger = Logger::new();
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Scenario, LogEvent::Policy]));
        scenarios::two_equal_bidders::run("two_equal_bidders", &mut logger)
    }
}

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();

    // Parse and filter out --verbose and --fastbreak arguments
    let mut args = Vec::new();
    let mut skip_next = false;
    let mut fastbreak = false;
    for (i, arg) in raw_args.iter().enumerate() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--verbose" {
            if i + 1 < raw_args.len() && raw_args[i + 1] == "assignments" {
                VERBOSE_ASSIGNMENTS.store(true, Ordering::Relaxed);
                skip_next = true;
            }
            continue;
        }
        if arg == "--fastbreak" {
            fastbreak = true;
            continue;
        }
        args.push(arg.clone());
    }

    if let Err(e) = run(&args, fastbreak) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_evaluate_defaults() {
        let parsed = parse_evaluate_args(&args(&["msvv", "bidders.csv", "queries.txt"])).unwrap();
        assert_eq!(parsed, EvaluateArgs {
            policies: vec![PolicyType::MSVV],
            bidders_path: PathBuf::from("bidders.csv"),
            queries_path: PathBuf::from("queries.txt"),
            trials: DEFAULT_TRIALS,
            seed: 0,
            optimal: OptimalSource::BUDGET_SUM,
            sequential: false,
            charts: false,
        });
    }

    #[test]
    fn test_evaluate_options() {
        let parsed = parse_evaluate_args(&args(&[
            "all", "b.csv", "q.txt", "--trials", "7", "--seed", "42", "--optimal", "upper-bound", "--sequential", "--charts",
        ]))
        .unwrap();
        assert_eq!(parsed.policies, PolicyType::ALL.to_vec());
        assert_eq!(parsed.trials, 7);
        assert_eq!(parsed.seed, 42);
        assert_eq!(parsed.optimal, OptimalSource::UPPER_BOUND);
        assert!(parsed.sequential);
        assert!(parsed.charts);
    }

    #[test]
    fn test_evaluate_rejects_bad_input() {
        assert_eq!(
            parse_evaluate_args(&args(&["best", "b.csv", "q.txt"])),
            Err(ConfigError::UnknownPolicy("best".to_string()))
        );
        assert!(parse_evaluate_args(&args(&["greedy", "b.csv"])).is_err());
        assert!(parse_evaluate_args(&args(&["greedy", "b.csv", "q.txt", "--trials", "many"])).is_err());
        assert!(parse_evaluate_args(&args(&["greedy", "b.csv", "q.txt", "--trials"])).is_err());
        assert!(parse_evaluate_args(&args(&["greedy", "b.csv", "q.txt", "--bogus"])).is_err());
    }

    #[test]
    fn test_iteration_args() {
        let list = args(&["adwords", "all", "5"]);
        assert_eq!(parse_iteration_arg(&list, 2, 1, "iterations"), Ok(5));
        assert_eq!(parse_iteration_arg(&list, 3, 0, "start iteration"), Ok(0));
        assert!(parse_iteration_arg(&args(&["adwords", "all", "x"]), 2, 1, "iterations").is_err());
    }
}
