use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::errors::ConfigError;
use crate::logger::{Logger, LogEvent, FileReceiver, sanitize_filename};
use crate::logln;
use crate::policies::AllocationPolicyTrait;
use crate::simulationrun::{MatchingEngine, RunResult, RunStat};
use crate::utils::VERBOSE_ASSIGNMENTS;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

/// Settings of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    /// Number of random permutations to run
    pub trials: usize,
    /// Base seed, trial `i` shuffles with `seed + i`
    pub seed: u64,
    /// Offline optimum to divide by; None skips the competitive ratio
    pub optimal_revenue: Option<f64>,
    /// Run trials on the calling thread even when the parallel feature is enabled
    pub force_sequential: bool,
    /// Keep every trial's permutation and assignments for auditing
    pub keep_traces: bool,
}

impl EvaluationConfig {
    pub fn new(trials: usize, seed: u64, optimal_revenue: Option<f64>) -> Self {
        Self {
            trials,
            seed,
            optimal_revenue,
            force_sequential: false,
            keep_traces: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        if let Some(optimal_revenue) = self.optimal_revenue {
            if !(optimal_revenue.is_finite() && optimal_revenue > 0.0) {
                return Err(ConfigError::InvalidOptimalRevenue(optimal_revenue));
            }
        }
        Ok(())
    }
}

/// Seed of the permutation used by one trial
pub fn trial_seed(seed: u64, trial: usize) -> u64 {
    seed.wrapping_add(trial as u64)
}

/// Uniformly random permutation of the query sequence, a pure function of (queries, seed)
pub fn permute_queries<Q: AsRef<str>>(queries: &[Q], seed: u64) -> Vec<&str> {
    let mut permutation: Vec<&str> = queries.iter().map(|query| query.as_ref()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);
    permutation
}

/// Permutation and full result of a trial, kept only on request
#[derive(Debug, Clone, PartialEq)]
pub struct TrialTrace {
    pub queries: Vec<String>,
    pub run_result: RunResult,
}

/// Outcome of a single trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub trial: usize,
    pub seed: u64,
    pub revenue: f64,
    pub matched_count: usize,
    pub trace: Option<TrialTrace>,
}

/// Aggregated result of all trials of one policy
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub policy_name: &'static str,
    pub trials: Vec<TrialOutcome>,
    pub average_revenue: f64,
    pub min_revenue: f64,
    pub max_revenue: f64,
    pub optimal_revenue: Option<f64>,
    pub competitive_ratio: Option<f64>,
}

impl Evaluation {
    pub fn revenues(&self) -> Vec<f64> {
        self.trials.iter().map(|trial| trial.revenue).collect()
    }

    /// Output the policy-level summary
    pub fn printout(&self, logger: &mut Logger) {
        logln!(logger, LogEvent::Policy, "\n=== Evaluation: {} ===", self.policy_name);
        logln!(logger, LogEvent::Policy, "Trials: {}", self.trials.len());
        logln!(logger, LogEvent::Policy, "Revenue (avg/min/max): {:.2} / {:.2} / {:.2}",
                 self.average_revenue, self.min_revenue, self.max_revenue);
        match (self.optimal_revenue, self.competitive_ratio) {
            (Some(optimal_revenue), Some(competitive_ratio)) => {
                logln!(logger, LogEvent::Policy, "Competitive ratio: {:.4} (optimal revenue {:.2})", competitive_ratio, optimal_revenue);
            }
            _ => {
                logln!(logger, LogEvent::Policy, "Competitive ratio: n/a (no optimal revenue)");
            }
        }
    }
}

/// One policy run the way a scenario reports it: the queries in arrival order, then permuted
#[derive(Debug, Clone, PartialEq)]
pub struct VariantResult {
    pub base_run: RunResult,
    pub evaluation: Evaluation,
}

/// Map a function over trial indexes, in parallel when the parallel feature is enabled
/// Results come back in trial order either way
fn map_trials<F, R>(trials: usize, f: F, force_sequential: bool) -> Vec<R>
where
    F: Fn(usize) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        if force_sequential {
            (0..trials).map(f).collect()
        } else {
            (0..trials).into_par_iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = force_sequential;
        (0..trials).map(f).collect()
    }
}

/// Repeats matching passes over random permutations of the query sequence
pub struct EvaluationHarness<'a> {
    pub engine: MatchingEngine<'a>,
}

impl<'a> EvaluationHarness<'a> {
    pub fn new(engine: MatchingEngine<'a>) -> Self {
        Self { engine }
    }

    /// Evaluate a policy over `config.trials` random permutations
    ///
    /// # Arguments
    /// * `queries` - Base (unpermuted) query sequence
    /// * `policy` - Allocation policy under evaluation
    /// * `config` - Trials, seed and optimal revenue; rejected if invalid
    ///
    /// # Returns
    /// Per-trial outcomes, average revenue and the competitive ratio when an optimum is given
    pub fn evaluate<Q: AsRef<str> + Sync>(
        &self,
        queries: &[Q],
        policy: &dyn AllocationPolicyTrait,
        config: &EvaluationConfig,
    ) -> Result<Evaluation, ConfigError> {
        config.validate()?;

        let run_trial = |trial: usize| {
            let seed = trial_seed(config.seed, trial);
            let permutation = permute_queries(queries, seed);
            let run_result = self.engine.run(&permutation, policy);
            TrialOutcome {
                trial,
                seed,
                revenue: run_result.revenue,
                matched_count: run_result.matched_count(),
                trace: config.keep_traces.then(|| TrialTrace {
                    queries: permutation.iter().map(|query| query.to_string()).collect(),
                    run_result,
                }),
            }
        };
        let trials = map_trials(config.trials, run_trial, config.force_sequential);

        let total_revenue: f64 = trials.iter().map(|trial| trial.revenue).sum();
        let average_revenue = total_revenue / trials.len() as f64;
        let min_revenue = trials.iter().map(|trial| trial.revenue).fold(f64::INFINITY, f64::min);
        let max_revenue = trials.iter().map(|trial| trial.revenue).fold(f64::NEG_INFINITY, f64::max);
        let competitive_ratio = config.optimal_revenue.map(|optimal_revenue| average_revenue / optimal_revenue);

        Ok(Evaluation {
            policy_name: policy.policy_name(),
            trials,
            average_revenue,
            min_revenue,
            max_revenue,
            optimal_revenue: config.optimal_revenue,
            competitive_ratio,
        })
    }

    /// Run one policy with logging setup and cleanup
    ///
    /// # Arguments
    /// * `scenario_name` - Name of the scenario (for log file paths)
    /// * `queries` - Base query sequence
    /// * `policy` - Allocation policy under evaluation
    /// * `config` - Evaluation settings
    /// * `logger` - Logger for event-based logging
    ///
    /// # Returns
    /// The base order pass and the evaluation, after both have been logged
    pub fn run_variant<Q: AsRef<str> + Sync>(
        &self,
        scenario_name: &str,
        queries: &[Q],
        policy: &dyn AllocationPolicyTrait,
        config: &EvaluationConfig,
        logger: &mut Logger,
    ) -> Result<VariantResult, Box<dyn std::error::Error>> {
        let log_dir = PathBuf::from("log").join(sanitize_filename(scenario_name));
        self.run_variant_in(&log_dir, queries, policy, config, logger)
    }

    fn run_variant_in<Q: AsRef<str> + Sync>(
        &self,
        log_dir: &Path,
        queries: &[Q],
        policy: &dyn AllocationPolicyTrait,
        config: &EvaluationConfig,
        logger: &mut Logger,
    ) -> Result<VariantResult, Box<dyn std::error::Error>> {
        let policy_name = policy.policy_name();
        let trials_receiver_id = logger.add_receiver(FileReceiver::new(&log_dir.join(format!("trials-{}.log", policy_name)), vec![LogEvent::Trial])?);
        let policy_receiver_id = match FileReceiver::new(&log_dir.join(format!("policy-{}.log", policy_name)), vec![LogEvent::Policy]) {
            Ok(receiver) => logger.add_receiver(receiver),
            Err(e) => {
                logger.remove_receiver(trials_receiver_id);
                return Err(e.into());
            }
        };

        let result = self.log_variant(log_dir, queries, policy, config, logger);

        logger.remove_receiver(policy_receiver_id);
        logger.remove_receiver(trials_receiver_id);
        result
    }

    /// Body of `run_variant`, with the per-policy receivers already registered
    fn log_variant<Q: AsRef<str> + Sync>(
        &self,
        log_dir: &Path,
        queries: &[Q],
        policy: &dyn AllocationPolicyTrait,
        config: &EvaluationConfig,
        logger: &mut Logger,
    ) -> Result<VariantResult, Box<dyn std::error::Error>> {
        let policy_name = policy.policy_name();
        let verbose = VERBOSE_ASSIGNMENTS.load(Ordering::Relaxed);
        let mut config = config.clone();
        config.keep_traces |= verbose;

        // Base order first, as the queries arrived
        let base_run = self.engine.run(queries, policy);
        logln!(logger, LogEvent::Policy, "\n=== {} on base order ===", policy_name);
        let base_stat = RunStat::new(&base_run);
        base_stat.printout_overall(logger, LogEvent::Policy);
        base_stat.printout_advertisers(logger, LogEvent::Trial);

        let evaluation = self.evaluate(queries, policy, &config)?;

        for trial in &evaluation.trials {
            logln!(logger, LogEvent::Trial, "{} - trial {} (seed {}): revenue {:.2}, matched {}",
                     policy_name, trial.trial + 1, trial.seed, trial.revenue, trial.matched_count);
            if let Some(trace) = &trial.trace {
                if verbose {
                    let path = log_dir.join(format!("assignments-{}-trial{}.csv", policy_name, trial.trial + 1));
                    let receiver_id = logger.add_receiver(FileReceiver::new(&path, vec![LogEvent::Assignment])?);
                    trace.run_result.log_trace(&trace.queries, logger);
                    logger.remove_receiver(receiver_id);
                }
            }
        }
        evaluation.printout(logger);

        Ok(VariantResult { base_run, evaluation })
    }
}
