use rand_distr::LogNormal;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Number of random permutations evaluated per policy when nothing else is requested
pub const DEFAULT_TRIALS: usize = 100;

/// Global seed offset. Scenario iterations set this so every iteration explores different randomness
pub static RAND_SEED: AtomicU64 = AtomicU64::new(0);

/// When set, every query assignment is written to the Assignment log event
pub static VERBOSE_ASSIGNMENTS: AtomicBool = AtomicBool::new(false);

/// Count of single matching passes executed in this process
pub static TOTAL_SIMULATION_RUNS: AtomicUsize = AtomicUsize::new(0);

/// Combine a fixed per-purpose base with the global seed offset
pub fn get_seed(base: u64) -> u64 {
    base.wrapping_add(RAND_SEED.load(Ordering::Relaxed))
}

/// Convert mean and standard deviation to log-normal distribution parameters
/// Returns (μ, σ) for LogNormal(μ, σ) that approximates the given mean and stddev
///
/// For LogNormal(μ, σ):
/// - E[X] = exp(μ + σ²/2)
/// - Var[X] = (exp(σ²) - 1) * exp(2μ + σ²)
///
/// To convert from mean (m) and stddev (s):
/// - σ = sqrt(ln(1 + s²/m²))
/// - μ = ln(m) - σ²/2
fn lognormal_from_mean_stddev(mean: f64, stddev: f64) -> (f64, f64) {
    let variance = stddev * stddev;
    let sigma_squared = (1.0 + variance / (mean * mean)).ln();
    let sigma = sigma_squared.sqrt();
    let mu = mean.ln() - sigma_squared / 2.0;
    (mu, sigma)
}

/// Create a log-normal distribution from mean and standard deviation
/// Mean must be positive; a zero stddev degenerates to the constant mean
pub fn lognormal_dist(mean: f64, stddev: f64) -> Result<LogNormal<f64>, rand_distr::NormalError> {
    let (mu, sigma) = lognormal_from_mean_stddev(mean, stddev);
    LogNormal::new(mu, sigma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lognormal_parameters_recover_mean() {
        let (mu, sigma) = lognormal_from_mean_stddev(10.0, 3.0);
        let mean = (mu + sigma * sigma / 2.0).exp();
        assert!((mean - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_lognormal_accepts_degenerate_stddev() {
        assert!(lognormal_dist(5.0, 1.0).is_ok());
        assert!(lognormal_dist(5.0, 0.0).is_ok());
    }
}
