use std::path::PathBuf;
use thiserror::Error;

use crate::advertisers::AdvertiserId;

/// Input data rejected before any simulation starts
#[derive(Error, Debug)]
pub enum DataError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("line {line}: bid {value} of advertiser {advertiser_id} on '{keyword}' must be positive and finite")]
    InvalidBid { line: usize, advertiser_id: AdvertiserId, keyword: String, value: f64 },

    #[error("line {line}: budget {budget} of advertiser {advertiser_id} must be non-negative and finite")]
    InvalidBudget { line: usize, advertiser_id: AdvertiserId, budget: f64 },

    #[error("line {line}: advertiser {advertiser_id} already bids on '{keyword}'")]
    DuplicateBid { line: usize, advertiser_id: AdvertiserId, keyword: String },

    #[error("line {line}: advertiser {advertiser_id} budget {budget} conflicts with earlier budget {previous}")]
    ConflictingBudget { line: usize, advertiser_id: AdvertiserId, budget: f64, previous: f64 },

    #[error("advertiser {advertiser_id} has no budget on any row")]
    MissingBudget { advertiser_id: AdvertiserId },
}

/// Invalid evaluation or driver configuration
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("number of trials must be at least 1")]
    ZeroTrials,

    #[error("unknown policy '{0}' (expected greedy, balance or msvv)")]
    UnknownPolicy(String),

    #[error("optimal revenue must be positive and finite to compute a competitive ratio, got {0}")]
    InvalidOptimalRevenue(f64),

    #[error("{0}")]
    InvalidArgument(String),
}
