use std::collections::{BTreeMap, HashMap};

use crate::advertisers::{Advertiser, AdvertiserId};
use crate::errors::DataError;

/// One input record: an advertiser's bid on a keyword, optionally carrying the advertiser budget
#[derive(Debug, Clone, PartialEq)]
pub struct BidRow {
    /// Source line for error reporting (1-based, header included)
    pub line: usize,
    pub advertiser_id: AdvertiserId,
    pub keyword: String,
    pub bid_value: f64,
    pub budget: Option<f64>,
}

/// A bid resolved against the advertiser list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bid {
    /// Position of the advertiser in `BidTable::advertisers` and in every `BudgetLedger`
    pub advertiser_index: usize,
    pub advertiser_id: AdvertiserId,
    pub value: f64,
}

/// Static bids and budgets, validated once and shared read-only by all trials
///
/// Advertisers are ordered by id, and so are the bids of each keyword, which makes
/// "first in iteration order" the same as "lowest advertiser id".
#[derive(Debug, Clone)]
pub struct BidTable {
    pub advertisers: Vec<Advertiser>,
    bids_by_keyword: HashMap<String, Vec<Bid>>,
}

impl BidTable {
    /// Validate rows and build the table
    ///
    /// Rejects non-positive or non-finite bids, negative or non-finite budgets, an advertiser
    /// bidding twice on the same keyword, rows of one advertiser disagreeing on the budget and
    /// advertisers that never declare a budget. Nothing is repaired silently.
    pub fn new(rows: Vec<BidRow>) -> Result<Self, DataError> {
        let mut budgets: BTreeMap<AdvertiserId, Option<f64>> = BTreeMap::new();
        let mut seen: HashMap<(AdvertiserId, &str), usize> = HashMap::new();

        for row in &rows {
            if !(row.bid_value.is_finite() && row.bid_value > 0.0) {
                return Err(DataError::InvalidBid {
                    line: row.line,
                    advertiser_id: row.advertiser_id,
                    keyword: row.keyword.clone(),
                    value: row.bid_value,
                });
            }
            if seen.insert((row.advertiser_id, row.keyword.as_str()), row.line).is_some() {
                return Err(DataError::DuplicateBid {
                    line: row.line,
                    advertiser_id: row.advertiser_id,
                    keyword: row.keyword.clone(),
                });
            }

            let known = budgets.entry(row.advertiser_id).or_insert(None);
            if let Some(budget) = row.budget {
                if !(budget.is_finite() && budget >= 0.0) {
                    return Err(DataError::InvalidBudget {
                        line: row.line,
                        advertiser_id: row.advertiser_id,
                        budget,
                    });
                }
                match *known {
                    Some(previous) if previous != budget => {
                        return Err(DataError::ConflictingBudget {
                            line: row.line,
                            advertiser_id: row.advertiser_id,
                            budget,
                            previous,
                        });
                    }
                    _ => *known = Some(budget),
                }
            }
        }

        let mut advertisers = Vec::with_capacity(budgets.len());
        let mut index_of: HashMap<AdvertiserId, usize> = HashMap::with_capacity(budgets.len());
        for (advertiser_id, budget) in budgets {
            let budget = budget.ok_or(DataError::MissingBudget { advertiser_id })?;
            index_of.insert(advertiser_id, advertisers.len());
            advertisers.push(Advertiser { advertiser_id, budget });
        }

        let mut bids_by_keyword: HashMap<String, Vec<Bid>> = HashMap::new();
        for row in rows {
            let advertiser_index = index_of[&row.advertiser_id];
            bids_by_keyword.entry(row.keyword).or_default().push(Bid {
                advertiser_index,
                advertiser_id: row.advertiser_id,
                value: row.bid_value,
            });
        }
        for bids in bids_by_keyword.values_mut() {
            bids.sort_by_key(|bid| bid.advertiser_id);
        }

        Ok(Self { advertisers, bids_by_keyword })
    }

    /// All bids on a keyword, ordered by advertiser id; empty for unknown keywords
    pub fn bids_for(&self, keyword: &str) -> &[Bid] {
        self.bids_by_keyword.get(keyword).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keywords with at least one bid, sorted
    pub fn keywords(&self) -> Vec<&str> {
        let mut keywords: Vec<&str> = self.bids_by_keyword.keys().map(String::as_str).collect();
        keywords.sort_unstable();
        keywords
    }

    pub fn total_budget(&self) -> f64 {
        self.advertisers.iter().map(|advertiser| advertiser.budget).sum()
    }

    pub fn bid_count(&self) -> usize {
        self.bids_by_keyword.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn row(line: usize, advertiser_id: AdvertiserId, keyword: &str, bid_value: f64, budget: Option<f64>) -> BidRow {
        BidRow {
            line,
            advertiser_id,
            keyword: keyword.to_string(),
            bid_value,
            budget,
        }
    }

    #[test]
    fn test_budget_taken_from_any_row() {
        let table = BidTable::new(vec![
            row(2, 7, "shoes", 1.5, None),
            row(3, 7, "hats", 0.5, Some(40.0)),
            row(4, 3, "shoes", 2.0, Some(10.0)),
        ])
        .unwrap();

        assert_eq!(
            table.advertisers,
            vec![
                Advertiser { advertiser_id: 3, budget: 10.0 },
                Advertiser { advertiser_id: 7, budget: 40.0 },
            ]
        );
        assert_eq!(table.total_budget(), 50.0);
        assert_eq!(table.bid_count(), 3);
        assert_eq!(table.keywords(), vec!["hats", "shoes"]);
    }

    #[test]
    fn test_bids_ordered_by_advertiser_id() {
        let table = BidTable::new(vec![
            row(2, 9, "x", 1.0, Some(5.0)),
            row(3, 2, "x", 1.0, Some(5.0)),
            row(4, 5, "x", 1.0, Some(5.0)),
        ])
        .unwrap();

        let ids: Vec<AdvertiserId> = table.bids_for("x").iter().map(|bid| bid.advertiser_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        let indexes: Vec<usize> = table.bids_for("x").iter().map(|bid| bid.advertiser_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_keyword_has_no_bids() {
        let table = BidTable::new(vec![row(2, 1, "x", 1.0, Some(5.0))]).unwrap();
        assert!(table.bids_for("y").is_empty());
    }

    #[test]
    fn test_rejects_non_positive_bid() {
        let result = BidTable::new(vec![row(2, 1, "x", 0.0, Some(5.0))]);
        assert!(matches!(result, Err(DataError::InvalidBid { line: 2, .. })));
        let result = BidTable::new(vec![row(2, 1, "x", -1.0, Some(5.0))]);
        assert!(matches!(result, Err(DataError::InvalidBid { .. })));
        let result = BidTable::new(vec![row(2, 1, "x", f64::NAN, Some(5.0))]);
        assert!(matches!(result, Err(DataError::InvalidBid { .. })));
    }

    #[test]
    fn test_rejects_negative_budget() {
        let result = BidTable::new(vec![row(2, 1, "x", 1.0, Some(-5.0))]);
        assert!(matches!(result, Err(DataError::InvalidBudget { advertiser_id: 1, .. })));
    }

    #[test]
    fn test_rejects_duplicate_pair() {
        let result = BidTable::new(vec![
            row(2, 1, "x", 1.0, Some(5.0)),
            row(3, 1, "x", 2.0, None),
        ]);
        assert!(matches!(result, Err(DataError::DuplicateBid { line: 3, advertiser_id: 1, .. })));
    }

    #[test]
    fn test_rejects_conflicting_budget() {
        let result = BidTable::new(vec![
            row(2, 1, "x", 1.0, Some(5.0)),
            row(3, 1, "y", 1.0, Some(6.0)),
        ]);
        assert!(matches!(result, Err(DataError::ConflictingBudget { line: 3, .. })));
    }

    #[test]
    fn test_rejects_missing_budget() {
        let result = BidTable::new(vec![
            row(2, 1, "x", 1.0, Some(5.0)),
            row(3, 2, "x", 1.0, None),
        ]);
        assert!(matches!(result, Err(DataError::MissingBudget { advertiser_id: 2 })));
    }
}
