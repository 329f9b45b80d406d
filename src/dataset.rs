/// Readers for the on-disk inputs.
///
/// Bidder dataset: CSV with header `Advertiser,Keyword,Bid Value,Budget`, one row per bid.
/// The budget column may be left empty on every row but one for each advertiser.
/// Queries: one keyword per line, blank lines ignored.

use std::fs;
use std::path::Path;

use crate::advertisers::AdvertiserId;
use crate::bid_table::BidRow;
use crate::errors::DataError;

const HEADER: [&str; 4] = ["Advertiser", "Keyword", "Bid Value", "Budget"];
const EXPECTED_COLUMNS: usize = HEADER.len();

fn read_to_string(path: &Path) -> Result<String, DataError> {
    fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_number<T: std::str::FromStr>(field: &str, column: &str, line: usize) -> Result<T, DataError> {
    field.parse::<T>().map_err(|_| DataError::MalformedRow {
        line,
        reason: format!("cannot parse {} '{}'", column, field),
    })
}

/// Parse the bidder dataset
/// Rows are only parsed here; semantic checks happen in `BidTable::new`
pub fn parse_bidder_dataset(text: &str) -> Result<Vec<BidRow>, DataError> {
    let mut rows = Vec::new();
    let mut lines = text.lines().enumerate().map(|(index, line)| (index + 1, line));

    // Header
    match lines.next() {
        Some((_, header)) if header.split(',').map(str::trim).eq(HEADER) => {}
        Some((line, header)) => {
            return Err(DataError::MalformedRow {
                line,
                reason: format!("expected header '{}', got '{}'", HEADER.join(","), header.trim()),
            });
        }
        None => return Ok(rows),
    }

    for (line, raw) in lines {
        if raw.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        if fields.len() != EXPECTED_COLUMNS {
            return Err(DataError::MalformedRow {
                line,
                reason: format!("expected {} fields, got {}", EXPECTED_COLUMNS, fields.len()),
            });
        }
        if fields[1].is_empty() {
            return Err(DataError::MalformedRow {
                line,
                reason: "missing keyword".to_string(),
            });
        }

        let advertiser_id: AdvertiserId = parse_number(fields[0], "advertiser id", line)?;
        let bid_value: f64 = parse_number(fields[2], "bid value", line)?;
        let budget = if fields[3].is_empty() {
            None
        } else {
            Some(parse_number::<f64>(fields[3], "budget", line)?)
        };

        rows.push(BidRow {
            line,
            advertiser_id,
            keyword: fields[1].to_string(),
            bid_value,
            budget,
        });
    }
    Ok(rows)
}

pub fn read_bidder_dataset(path: &Path) -> Result<Vec<BidRow>, DataError> {
    parse_bidder_dataset(&read_to_string(path)?)
}

/// Parse the query list, in arrival order
pub fn parse_queries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_queries(path: &Path) -> Result<Vec<String>, DataError> {
    Ok(parse_queries(&read_to_string(path)?))
}
