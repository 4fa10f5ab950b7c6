//! # Data Loading and Cleaning Module
//!
//! This module is the exclusive entry point for the medical test records. It reads
//! the headerless tab-separated export, one row per administered test, and turns it
//! into the clean records the feature construction works from.
//!
//! - Fixed Schema: Columns are positional and not configurable: test id, test date,
//!   birth date, test result, patient id.
//! - Lenient Rows: Input rows are assumed to be noisy. Rows with the wrong number of
//!   fields, unparseable dates, non-positive ages or results that are not plain digits
//!   are dropped and counted, never fatal.
//! - Strict Files: A missing or unreadable file is an error and is propagated.

use ahash::{AHashMap, AHashSet};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// Number of positional columns in every well-formed row.
const FIELDS_PER_ROW: usize = 5;

/// Ages are measured in 365-day years.
const SECONDS_PER_YEAR: f64 = 24.0 * 60.0 * 60.0 * 365.0;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Month-first slash dates are tried before day-first ones, so `%d/%m/%Y` only
/// applies when the first field cannot be a month.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%m/%d/%Y", "%d/%m/%Y", "%d.%m.%Y",
];

/// One row of the input file exactly as read. Empty fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub test_id: Option<String>,
    pub test_date: Option<String>,
    pub birth_date: Option<String>,
    pub test_result: Option<String>,
    pub patient_id: Option<String>,
}

/// The raw contents of an input file.
#[derive(Debug, Default)]
pub struct RawTable {
    pub records: Vec<RawRecord>,
    /// Rows skipped because they did not have exactly five fields.
    pub malformed_rows: usize,
}

/// A validated test record. `age > 0` and `result > 0` hold for every instance
/// produced by [`clean_records`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub test_id: String,
    pub patient_id: String,
    /// Age of the patient when the test was taken, in years.
    pub age: f64,
    pub result: f64,
}

/// How many rows each cleaning step removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningSummary {
    pub input_rows: usize,
    pub malformed_rows: usize,
    pub bad_dates: usize,
    pub non_positive_ages: usize,
    pub missing_fields: usize,
    pub non_digit_results: usize,
    pub zero_results: usize,
    pub kept_rows: usize,
}

/// Cleaned records together with the bookkeeping of what was dropped.
#[derive(Debug)]
pub struct CleanedData {
    pub records: Vec<CleanRecord>,
    pub summary: CleaningSummary,
}

/// Errors that abort loading. Row-level problems never end up here.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to read the tab-separated input: {0}")]
    CsvError(#[from] csv::Error),
}

/// Summary statistics over the test-result values that parse as numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 when fewer than two values are present.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// A first look at a raw table, before any cleaning.
#[derive(Debug, Clone)]
pub struct TableDescription {
    pub rows: usize,
    pub malformed_rows: usize,
    pub distinct_tests: usize,
    pub distinct_patients: usize,
    pub result_summary: Option<NumericSummary>,
    /// Records per test id, most common first.
    pub test_counts: Vec<(String, usize)>,
}

/// Reads the headerless, tab-separated test file.
pub fn load_raw_records(path: &Path) -> Result<RawTable, DataError> {
    log::info!("Loading test records from '{}'", path.display());

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut table = RawTable::default();
    for row in reader.records() {
        let row = row?;
        if row.len() != FIELDS_PER_ROW {
            log::debug!(
                "Skipping line {} with {} fields (expected {})",
                row.position().map_or(0, |p| p.line()),
                row.len(),
                FIELDS_PER_ROW
            );
            table.malformed_rows += 1;
            continue;
        }

        table.records.push(RawRecord {
            test_id: field(&row, 0),
            test_date: field(&row, 1),
            birth_date: field(&row, 2),
            test_result: field(&row, 3),
            patient_id: field(&row, 4),
        });
    }

    log::info!(
        "Read {} rows ({} malformed rows skipped)",
        table.records.len(),
        table.malformed_rows
    );
    Ok(table)
}

fn field(row: &StringRecord, index: usize) -> Option<String> {
    row.get(index)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Applies the cleaning steps in order: derive the age from the two dates, keep
/// positive ages, drop rows with missing fields, keep plain-digit results and drop
/// zero results. A row removed by one step is never seen by the later ones.
pub fn clean_records(table: RawTable) -> CleanedData {
    let mut summary = CleaningSummary {
        input_rows: table.records.len() + table.malformed_rows,
        malformed_rows: table.malformed_rows,
        ..CleaningSummary::default()
    };
    let mut records = Vec::with_capacity(table.records.len());

    for raw in table.records {
        let test_date = raw.test_date.as_deref().and_then(parse_date);
        let birth_date = raw.birth_date.as_deref().and_then(parse_date);
        let (Some(test_date), Some(birth_date)) = (test_date, birth_date) else {
            summary.bad_dates += 1;
            continue;
        };

        let age = age_in_years(test_date, birth_date);
        if age <= 0.0 {
            summary.non_positive_ages += 1;
            continue;
        }

        let (Some(test_id), Some(patient_id), Some(result_text)) =
            (raw.test_id, raw.patient_id, raw.test_result)
        else {
            summary.missing_fields += 1;
            continue;
        };

        // Results with an order relation ("3 >", "<5") are not usable labels.
        let Some(result) = parse_digit_result(&result_text) else {
            summary.non_digit_results += 1;
            continue;
        };
        if result == 0.0 {
            summary.zero_results += 1;
            continue;
        }

        records.push(CleanRecord {
            test_id,
            patient_id,
            age,
            result,
        });
    }

    summary.kept_rows = records.len();
    log::info!(
        "Cleaning kept {} of {} rows: {} malformed, {} bad dates, {} non-positive ages, {} missing fields, {} non-digit results, {} zero results",
        summary.kept_rows,
        summary.input_rows,
        summary.malformed_rows,
        summary.bad_dates,
        summary.non_positive_ages,
        summary.missing_fields,
        summary.non_digit_results,
        summary.zero_results
    );

    CleanedData { records, summary }
}

/// Loads the file at `path` and cleans it.
pub fn cleaned_data(path: &Path) -> Result<CleanedData, DataError> {
    let table = load_raw_records(path)?;
    Ok(clean_records(table))
}

/// Parses a date or date-time in one of the accepted formats. Anything else,
/// including impossible calendar dates, is `None`.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn age_in_years(test_date: NaiveDateTime, birth_date: NaiveDateTime) -> f64 {
    let elapsed = test_date - birth_date;
    elapsed.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_YEAR
}

fn parse_digit_result(text: &str) -> Option<f64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Counts occurrences of each value, most frequent first and ties broken by
/// ascending value so the ordering is reproducible.
pub fn ranked_counts<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: AHashMap<&'a str, usize> = AHashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .map(|(value, count)| (value.to_string(), count))
        .collect()
}

/// Summarises a raw table: sizes, the numeric spread of the result column and the
/// `top` most common tests.
pub fn describe(table: &RawTable, top: usize) -> TableDescription {
    let distinct_patients: AHashSet<&str> = table
        .records
        .iter()
        .filter_map(|r| r.patient_id.as_deref())
        .collect();

    let numeric: Vec<f64> = table
        .records
        .iter()
        .filter_map(|r| r.test_result.as_deref())
        .filter_map(|text| text.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect();

    let mut test_counts = ranked_counts(table.records.iter().filter_map(|r| r.test_id.as_deref()));
    let distinct_tests = test_counts.len();
    test_counts.truncate(top);

    TableDescription {
        rows: table.records.len(),
        malformed_rows: table.malformed_rows,
        distinct_tests,
        distinct_patients: distinct_patients.len(),
        result_summary: numeric_summary(&numeric),
        test_counts,
    }
}

fn numeric_summary(values: &[f64]) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (count - 1) as f64).sqrt()
    } else {
        0.0
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(NumericSummary {
        count,
        mean,
        std,
        min,
        max,
    })
}

impl fmt::Display for TableDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Rows: {} ({} malformed rows skipped)",
            self.rows, self.malformed_rows
        )?;
        writeln!(f, "Distinct tests: {}", self.distinct_tests)?;
        writeln!(f, "Distinct patients: {}", self.distinct_patients)?;
        match &self.result_summary {
            Some(s) => writeln!(
                f,
                "Test result (numeric values): count={} mean={:.4} std={:.4} min={} max={}",
                s.count, s.mean, s.std, s.min, s.max
            )?,
            None => writeln!(f, "Test result (numeric values): none")?,
        }
        writeln!(f, "Most common tests:")?;
        for (test_id, count) in &self.test_counts {
            writeln!(f, "  {test_id}\t{count}")?;
        }
        Ok(())
    }
}
