//! Test selection and per-patient feature construction.
//!
//! A test taken by roughly `rareness` patients is chosen as the prediction target.
//! Every test taken at least as often becomes a feature, so each patient who took
//! the rare test is described by `[age, result-of-test-1, ..., result-of-test-k]`
//! with zeros for the tests they never took.

use crate::data::{CleanRecord, ranked_counts};
use ahash::AHashMap;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default minimum number of records a test needs to be considered at all.
pub const DEFAULT_RARENESS: usize = 1000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeatureError {
    #[error(
        "No test was taken at least {rareness} times (the most common test has {most_common} records). Lower the rareness threshold."
    )]
    NoEligibleTest { rareness: usize, most_common: usize },
    #[error("No patient in the cleaned data took the rare test '{0}'.")]
    NoRareTestPatients(String),
}

/// The target test and the tests used to predict it, each with its record count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSelection {
    pub rare_test: (String, usize),
    /// Tracked tests in descending count order. Their position is their column
    /// in the feature matrix (offset by one for the age column).
    pub tracked_tests: Vec<(String, usize)>,
}

/// One feature row and one label per patient who took the rare test.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Row identifiers, in ascending order.
    pub patient_ids: Vec<String>,
    /// `["age", <tracked test ids>...]`.
    pub feature_names: Vec<String>,
    /// Shape: [n_patients, 1 + n_tracked_tests].
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
}

/// Records per test id, most common first.
pub fn test_counts(records: &[CleanRecord]) -> Vec<(String, usize)> {
    ranked_counts(records.iter().map(|r| r.test_id.as_str()))
}

/// Picks the least common test among those taken at least `rareness` times as the
/// rare test, and every other such test as a tracked test.
pub fn select_tests(
    counts: &[(String, usize)],
    rareness: usize,
) -> Result<TestSelection, FeatureError> {
    let mut eligible: Vec<(String, usize)> = counts
        .iter()
        .filter(|(_, count)| *count >= rareness)
        .cloned()
        .collect();
    eligible.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let Some(rare_test) = eligible.pop() else {
        return Err(FeatureError::NoEligibleTest {
            rareness,
            most_common: counts.iter().map(|(_, c)| *c).max().unwrap_or(0),
        });
    };

    log::info!(
        "Rare test '{}' ({} records), {} tracked tests",
        rare_test.0,
        rare_test.1,
        eligible.len()
    );
    Ok(TestSelection {
        rare_test,
        tracked_tests: eligible,
    })
}

/// Latest record of one test for one patient: the one with the greatest age, later
/// rows winning ties.
#[derive(Clone, Copy)]
struct Latest {
    age: f64,
    result: f64,
}

impl Latest {
    fn offer(slot: &mut Option<Latest>, age: f64, result: f64) {
        match slot {
            Some(current) if current.age > age => {}
            _ => *slot = Some(Latest { age, result }),
        }
    }
}

/// Builds the feature matrix and label vector for every patient who took the rare
/// test. Rows follow ascending patient id.
pub fn features_and_labels(
    records: &[CleanRecord],
    selection: &TestSelection,
) -> Result<FeatureSet, FeatureError> {
    let rare_id = selection.rare_test.0.as_str();
    let column_of: AHashMap<&str, usize> = selection
        .tracked_tests
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();
    let num_tracked = selection.tracked_tests.len();

    // patient -> (rare test record, latest record of each tracked test)
    let mut patients: BTreeMap<&str, (Option<Latest>, Vec<Option<Latest>>)> = BTreeMap::new();
    for record in records {
        let is_rare = record.test_id == rare_id;
        let column = column_of.get(record.test_id.as_str()).copied();
        if !is_rare && column.is_none() {
            continue;
        }

        let entry = patients
            .entry(record.patient_id.as_str())
            .or_insert_with(|| (None, vec![None; num_tracked]));
        if is_rare {
            Latest::offer(&mut entry.0, record.age, record.result);
        }
        if let Some(col) = column {
            Latest::offer(&mut entry.1[col], record.age, record.result);
        }
    }

    let rows: Vec<(&str, Latest, Vec<Option<Latest>>)> = patients
        .into_iter()
        .filter_map(|(patient, (rare, tracked))| rare.map(|r| (patient, r, tracked)))
        .collect();

    if rows.is_empty() {
        return Err(FeatureError::NoRareTestPatients(rare_id.to_string()));
    }

    let width = 1 + num_tracked;
    let mut features = Array2::zeros((rows.len(), width));
    let mut labels = Array1::zeros(rows.len());
    let mut patient_ids = Vec::with_capacity(rows.len());

    for (i, (patient, rare, tracked)) in rows.into_iter().enumerate() {
        features[[i, 0]] = rare.age;
        for (j, latest) in tracked.iter().enumerate() {
            if let Some(latest) = latest {
                features[[i, j + 1]] = latest.result;
            }
        }
        labels[i] = rare.result;
        patient_ids.push(patient.to_string());
    }

    let mut feature_names = Vec::with_capacity(width);
    feature_names.push("age".to_string());
    feature_names.extend(selection.tracked_tests.iter().map(|(id, _)| id.clone()));

    log::info!(
        "Built {} feature vectors of length {}",
        patient_ids.len(),
        width
    );
    Ok(FeatureSet {
        patient_ids,
        feature_names,
        features,
        labels,
    })
}
