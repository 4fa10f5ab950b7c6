//! The linear clean -> featurize -> fit/evaluate driver.

use crate::config::{AnalysisConfig, ConfigError};
use crate::data::{CleanRecord, CleaningSummary, DataError, cleaned_data};
use crate::estimate::{EstimationError, train_model};
use crate::evaluate::{
    EvaluationError, Split, mean_squared_error, train_test_split, zero_one_loss,
};
use crate::features::{FeatureError, TestSelection, features_and_labels, select_tests, test_counts};
use crate::model::{LabelKind, ModelError, ModelKind};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Error measures on one partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionScore {
    pub rows: usize,
    /// 0-1 loss.
    pub error: f64,
    pub mean_squared_error: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub cleaning: Option<CleaningSummary>,
    pub selection: TestSelection,
    pub patients: usize,
    pub feature_names: Vec<String>,
    pub model: ModelKind,
    pub label_kind: LabelKind,
    pub train: PartitionScore,
    pub test: PartitionScore,
}

/// Validates the settings, loads and cleans `path`, then analyzes the cleaned records.
pub fn run_pipeline(path: &Path, config: &AnalysisConfig) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    let cleaned = cleaned_data(path)?;
    let mut report = analyze(&cleaned.records, config)?;
    report.cleaning = Some(cleaned.summary);
    Ok(report)
}

/// Selects the tests, builds the features, fits on the training split and scores
/// both splits.
pub fn analyze(
    records: &[CleanRecord],
    config: &AnalysisConfig,
) -> Result<PipelineReport, PipelineError> {
    let counts = test_counts(records);
    let selection = select_tests(&counts, config.rareness)?;
    let feature_set = features_and_labels(records, &selection)?;

    let split = train_test_split(feature_set.labels.len(), config.test_fraction, config.seed)?;
    let (train_x, train_y) = Split::take(
        &split.train,
        feature_set.features.view(),
        feature_set.labels.view(),
    );
    let (test_x, test_y) = Split::take(
        &split.test,
        feature_set.features.view(),
        feature_set.labels.view(),
    );

    let model = train_model(train_x.view(), train_y.view(), config)?;

    let score = |x: &ndarray::Array2<f64>, y: &ndarray::Array1<f64>| -> Result<PartitionScore, PipelineError> {
        let predictions = model.predict(x.view())?;
        Ok(PartitionScore {
            rows: y.len(),
            error: zero_one_loss(predictions.view(), y.view())?,
            mean_squared_error: mean_squared_error(predictions.view(), y.view())?,
        })
    };
    let train = score(&train_x, &train_y)?;
    let test = score(&test_x, &test_y)?;

    log::info!(
        "{}: training error {:.4}, test error {:.4}",
        model.kind,
        train.error,
        test.error
    );

    Ok(PipelineReport {
        cleaning: None,
        selection,
        patients: feature_set.patient_ids.len(),
        feature_names: feature_set.feature_names,
        model: model.kind,
        label_kind: model.label_kind,
        train,
        test,
    })
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = &self.cleaning {
            writeln!(f, "Cleaned rows: {} of {}", c.kept_rows, c.input_rows)?;
        }
        let tracked = self
            .selection
            .tracked_tests
            .iter()
            .map(|(id, count)| format!("'{id}': {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "Tracked tests: {{{tracked}}}")?;
        writeln!(
            f,
            "Rare test: '{}' ({} records)",
            self.selection.rare_test.0, self.selection.rare_test.1
        )?;
        writeln!(
            f,
            "Patients: {} (features: {})",
            self.patients,
            self.feature_names.join(", ")
        )?;
        writeln!(f, "Model: {} ({})", self.model, self.label_kind)?;
        writeln!(
            f,
            "Training error: {:.4} ({} rows, MSE {:.4})",
            self.train.error, self.train.rows, self.train.mean_squared_error
        )?;
        write!(
            f,
            "Test error: {:.4} ({} rows, MSE {:.4})",
            self.test.error, self.test.rows, self.test.mean_squared_error
        )
    }
}
