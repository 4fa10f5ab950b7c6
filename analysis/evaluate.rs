//! Train/test splitting, feature standardization and the error measures reported
//! for a fitted model.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EvaluationError {
    #[error("At least {required} rows are needed for a train/test split, found {found}.")]
    TooFewRows { found: usize, required: usize },
    #[error("The test fraction must lie strictly between 0 and 1, got {0}.")]
    InvalidTestFraction(f64),
    #[error("Predictions ({predictions}) and labels ({labels}) differ in length.")]
    LengthMismatch { predictions: usize, labels: usize },
}

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    /// Copies the selected rows of `features` and `labels` for one partition.
    pub fn take(
        indices: &[usize],
        features: ArrayView2<f64>,
        labels: ArrayView1<f64>,
    ) -> (Array2<f64>, Array1<f64>) {
        (
            features.select(Axis(0), indices),
            labels.select(Axis(0), indices),
        )
    }
}

/// Shuffles `0..n` with a seeded generator and cuts off `round(n * test_fraction)`
/// rows for testing. Both partitions are always non-empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split, EvaluationError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(EvaluationError::InvalidTestFraction(test_fraction));
    }
    if n < 2 {
        return Err(EvaluationError::TooFewRows {
            found: n,
            required: 2,
        });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let num_test = ((n as f64) * test_fraction).round() as usize;
    let num_test = num_test.clamp(1, n - 1);
    let train = indices.split_off(num_test);

    log::info!("Split {} rows into {} train / {} test", n, train.len(), indices.len());
    Ok(Split {
        train,
        test: indices,
    })
}

/// Column-wise centring and scaling fitted on the training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub means: Array1<f64>,
    /// Population standard deviations; zero-variance columns store 1.
    pub scales: Array1<f64>,
}

impl Standardizer {
    pub fn fit(features: ArrayView2<f64>) -> Self {
        let n = features.nrows();
        if n == 0 {
            let p = features.ncols();
            return Self {
                means: Array1::zeros(p),
                scales: Array1::ones(p),
            };
        }
        let means = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features.ncols()));
        let scales = features
            .axis_iter(Axis(1))
            .zip(means.iter())
            .map(|(column, &mean)| {
                let variance = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
                let std = variance.sqrt();
                if std > f64::EPSILON * mean.abs().max(1.0) {
                    std
                } else {
                    1.0
                }
            })
            .collect::<Array1<f64>>();
        Self { means, scales }
    }

    pub fn transform(&self, features: ArrayView2<f64>) -> Array2<f64> {
        let mut out = features.to_owned();
        for (mut column, (&mean, &scale)) in out
            .axis_iter_mut(Axis(1))
            .zip(self.means.iter().zip(self.scales.iter()))
        {
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        out
    }
}

fn check_lengths(predictions: ArrayView1<f64>, labels: ArrayView1<f64>) -> Result<(), EvaluationError> {
    if predictions.len() != labels.len() {
        return Err(EvaluationError::LengthMismatch {
            predictions: predictions.len(),
            labels: labels.len(),
        });
    }
    Ok(())
}

/// Fraction of predictions that disagree with their label. Labels are whole
/// numbers, so a prediction agrees when it lies within 0.5 of the label.
pub fn zero_one_loss(
    predictions: ArrayView1<f64>,
    labels: ArrayView1<f64>,
) -> Result<f64, EvaluationError> {
    check_lengths(predictions, labels)?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let hits = predictions
        .iter()
        .zip(labels.iter())
        .filter(|&(p, y)| (p - y).abs() < 0.5)
        .count();
    Ok((labels.len() - hits) as f64 / labels.len() as f64)
}

pub fn mean_squared_error(
    predictions: ArrayView1<f64>,
    labels: ArrayView1<f64>,
) -> Result<f64, EvaluationError> {
    check_lengths(predictions, labels)?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let residuals = &predictions - &labels;
    Ok(residuals.dot(&residuals) / labels.len() as f64)
}
