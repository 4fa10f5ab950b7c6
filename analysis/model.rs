use crate::config::ModelChoice;
use crate::estimate::EstimationError;
use crate::evaluate::Standardizer;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::fmt;
use thiserror::Error;

// --- Public Data Structures ---

/// Whether the labels look like class labels or like a measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelKind {
    /// Whole-valued labels with few distinct values. `classes` is sorted ascending.
    Discrete { classes: Vec<f64> },
    /// Anything else.
    Continuous,
}

impl LabelKind {
    /// Labels are discrete when every one of them is a whole number and there are
    /// at most `max_classes` distinct values.
    pub fn detect(labels: ArrayView1<f64>, max_classes: usize) -> Self {
        if !labels.iter().all(|v| v.is_finite() && v.fract() == 0.0) {
            return LabelKind::Continuous;
        }
        let mut classes: Vec<f64> = labels.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        if classes.len() <= max_classes {
            LabelKind::Discrete { classes }
        } else {
            LabelKind::Continuous
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Discrete { classes } => {
                write!(f, "discrete labels, {} classes {:?}", classes.len(), classes)
            }
            LabelKind::Continuous => write!(f, "continuous labels"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Logistic,
    Lasso,
    Linear,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Logistic => "logistic regression",
            ModelKind::Lasso => "lasso",
            ModelKind::Linear => "linear regression",
        };
        f.write_str(name)
    }
}

/// Resolves the configured choice against the detected label kind.
pub fn select_model(choice: ModelChoice, labels: &LabelKind) -> Result<ModelKind, EstimationError> {
    match (choice, labels) {
        (ModelChoice::Auto, LabelKind::Discrete { .. }) => Ok(ModelKind::Logistic),
        (ModelChoice::Auto, LabelKind::Continuous) => Ok(ModelKind::Lasso),
        (ModelChoice::Logistic, LabelKind::Discrete { .. }) => Ok(ModelKind::Logistic),
        (ModelChoice::Logistic, LabelKind::Continuous) => Err(EstimationError::LabelsNotDiscrete),
        (ModelChoice::Lasso, _) => Ok(ModelKind::Lasso),
        (ModelChoice::Linear, _) => Ok(ModelKind::Linear),
    }
}

/// An intercept plus one weight per (standardized) feature.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearCoefficients {
    pub intercept: f64,
    pub weights: Array1<f64>,
}

impl LinearCoefficients {
    pub fn linear_predictor(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.intercept
    }
}

/// Fitted parameters, in the standardized feature space.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelParameters {
    /// Binary problems hold one model for `P(label == classes[1])`; more than two
    /// classes hold one one-vs-rest model per class; a single class holds none.
    Classifier {
        classes: Vec<f64>,
        models: Vec<LinearCoefficients>,
    },
    Regression(LinearCoefficients),
}

/// Everything needed to predict labels for raw feature rows.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub kind: ModelKind,
    pub label_kind: LabelKind,
    pub standardizer: Standardizer,
    pub parameters: ModelParameters,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    #[error("Prediction data has {found} feature columns, but the model was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("The classifier has {classes} classes but {models} fitted models.")]
    InconsistentClassifier { classes: usize, models: usize },
}

impl TrainedModel {
    /// Predicts a label per row of unstandardized `features`. Classifiers return
    /// class values, regressions return the fitted mean.
    pub fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        let expected = self.standardizer.means.len();
        if features.ncols() != expected {
            return Err(ModelError::MismatchedFeatureCount {
                found: features.ncols(),
                expected,
            });
        }
        let z = self.standardizer.transform(features);

        match &self.parameters {
            ModelParameters::Regression(coefficients) => Ok(coefficients.linear_predictor(z.view())),
            ModelParameters::Classifier { classes, models } => {
                predict_classes(classes, models, z.view())
            }
        }
    }
}

fn predict_classes(
    classes: &[f64],
    models: &[LinearCoefficients],
    z: ArrayView2<f64>,
) -> Result<Array1<f64>, ModelError> {
    let n = z.nrows();
    match (classes.len(), models.len()) {
        (1, 0) => Ok(Array1::from_elem(n, classes[0])),
        (2, 1) => {
            // eta >= 0 is P >= 0.5.
            let eta = models[0].linear_predictor(z);
            Ok(eta.mapv(|e| if e >= 0.0 { classes[1] } else { classes[0] }))
        }
        (k, m) if k > 2 && k == m => {
            let etas: Vec<Array1<f64>> = models.iter().map(|model| model.linear_predictor(z)).collect();
            let stacked = ndarray::stack(
                Axis(1),
                &etas.iter().map(|e| e.view()).collect::<Vec<_>>(),
            )
            .map_err(|_| ModelError::InconsistentClassifier { classes: k, models: m })?;
            Ok(stacked
                .axis_iter(Axis(0))
                .map(|row| {
                    let best = row
                        .iter()
                        .enumerate()
                        .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| {
                            if v > acc.1 { (i, v) } else { acc }
                        })
                        .0;
                    classes[best]
                })
                .collect())
        }
        (k, m) => Err(ModelError::InconsistentClassifier { classes: k, models: m }),
    }
}
