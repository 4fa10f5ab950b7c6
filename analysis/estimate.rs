// analysis/estimate.rs

//! # Model Estimation
//!
//! This module turns a feature matrix and its labels into a [`TrainedModel`]:
//!
//! 1.  **Standardize:** Column means and scales are learned from the training rows so
//!     that penalties treat every feature alike and the IRLS system stays
//!     well-conditioned even though ages and test results live on different scales.
//!
//! 2.  **Select:** The labels are classified as discrete or continuous and the
//!     configured [`ModelChoice`](crate::config::ModelChoice) is resolved against
//!     that.
//!
//! 3.  **Fit:** Logistic regression (one-vs-rest beyond two classes), lasso, or
//!     ordinary least squares.

use crate::config::AnalysisConfig;
use crate::evaluate::Standardizer;
use crate::lasso::{LassoOptions, fit_lasso};
use crate::model::{
    LabelKind, LinearCoefficients, ModelKind, ModelParameters, TrainedModel, select_model,
};
use crate::pirls::{PirlsOptions, PirlsStatus, fit_logistic};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use ndarray_linalg::LeastSquaresSvd;
use thiserror::Error;

/// A comprehensive error type for the model estimation process.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("A linear system solve failed. The weighted design may be singular. Error: {0}")]
    LinearSystemSolveFailed(ndarray_linalg::error::LinalgError),

    #[error(
        "The IRLS loop did not converge within {max_iterations} iterations. Last deviance change was {last_change:.6e}."
    )]
    PirlsDidNotConverge {
        max_iterations: usize,
        last_change: f64,
    },

    #[error(
        "Logistic regression was requested but the labels are continuous. Raise the class limit or choose a regression model."
    )]
    LabelsNotDiscrete,

    #[error("The training set is empty.")]
    EmptyTrainingSet,

    #[error("The feature matrix has {rows} rows but there are {labels} labels.")]
    DimensionMismatch { rows: usize, labels: usize },
}

/// The main entry point for model training.
pub fn train_model(
    features: ArrayView2<f64>,
    labels: ArrayView1<f64>,
    config: &AnalysisConfig,
) -> Result<TrainedModel, EstimationError> {
    if features.nrows() != labels.len() {
        return Err(EstimationError::DimensionMismatch {
            rows: features.nrows(),
            labels: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(EstimationError::EmptyTrainingSet);
    }

    let standardizer = Standardizer::fit(features);
    let z = standardizer.transform(features);

    let label_kind = LabelKind::detect(labels, config.max_discrete_classes);
    let kind = select_model(config.model, &label_kind)?;
    log::info!(
        "Training {} on {} rows x {} features ({})",
        kind,
        z.nrows(),
        z.ncols(),
        label_kind
    );

    let parameters = match kind {
        ModelKind::Logistic => {
            let classes = match &label_kind {
                LabelKind::Discrete { classes } => classes.clone(),
                LabelKind::Continuous => return Err(EstimationError::LabelsNotDiscrete),
            };
            fit_classifier(z.view(), labels, classes, config)?
        }
        ModelKind::Lasso => {
            let fit = fit_lasso(
                z.view(),
                labels,
                &LassoOptions {
                    alpha: config.lasso_alpha,
                    max_iterations: config.lasso_max_iterations,
                    tolerance: config.lasso_tolerance,
                },
            );
            log::info!(
                "Lasso finished after {} sweeps (converged: {})",
                fit.iterations,
                fit.converged
            );
            ModelParameters::Regression(fit.coefficients)
        }
        ModelKind::Linear => ModelParameters::Regression(fit_least_squares(z.view(), labels)?),
    };

    Ok(TrainedModel {
        kind,
        label_kind,
        standardizer,
        parameters,
    })
}

/// Prepends a column of ones.
fn with_intercept(z: ArrayView2<f64>) -> Array2<f64> {
    Array2::from_shape_fn((z.nrows(), z.ncols() + 1), |(i, j)| {
        if j == 0 { 1.0 } else { z[[i, j - 1]] }
    })
}

fn split_intercept(beta: &Array1<f64>) -> LinearCoefficients {
    LinearCoefficients {
        intercept: beta[0],
        weights: beta.slice(s![1..]).to_owned(),
    }
}

/// Fits one logistic model for binary labels, one per class beyond that.
fn fit_classifier(
    z: ArrayView2<f64>,
    labels: ArrayView1<f64>,
    classes: Vec<f64>,
    config: &AnalysisConfig,
) -> Result<ModelParameters, EstimationError> {
    let options = PirlsOptions {
        ridge: config.logistic_ridge,
        max_iterations: config.max_iterations,
        convergence_tolerance: config.convergence_tolerance,
    };
    let design = with_intercept(z);

    let positives: Vec<f64> = match classes.len() {
        0 | 1 => Vec::new(),
        2 => vec![classes[1]],
        _ => classes.clone(),
    };

    let mut models = Vec::with_capacity(positives.len());
    for positive in positives {
        let y = labels.mapv(|label| if label == positive { 1.0 } else { 0.0 });
        let result = fit_logistic(design.view(), y.view(), &options)?;
        if result.status != PirlsStatus::Converged {
            log::warn!(
                "Logistic model for class {} ended with status {:?} after {} iterations",
                positive,
                result.status,
                result.iteration
            );
        }
        log::debug!(
            "Logistic model for class {}: deviance {:.6e}",
            positive,
            result.deviance
        );
        models.push(split_intercept(&result.beta));
    }

    Ok(ModelParameters::Classifier { classes, models })
}

/// Ordinary least squares with an intercept. The SVD solve returns the
/// minimum-norm solution when columns are collinear or constant.
fn fit_least_squares(
    z: ArrayView2<f64>,
    labels: ArrayView1<f64>,
) -> Result<LinearCoefficients, EstimationError> {
    let design = with_intercept(z);
    let result = design
        .least_squares(&labels)
        .map_err(EstimationError::LinearSystemSolveFailed)?;
    log::debug!("Least squares solved with rank {}", result.rank);
    Ok(split_intercept(&result.solution))
}
