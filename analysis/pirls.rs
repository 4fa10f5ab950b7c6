use crate::estimate::EstimationError;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Zip};
use ndarray_linalg::Solve;

/// Maximum number of times a rejected step is halved before the fit is declared
/// stalled.
const MAX_STEP_HALVINGS: usize = 30;

/// The status of the IRLS convergence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PirlsStatus {
    /// Converged successfully within tolerance.
    Converged,
    /// No step, however short, lowered the penalized deviance any further.
    StalledAtValidMinimum,
    /// Reached maximum iterations without converging.
    MaxIterationsReached,
}

/// Settings for one penalized logistic fit.
#[derive(Clone, Copy, Debug)]
pub struct PirlsOptions {
    /// Ridge weight applied to every coefficient except the intercept (column 0).
    pub ridge: f64,
    pub max_iterations: usize,
    pub convergence_tolerance: f64,
}

/// Holds the result of a logistic fit.
///
/// * `beta`: coefficients for the columns of the design matrix, intercept first.
/// * `deviance`: the binomial deviance, -2 times the log-likelihood.
/// * `iteration`: the number of IRLS iterations that were run.
#[derive(Clone, Debug)]
pub struct PirlsResult {
    pub beta: Array1<f64>,
    pub deviance: f64,
    pub status: PirlsStatus,
    pub iteration: usize,
}

/// Fits a ridge-penalized logistic regression by iteratively reweighted least
/// squares.
///
/// `x` must carry the intercept as its first column and `y` must hold 0/1 outcomes.
/// Each iteration solves `(X'WX + S) beta = X'Wz` for the working response `z`,
/// halving the step while the penalized deviance `D(beta) + beta'S beta` does not
/// decrease.
pub fn fit_logistic(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    options: &PirlsOptions,
) -> Result<PirlsResult, EstimationError> {
    let p = x.ncols();
    let penalty: Array1<f64> = (0..p)
        .map(|j| if j == 0 { 0.0 } else { options.ridge })
        .collect();
    let penalized = |beta: &Array1<f64>, deviance: f64| deviance + (&penalty * beta).dot(beta);

    let mut beta = Array1::<f64>::zeros(p);
    let mut eta = x.dot(&beta);
    let (mut mu, mut weights, mut z) = update_glm_vectors(y, &eta);
    let mut deviance = calculate_deviance(y, &mu);

    log::debug!(
        "Starting IRLS on {} rows, {} coefficients, ridge {:.3e}",
        x.nrows(),
        p,
        options.ridge
    );

    for iter in 1..=options.max_iterations {
        if !weights.iter().all(|v| v.is_finite()) || !z.iter().all(|v| v.is_finite()) {
            log::error!("Non-finite IRLS working values at iteration {iter}");
            return Err(EstimationError::PirlsDidNotConverge {
                max_iterations: options.max_iterations,
                last_change: f64::NAN,
            });
        }

        // Weighted, penalized normal equations.
        let wx = &x * &weights.view().insert_axis(Axis(1));
        let mut xtwx = x.t().dot(&wx);
        for j in 0..p {
            xtwx[[j, j]] += penalty[j];
        }
        let xtwz = wx.t().dot(&z);
        let mut beta_trial = xtwx
            .solve(&xtwz)
            .map_err(EstimationError::LinearSystemSolveFailed)?;

        let objective_current = penalized(&beta, deviance);
        // Rounding noise near the optimum must not count as an increase.
        let slack = 1e-12 * (objective_current.abs() + 1.0);
        let accepts = |objective: f64| objective.is_finite() && objective <= objective_current + slack;

        let mut deviance_trial;
        let mut objective_trial;
        let mut step_halving_count = 0;
        loop {
            eta = x.dot(&beta_trial);
            let (mu_trial, _, _) = update_glm_vectors(y, &eta);
            deviance_trial = calculate_deviance(y, &mu_trial);
            objective_trial = penalized(&beta_trial, deviance_trial);

            if accepts(objective_trial) || step_halving_count >= MAX_STEP_HALVINGS {
                break;
            }
            beta_trial = (&beta + &beta_trial) * 0.5;
            step_halving_count += 1;
        }

        if !accepts(objective_trial) {
            log::warn!(
                "IRLS stalled at iteration {iter}: no step lowered the penalized deviance {:.6e}",
                objective_current
            );
            return Ok(PirlsResult {
                beta,
                deviance,
                status: PirlsStatus::StalledAtValidMinimum,
                iteration: iter,
            });
        }
        if step_halving_count > 0 {
            log::debug!("IRLS iteration {iter}: step halved {step_halving_count} times");
        }

        let change = objective_current - objective_trial;
        beta = beta_trial;
        deviance = deviance_trial;
        (mu, weights, z) = update_glm_vectors(y, &eta);
        log::debug!(
            "IRLS iteration {iter}: deviance {:.8e}, penalized change {:.8e}",
            deviance,
            change
        );

        // Relative change test, as in mgcv.
        if change.abs() / (objective_trial.abs() + 0.1) < options.convergence_tolerance {
            log::debug!("IRLS converged after {iter} iterations");
            return Ok(PirlsResult {
                beta,
                deviance,
                status: PirlsStatus::Converged,
                iteration: iter,
            });
        }
    }

    log::warn!(
        "IRLS did not converge after {} iterations (fitted mean range {:.3}..{:.3}).",
        options.max_iterations,
        mu.iter().copied().fold(f64::INFINITY, f64::min),
        mu.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    );
    Ok(PirlsResult {
        beta,
        deviance,
        status: PirlsStatus::MaxIterationsReached,
        iteration: options.max_iterations,
    })
}

/// Fitted means, IRLS weights and working response for the logit link.
pub fn update_glm_vectors(
    y: ArrayView1<f64>,
    eta: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    const MIN_WEIGHT: f64 = 1e-6;
    const PROB_EPS: f64 = 1e-8;

    // Clamp eta to prevent overflow in exp
    let eta_clamped = eta.mapv(|e| e.clamp(-700.0, 700.0));
    let mut mu = eta_clamped.mapv(|e| 1.0 / (1.0 + (-e).exp()));
    mu.mapv_inplace(|v| v.clamp(PROB_EPS, 1.0 - PROB_EPS));
    let weights = (&mu * (1.0 - &mu)).mapv(|v| v.max(MIN_WEIGHT));

    let residual = &y - &mu;
    let z = &eta_clamped + &(&residual / &weights);

    (mu, weights, z)
}

/// Binomial deviance of 0/1 outcomes `y` under fitted probabilities `mu`.
pub fn calculate_deviance(y: ArrayView1<f64>, mu: &Array1<f64>) -> f64 {
    const EPS: f64 = 1e-8;
    let total = Zip::from(y).and(mu).fold(0.0, |acc, &yi, &mui| {
        let mui_c = mui.clamp(EPS, 1.0 - EPS);
        let term1 = if yi > EPS {
            yi * (yi.ln() - mui_c.ln())
        } else {
            0.0
        };
        let term2 = if yi < 1.0 - EPS {
            (1.0 - yi) * ((1.0 - yi).ln() - (1.0 - mui_c).ln())
        } else {
            0.0
        };
        acc + term1 + term2
    });
    2.0 * total
}
