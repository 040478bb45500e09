// =============================================================================
// IRLS: Iteratively Reweighted Least Squares
// =============================================================================
//
// THE BIG PICTURE
// ---------------
// We want β maximizing the family's likelihood, equivalently minimizing its
// deviance. For a non-identity link there is no closed form, so we iterate:
//
//     Start with μ⁰ from the family's starting rule
//     Repeat:
//         1. Working weights   wᵢ = priorᵢ / (V(μᵢ) · g'(μᵢ)²)
//         2. Working response  zᵢ = (ηᵢ - offsetᵢ) + (yᵢ - μᵢ) · g'(μᵢ)
//         3. Solve weighted least squares (X'WX) β = X'Wz
//         4. η = Xβ + offset, μ = g⁻¹(η)
//         5. Stop once the relative change in deviance is below tolerance
//
// For the Gaussian-type families (identity link, V = 1) step 3 is ordinary
// least squares and the loop settles after the first update.
//
// FAILURE MODES
// -------------
// - X not of full column rank, or no residual degrees of freedom left
//   → SingularMatrix, before any iteration runs
// - X'WX loses positive definiteness during the iterations → SingularMatrix
// - iteration bound reached → Convergence (never silently accepted)
//
// =============================================================================

use ndarray::{Array1, Array2};

use crate::constants::{DEVIANCE_FLOOR, MAX_WEIGHT};
use crate::diagnostics::pearson_chi2;
use crate::error::{ApcError, Result};
use crate::families::Family;
use crate::linalg::{
    cholesky_inverse, cholesky_solve_and_invert, column_rank, weighted_gram,
    weighted_normal_equations,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration options for the IRLS algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct IRLSConfig {
    /// Maximum number of iterations before reporting non-convergence.
    /// Default: 25
    pub max_iterations: usize,

    /// Convergence tolerance on the deviance.
    /// We stop when: |deviance_old - deviance_new| / |deviance_old| < tolerance
    /// Default: 1e-8
    pub tolerance: f64,

    /// Lower clip on working weights.
    /// Default: 1e-10
    pub min_weight: f64,
}

impl Default for IRLSConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-8,
            min_weight: 1e-10,
        }
    }
}

// =============================================================================
// Result Structure
// =============================================================================

/// Results from fitting a GLM using IRLS.
#[derive(Debug, Clone, PartialEq)]
pub struct IRLSResult {
    /// The fitted coefficients β
    pub coefficients: Array1<f64>,

    /// Fitted values μ = g⁻¹(Xβ + offset)
    pub fitted_values: Array1<f64>,

    /// Linear predictor η = Xβ + offset
    pub linear_predictor: Array1<f64>,

    /// Residual deviance at the converged μ
    pub deviance: f64,

    /// Σ priorᵢ (yᵢ - μᵢ)² / V(μᵢ)
    pub pearson_chi2: f64,

    /// Number of iterations until convergence
    pub iterations: usize,

    /// (X'WX)⁻¹ at the converged μ; Var(β̂) = φ × this
    pub covariance_unscaled: Array2<f64>,

    /// Final working weights (prior weights included)
    pub irls_weights: Array1<f64>,

    /// Prior weights used in the fit
    pub prior_weights: Array1<f64>,

    /// Offset used in the fit
    pub offset: Array1<f64>,

    /// Column rank of X
    pub rank: usize,

    /// n - rank
    pub df_resid: usize,
}

// =============================================================================
// Main Fitting Functions
// =============================================================================

/// Fit a GLM without offset or prior weights.
pub fn fit_glm(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: Family,
    config: &IRLSConfig,
) -> Result<IRLSResult> {
    fit_glm_full(y, x, family, config, None, None)
}

/// Fit a GLM by IRLS.
///
/// # Arguments
/// * `y` - Regressed quantity (n), already transformed by the family
/// * `x` - Design matrix (n × p) including the intercept column
/// * `family` - Response family; decides link, V(μ) and deviance
/// * `config` - Iteration settings
/// * `offset` - Added to the linear predictor, e.g. log(exposure)
/// * `weights` - Prior weights, e.g. binomial trials
pub fn fit_glm_full(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: Family,
    config: &IRLSConfig,
    offset: Option<&Array1<f64>>,
    weights: Option<&Array1<f64>>,
) -> Result<IRLSResult> {
    // -------------------------------------------------------------------------
    // Step 0: Validate inputs
    // -------------------------------------------------------------------------
    let n = y.len();
    let p = x.ncols();

    if x.nrows() != n {
        return Err(ApcError::DimensionMismatch(format!(
            "X has {} rows but y has {} elements",
            x.nrows(),
            n
        )));
    }
    if n == 0 || p == 0 {
        return Err(ApcError::DimensionMismatch(format!(
            "cannot fit a {} x {} design",
            n, p
        )));
    }

    let offset_vec = match offset {
        Some(o) if o.len() != n => {
            return Err(ApcError::DimensionMismatch(format!(
                "offset has {} elements but y has {}",
                o.len(),
                n
            )))
        }
        Some(o) => o.clone(),
        None => Array1::zeros(n),
    };

    let prior_weights = match weights {
        Some(w) if w.len() != n => {
            return Err(ApcError::DimensionMismatch(format!(
                "weights has {} elements but y has {}",
                w.len(),
                n
            )))
        }
        Some(w) if w.iter().any(|&wi| !(wi >= 0.0)) => {
            return Err(ApcError::DimensionMismatch(
                "weights must be non-negative".to_string(),
            ))
        }
        Some(w) => w.clone(),
        None => Array1::ones(n),
    };

    // -------------------------------------------------------------------------
    // Step 1: Identifiability and residual degrees of freedom
    // -------------------------------------------------------------------------
    let rank = column_rank(x);
    if rank < p {
        return Err(ApcError::SingularMatrix {
            context: format!(
                "{} design has {} columns but rank {}",
                family, p, rank
            ),
        });
    }
    if n <= rank {
        return Err(ApcError::SingularMatrix {
            context: format!(
                "{} observations leave no residual degrees of freedom for {} parameters",
                n, rank
            ),
        });
    }

    // -------------------------------------------------------------------------
    // Step 2: Starting values
    // -------------------------------------------------------------------------
    let link = family.link();
    let mut mu = family.initialize_mu(y, Some(&prior_weights));
    let mut eta = link.link(&mu);
    let mut deviance = family.deviance(y, &mu, Some(&prior_weights));
    let mut coefficients = Array1::zeros(p);

    // -------------------------------------------------------------------------
    // Step 3: IRLS iteration loop
    // -------------------------------------------------------------------------
    let mut converged = false;
    let mut iteration = 0;
    let mut rel_change = f64::INFINITY;

    while iteration < config.max_iterations {
        iteration += 1;

        let weights = working_weights(family, &mu, &prior_weights, config);
        let link_deriv = link.derivative(&mu);

        // z = (η - offset) + (y - μ) g'(μ)
        let working_response: Array1<f64> = eta
            .iter()
            .zip(offset_vec.iter())
            .zip(y.iter().zip(mu.iter()))
            .zip(link_deriv.iter())
            .map(|(((&e, &o), (&yi, &mi)), &d)| (e - o) + (yi - mi) * d)
            .collect();

        let (xtwx, xtwz) = weighted_normal_equations(x, &working_response, &weights);
        let (beta, _) = cholesky_solve_and_invert(&xtwx, &xtwz).ok_or_else(|| {
            ApcError::SingularMatrix {
                context: format!(
                    "X'WX is not positive definite at IRLS iteration {} ({})",
                    iteration, family
                ),
            }
        })?;

        eta = x.dot(&beta) + &offset_vec;
        mu = family.clamp_mu(&link.inverse(&eta));
        coefficients = beta;

        let deviance_old = deviance;
        deviance = family.deviance(y, &mu, Some(&prior_weights));

        rel_change = if deviance_old.abs() > DEVIANCE_FLOOR {
            (deviance_old - deviance).abs() / deviance_old.abs()
        } else {
            (deviance_old - deviance).abs()
        };

        log::trace!(
            "{} iteration {}: deviance = {:.8}, rel_change = {:.2e}",
            family,
            iteration,
            deviance,
            rel_change
        );

        if rel_change < config.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(ApcError::Convergence {
            family: family.name().to_string(),
            iterations: iteration,
            rel_change,
        });
    }

    // -------------------------------------------------------------------------
    // Step 4: Covariance and Pearson statistic at the converged μ
    // -------------------------------------------------------------------------
    let irls_weights = working_weights(family, &mu, &prior_weights, config);
    let covariance_unscaled =
        cholesky_inverse(&weighted_gram(x, &irls_weights)).ok_or_else(|| {
            ApcError::SingularMatrix {
                context: format!("X'WX is not invertible at the converged {} fit", family),
            }
        })?;

    let pearson_chi2 = pearson_chi2(y, &mu, &prior_weights, family);

    log::debug!(
        "{} converged in {} iterations: deviance = {:.6}, rank = {}, df_resid = {}",
        family,
        iteration,
        deviance,
        rank,
        n - rank
    );

    Ok(IRLSResult {
        coefficients,
        fitted_values: mu,
        linear_predictor: eta,
        deviance,
        pearson_chi2,
        iterations: iteration,
        covariance_unscaled,
        irls_weights,
        prior_weights,
        offset: offset_vec,
        rank,
        df_resid: n - rank,
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// priorᵢ / (V(μᵢ) g'(μᵢ)²), with the IRLS part clipped to a sane band.
fn working_weights(
    family: Family,
    mu: &Array1<f64>,
    prior_weights: &Array1<f64>,
    config: &IRLSConfig,
) -> Array1<f64> {
    let variance = family.variance(mu);
    let link_deriv = family.link().derivative(mu);

    variance
        .iter()
        .zip(link_deriv.iter())
        .zip(prior_weights.iter())
        .map(|((&v, &d), &pw)| {
            let w = 1.0 / (v * d * d);
            pw * w.max(config.min_weight).min(MAX_WEIGHT)
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_gaussian_identity_is_ols() {
        // y ≈ 2 + 3x
        let x = array![[1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0], [1.0, 5.0]];
        let y = array![5.1, 7.9, 11.2, 13.8, 17.1];

        let result = fit_glm(&y, &x, Family::GaussianResponse, &IRLSConfig::default()).unwrap();

        // closed-form OLS: slope = Sxy / Sxx, intercept = ȳ - slope·x̄
        let slope = 29.9 / 10.0;
        let intercept = 11.02 - slope * 3.0;
        assert_abs_diff_eq!(result.coefficients[0], intercept, epsilon = 1e-8);
        assert_abs_diff_eq!(result.coefficients[1], slope, epsilon = 1e-8);
        assert_eq!(result.df_resid, 3);
        assert!(result.iterations <= 3);
        // Gaussian: Pearson χ² equals RSS
        assert_abs_diff_eq!(result.pearson_chi2, result.deviance, epsilon = 1e-10);
    }

    #[test]
    fn test_poisson_log_link_score_equations() {
        let x = array![
            [1.0, 0.0],
            [1.0, 1.0],
            [1.0, 2.0],
            [1.0, 3.0],
            [1.0, 4.0],
            [1.0, 5.0]
        ];
        let y = array![2.0, 2.0, 3.0, 4.0, 5.0, 7.0];

        let result = fit_glm(&y, &x, Family::PoissonResponse, &IRLSConfig::default()).unwrap();

        assert!(result.fitted_values.iter().all(|&m| m > 0.0));
        // canonical link: X'(y - μ) = 0 at the MLE
        let score = x.t().dot(&(&y - &result.fitted_values));
        assert_abs_diff_eq!(score[0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(score[1], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_offset_shifts_intercept() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![2.0, 4.0, 6.0];
        let exposure = array![1.0, 2.0, 3.0];
        let offset = exposure.mapv(f64::ln);

        let result = fit_glm_full(
            &y,
            &x,
            Family::PoissonDoseResponse,
            &IRLSConfig::default(),
            Some(&offset),
            None,
        )
        .unwrap();

        // rate = Σy / Σexposure = 2
        assert_abs_diff_eq!(result.coefficients[0], 2.0_f64.ln(), epsilon = 1e-6);
        assert_abs_diff_eq!(result.deviance, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_binomial_weights() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let p = array![0.2, 0.6, 0.3, 0.5];
        let trials = array![10.0, 10.0, 10.0, 10.0];

        let result = fit_glm_full(
            &p,
            &x,
            Family::BinomialDoseResponse,
            &IRLSConfig::default(),
            None,
            Some(&trials),
        )
        .unwrap();

        // group proportions 0.25 and 0.55 are reproduced
        assert_abs_diff_eq!(result.fitted_values[0], 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(result.fitted_values[1], 0.55, epsilon = 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let x = array![[1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 2.0];

        let result = fit_glm(&y, &x, Family::GaussianResponse, &IRLSConfig::default());
        assert!(matches!(result, Err(ApcError::DimensionMismatch(_))));
    }

    #[test]
    fn test_rank_deficient_design_is_singular() {
        // third column duplicates the second
        let x = array![[1.0, 0.0, 0.0], [1.0, 1.0, 1.0], [1.0, 2.0, 2.0], [1.0, 3.0, 3.0]];
        let y = array![1.0, 2.0, 2.5, 4.0];
        let result = fit_glm(&y, &x, Family::GaussianResponse, &IRLSConfig::default());
        assert!(matches!(result, Err(ApcError::SingularMatrix { .. })));
    }

    #[test]
    fn test_no_residual_df_is_singular() {
        let x = array![[1.0, 0.0], [1.0, 1.0]];
        let y = array![1.0, 2.0];
        let result = fit_glm(&y, &x, Family::GaussianResponse, &IRLSConfig::default());
        assert!(matches!(result, Err(ApcError::SingularMatrix { .. })));
    }

    #[test]
    fn test_iteration_bound_is_an_error() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 5.0, 2.0, 30.0];
        let config = IRLSConfig {
            max_iterations: 1,
            ..IRLSConfig::default()
        };
        let result = fit_glm(&y, &x, Family::OdPoissonResponse, &config);
        assert!(matches!(
            result,
            Err(ApcError::Convergence { iterations: 1, .. })
        ));
    }
}
