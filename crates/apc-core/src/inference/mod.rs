// =============================================================================
// Statistical Inference
// =============================================================================
//
// Distribution tail probabilities and coefficient-level inference for fitted
// APC models:
//   - P-values for coefficients (z when φ is known, t when φ is estimated)
//   - Confidence intervals
//   - Upper-tail probabilities of the F and χ² distributions, used by the
//     model comparison tests
//
// IMPORTANT CAVEAT:
// APC coefficients are only interpretable under the identification
// convention of the design matrix (reference levels dropped). A p-value for
// `age_5` tests age 5 against the lowest age level, nothing more.
//
// =============================================================================

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

// =============================================================================
// P-Value Calculation
// =============================================================================

/// Two-tailed p-value from a z-statistic.
pub fn pvalue_z(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return f64::NAN;
    };
    // P(|Z| > |z|) = 2 * (1 - Φ(|z|))
    2.0 * (1.0 - normal.cdf(z.abs()))
}

/// Two-tailed p-value from a t-statistic with `df` degrees of freedom.
pub fn pvalue_t(t: f64, df: f64) -> f64 {
    if !t.is_finite() || df <= 0.0 {
        return f64::NAN;
    }
    let Ok(t_dist) = StudentsT::new(0.0, 1.0, df) else {
        return f64::NAN;
    };
    2.0 * (1.0 - t_dist.cdf(t.abs()))
}

/// P(F > f) for F ~ F(d1, d2).
///
/// Returns 1 for f ≤ 0 and NaN for invalid degrees of freedom.
pub fn f_upper_tail(f: f64, d1: f64, d2: f64) -> f64 {
    if f.is_nan() || d1 <= 0.0 || d2 <= 0.0 {
        return f64::NAN;
    }
    if f <= 0.0 {
        return 1.0;
    }
    if f.is_infinite() {
        return 0.0;
    }
    let Ok(dist) = FisherSnedecor::new(d1, d2) else {
        return f64::NAN;
    };
    (1.0 - dist.cdf(f)).clamp(0.0, 1.0)
}

/// P(X > x) for X ~ χ²(df).
pub fn chi2_upper_tail(x: f64, df: f64) -> f64 {
    if x.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    if x.is_infinite() {
        return 0.0;
    }
    let Ok(dist) = ChiSquared::new(df) else {
        return f64::NAN;
    };
    (1.0 - dist.cdf(x)).clamp(0.0, 1.0)
}

// =============================================================================
// Confidence Intervals
// =============================================================================

/// Confidence interval using the z-distribution.
pub fn confidence_interval_z(estimate: f64, std_error: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return (f64::NAN, f64::NAN);
    };
    let alpha = 1.0 - confidence;
    let margin = normal.inverse_cdf(1.0 - alpha / 2.0) * std_error;
    (estimate - margin, estimate + margin)
}

/// Confidence interval using the t-distribution.
pub fn confidence_interval_t(
    estimate: f64,
    std_error: f64,
    df: f64,
    confidence: f64,
) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error <= 0.0 || df <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let Ok(t_dist) = StudentsT::new(0.0, 1.0, df) else {
        return (f64::NAN, f64::NAN);
    };
    let alpha = 1.0 - confidence;
    let margin = t_dist.inverse_cdf(1.0 - alpha / 2.0) * std_error;
    (estimate - margin, estimate + margin)
}

// =============================================================================
// Coefficient table
// =============================================================================

/// One row of a coefficient summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// t-statistic when φ is estimated, z-statistic otherwise.
    pub statistic: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Summarize coefficients given their scaled covariance.
///
/// With `df_resid = Some(df)` the t-distribution is used, otherwise the
/// standard normal.
pub fn coefficient_table(
    names: &[String],
    estimates: &ndarray::Array1<f64>,
    covariance: &ndarray::Array2<f64>,
    df_resid: Option<f64>,
    confidence: f64,
) -> Vec<CoefficientRow> {
    names
        .iter()
        .zip(estimates.iter())
        .enumerate()
        .map(|(j, (name, &estimate))| {
            let std_error = covariance[[j, j]].max(0.0).sqrt();
            let statistic = estimate / std_error;
            let (p_value, (ci_lower, ci_upper)) = match df_resid {
                Some(df) => (
                    pvalue_t(statistic, df),
                    confidence_interval_t(estimate, std_error, df, confidence),
                ),
                None => (
                    pvalue_z(statistic),
                    confidence_interval_z(estimate, std_error, confidence),
                ),
            };
            CoefficientRow {
                name: name.clone(),
                estimate,
                std_error,
                statistic,
                p_value,
                ci_lower,
                ci_upper,
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
