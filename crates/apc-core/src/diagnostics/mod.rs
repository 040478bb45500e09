// =============================================================================
// Model Diagnostics
// =============================================================================
//
// Diagnostic quantities for fitted APC models:
//
// - RESIDUALS: Different ways to measure prediction errors
// - DISPERSION: Estimating the scale parameter φ
//
// Conventions:
// - resid_response: Raw residuals (y - μ)
// - resid_pearson: Standardized by variance
// - resid_deviance: Signed square root of deviance contributions
// - resid_working: Residuals on the linear-predictor scale, as used in IRLS
//
// All quantities are on the scale of the regressed quantity, so for the
// log-normal families y is the log response.
//
// =============================================================================

mod dispersion;
mod residuals;

pub use dispersion::{estimate_dispersion, estimate_dispersion_deviance, pearson_chi2};
pub use residuals::{resid_deviance, resid_pearson, resid_response, resid_working};
