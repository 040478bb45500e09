// =============================================================================
// Dispersion
// =============================================================================
//
// Families with a free scale (Gaussian, log-normal, over-dispersed Poisson)
// estimate φ from the Pearson statistic:
//
//     φ̂ = Σ wᵢ (yᵢ - μᵢ)² / V(μᵢ) / (n - rank)
//
// Families with a known scale use φ = 1.
//
// =============================================================================

use ndarray::Array1;

use crate::families::Family;

/// Pearson χ² = Σ wᵢ (yᵢ - μᵢ)² / V(μᵢ)
pub fn pearson_chi2(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    weights: &Array1<f64>,
    family: Family,
) -> f64 {
    let variance = family.variance(mu);
    y.iter()
        .zip(mu.iter())
        .zip(variance.iter())
        .zip(weights.iter())
        .map(|(((&yi, &mi), &v), &w)| w * (yi - mi).powi(2) / v)
        .sum()
}

/// φ used for inference: Pearson χ² / df for families with a free scale,
/// 1 otherwise.
pub fn estimate_dispersion(pearson_chi2: f64, df_resid: usize, family: Family) -> f64 {
    if !family.estimates_dispersion() {
        return 1.0;
    }
    if df_resid == 0 {
        return f64::NAN;
    }
    pearson_chi2 / df_resid as f64
}

/// Deviance-based alternative: D / df.
pub fn estimate_dispersion_deviance(deviance: f64, df_resid: usize) -> f64 {
    if df_resid == 0 {
        return f64::NAN;
    }
    deviance / df_resid as f64
}
