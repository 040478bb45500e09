// =============================================================================
// Residuals
// =============================================================================

use ndarray::Array1;

use crate::families::Family;

/// Response residuals: yᵢ - μᵢ
pub fn resid_response(y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
    y - mu
}

/// Pearson residuals: √wᵢ (yᵢ - μᵢ) / √V(μᵢ)
///
/// Their sum of squares is the Pearson χ² statistic.
pub fn resid_pearson(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    weights: &Array1<f64>,
    family: Family,
) -> Array1<f64> {
    let variance = family.variance(mu);
    y.iter()
        .zip(mu.iter())
        .zip(variance.iter())
        .zip(weights.iter())
        .map(|(((&yi, &mi), &v), &w)| w.sqrt() * (yi - mi) / v.sqrt())
        .collect()
}

/// Deviance residuals: sign(yᵢ - μᵢ) √(wᵢ dᵢ)
///
/// Their sum of squares is the residual deviance.
pub fn resid_deviance(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    weights: &Array1<f64>,
    family: Family,
) -> Array1<f64> {
    y.iter()
        .zip(mu.iter())
        .zip(weights.iter())
        .map(|((&yi, &mi), &w)| {
            let d = (w * family.unit_deviance(yi, mi)).max(0.0).sqrt();
            if yi >= mi {
                d
            } else {
                -d
            }
        })
        .collect()
}

/// Working residuals: (yᵢ - μᵢ) g'(μᵢ)
pub fn resid_working(y: &Array1<f64>, mu: &Array1<f64>, family: Family) -> Array1<f64> {
    let link_deriv = family.link().derivative(mu);
    y.iter()
        .zip(mu.iter())
        .zip(link_deriv.iter())
        .map(|((&yi, &mi), &d)| (yi - mi) * d)
        .collect()
}
