// =============================================================================
// Response Families
// =============================================================================
//
// A family fixes how the raw responses of a table are modelled:
//
//   - which quantity is regressed (y, y/exposure, log y, ...)
//   - the distribution behind it, giving the variance function V(μ) and
//     the deviance
//   - the link function
//   - whether the dispersion φ is known (1) or estimated from the data
//
// The set is closed. Adding a family means adding a variant and letting the
// compiler point at every `match` that needs a new arm; the IRLS loop itself
// never looks at family names.
//
//   family                 regressed quantity    distribution  link      φ
//   ---------------------  --------------------  ------------  --------  ---------
//   gaussian_response      y                     normal        identity  estimated
//   gaussian_rates         y / exposure          normal        identity  estimated
//   log_normal_response    log y                 normal        identity  estimated
//   log_normal_rates       log(y / exposure)     normal        identity  estimated
//   poisson_response       y                     Poisson       log       1
//   od_poisson_response    y                     Poisson       log       estimated
//   poisson_dose_response  y, offset log(expo.)  Poisson       log       1
//   binomial_dose_response y / trials, w=trials  binomial      logit     1
//
// =============================================================================

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;

use crate::constants::{
    MU_MAX_PROBABILITY, MU_MIN_POSITIVE, MU_MIN_PROBABILITY, POISSON_START_SHIFT,
};
use crate::error::{ApcError, Result, SpecError};
use crate::index::ObservationTable;
use crate::links::Link;

/// Distribution underlying a family; decides V(μ) and the deviance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Distribution {
    Normal,
    Poisson,
    Binomial,
}

/// Closed set of response families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    GaussianResponse,
    GaussianRates,
    LogNormalResponse,
    LogNormalRates,
    PoissonResponse,
    OdPoissonResponse,
    PoissonDoseResponse,
    BinomialDoseResponse,
}

/// The vectors handed to the solver for one table under one family.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingData {
    /// Regressed quantity (already transformed).
    pub y: Array1<f64>,
    /// Added to the linear predictor; `None` means zero.
    pub offset: Option<Array1<f64>>,
    /// Prior weights; `None` means one.
    pub weights: Option<Array1<f64>>,
}

impl Family {
    pub const ALL: [Family; 8] = [
        Family::GaussianResponse,
        Family::GaussianRates,
        Family::LogNormalResponse,
        Family::LogNormalRates,
        Family::PoissonResponse,
        Family::OdPoissonResponse,
        Family::PoissonDoseResponse,
        Family::BinomialDoseResponse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Family::GaussianResponse => "gaussian_response",
            Family::GaussianRates => "gaussian_rates",
            Family::LogNormalResponse => "log_normal_response",
            Family::LogNormalRates => "log_normal_rates",
            Family::PoissonResponse => "poisson_response",
            Family::OdPoissonResponse => "od_poisson_response",
            Family::PoissonDoseResponse => "poisson_dose_response",
            Family::BinomialDoseResponse => "binomial_dose_response",
        }
    }

    fn distribution(&self) -> Distribution {
        match self {
            Family::GaussianResponse
            | Family::GaussianRates
            | Family::LogNormalResponse
            | Family::LogNormalRates => Distribution::Normal,
            Family::PoissonResponse | Family::OdPoissonResponse | Family::PoissonDoseResponse => {
                Distribution::Poisson
            }
            Family::BinomialDoseResponse => Distribution::Binomial,
        }
    }

    pub fn link(&self) -> Link {
        match self.distribution() {
            Distribution::Normal => Link::Identity,
            Distribution::Poisson => Link::Log,
            Distribution::Binomial => Link::Logit,
        }
    }

    /// True when φ is estimated by Pearson χ² / df rather than fixed at 1.
    ///
    /// Inference on such families uses the t distribution.
    pub fn estimates_dispersion(&self) -> bool {
        match self {
            Family::GaussianResponse
            | Family::GaussianRates
            | Family::LogNormalResponse
            | Family::LogNormalRates
            | Family::OdPoissonResponse => true,
            Family::PoissonResponse
            | Family::PoissonDoseResponse
            | Family::BinomialDoseResponse => false,
        }
    }

    /// True when every record needs an exposure.
    pub fn requires_exposure(&self) -> bool {
        matches!(
            self,
            Family::GaussianRates
                | Family::LogNormalRates
                | Family::PoissonDoseResponse
                | Family::BinomialDoseResponse
        )
    }

    // =========================================================================
    // Data preparation
    // =========================================================================

    /// Transform the table's responses into solver input.
    ///
    /// Fails with `SpecError::UnsupportedData` naming the first record the
    /// family cannot model (missing exposure, log of a non-positive value,
    /// negative count, ...).
    pub fn working_data(&self, table: &ObservationTable) -> Result<WorkingData> {
        let n = table.len();
        let mut y = Vec::with_capacity(n);
        let mut offset = Vec::new();
        let mut weights = Vec::new();

        for (i, obs) in table.observations().iter().enumerate() {
            let reject = |reason: String| -> ApcError {
                SpecError::UnsupportedData {
                    family: self.name().to_string(),
                    record: i,
                    reason,
                }
                .into()
            };
            let exposure = match (self.requires_exposure(), obs.exposure) {
                (false, _) => None,
                (true, Some(e)) if e > 0.0 => Some(e),
                (true, Some(e)) => return Err(reject(format!("exposure {} is not positive", e))),
                (true, None) => return Err(reject("exposure is missing".to_string())),
            };
            let r = obs.response;

            let value = match self {
                Family::GaussianResponse => r,
                Family::GaussianRates => r / exposure.unwrap_or(1.0),
                Family::LogNormalResponse | Family::LogNormalRates => {
                    if r <= 0.0 {
                        return Err(reject(format!("response {} has no logarithm", r)));
                    }
                    (r / exposure.unwrap_or(1.0)).ln()
                }
                Family::PoissonResponse | Family::OdPoissonResponse => {
                    if r < 0.0 {
                        return Err(reject(format!("count {} is negative", r)));
                    }
                    r
                }
                Family::PoissonDoseResponse => {
                    if r < 0.0 {
                        return Err(reject(format!("count {} is negative", r)));
                    }
                    offset.push(exposure.unwrap_or(1.0).ln());
                    r
                }
                Family::BinomialDoseResponse => {
                    let trials = exposure.unwrap_or(1.0);
                    if r < 0.0 || r > trials {
                        return Err(reject(format!(
                            "successes {} outside [0, {}] trials",
                            r, trials
                        )));
                    }
                    weights.push(trials);
                    r / trials
                }
            };
            y.push(value);
        }

        Ok(WorkingData {
            y: Array1::from(y),
            offset: (!offset.is_empty()).then(|| Array1::from(offset)),
            weights: (!weights.is_empty()).then(|| Array1::from(weights)),
        })
    }

    // =========================================================================
    // Variance and deviance
    // =========================================================================

    /// V(μ): variance of Y as a function of its mean, up to φ.
    pub fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self.distribution() {
            Distribution::Normal => Array1::ones(mu.len()),
            Distribution::Poisson => mu.mapv(|m| m.max(MU_MIN_POSITIVE)),
            Distribution::Binomial => mu.mapv(|m| {
                let m = m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                m * (1.0 - m)
            }),
        }
    }

    /// Deviance contribution of one observation before prior weighting.
    pub fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        match self.distribution() {
            Distribution::Normal => (y - mu).powi(2),
            Distribution::Poisson => {
                let mu = mu.max(MU_MIN_POSITIVE);
                2.0 * (xlogy_ratio(y, mu) - (y - mu))
            }
            Distribution::Binomial => {
                let mu = mu.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                2.0 * (xlogy_ratio(y, mu) + xlogy_ratio(1.0 - y, 1.0 - mu))
            }
        }
    }

    /// Residual deviance Σ wᵢ·d(yᵢ, μᵢ).
    pub fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
        y.iter()
            .zip(mu.iter())
            .enumerate()
            .map(|(i, (&yi, &mi))| {
                let w = weights.map_or(1.0, |w| w[i]);
                w * self.unit_deviance(yi, mi)
            })
            .sum()
    }

    // =========================================================================
    // IRLS starting values
    // =========================================================================

    /// μ⁰ for IRLS.
    ///
    /// Normal: y. Poisson: y + 0.1 so that log μ⁰ is finite for zero counts.
    /// Binomial: (w·y + 0.5)/(w + 1), pulled away from 0 and 1.
    pub fn initialize_mu(&self, y: &Array1<f64>, weights: Option<&Array1<f64>>) -> Array1<f64> {
        let mu = match self.distribution() {
            Distribution::Normal => y.clone(),
            Distribution::Poisson => y.mapv(|v| v + POISSON_START_SHIFT),
            Distribution::Binomial => Array1::from_iter(y.iter().enumerate().map(|(i, &v)| {
                let w = weights.map_or(1.0, |w| w[i]);
                (w * v + 0.5) / (w + 1.0)
            })),
        };
        self.clamp_mu(&mu)
    }

    /// Keep μ inside the family's valid range.
    pub fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self.distribution() {
            Distribution::Normal => mu.clone(),
            Distribution::Poisson => mu.mapv(|m| m.max(MU_MIN_POSITIVE)),
            Distribution::Binomial => mu.mapv(|m| m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY)),
        }
    }
}

/// x·log(x/m), defined as 0 at x = 0.
fn xlogy_ratio(x: f64, m: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else {
        x * (x / m).ln()
    }
}

impl FromStr for Family {
    type Err = ApcError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        Family::ALL
            .into_iter()
            .find(|f| f.name() == key)
            .ok_or_else(|| SpecError::UnknownFamily(s.to_string()).into())
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DataFormat, RawRecord};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_parse_names() {
        for family in Family::ALL {
            assert_eq!(family.name().parse::<Family>().unwrap(), family);
        }
        assert!(matches!(
            "tweedie".parse::<Family>().unwrap_err(),
            ApcError::Spec(SpecError::UnknownFamily(_))
        ));
    }

    #[test]
    fn test_poisson_deviance_zero_count() {
        let d = Family::OdPoissonResponse.deviance(&array![0.0, 2.0], &array![1.0, 2.0], None);
        // 2·[0 - (0 - 1)] + 0
        assert_abs_diff_eq!(d, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_deviance_is_rss() {
        let d = Family::GaussianResponse.deviance(&array![1.0, 2.0, 4.0], &array![1.5, 2.0, 3.0], None);
        assert_abs_diff_eq!(d, 0.25 + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_binomial_deviance_weighted() {
        let y = array![0.5];
        let mu = array![0.5];
        let w = array![10.0];
        assert_abs_diff_eq!(
            Family::BinomialDoseResponse.deviance(&y, &mu, Some(&w)),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_working_data_log_normal_rates() {
        let records = vec![
            RawRecord::age_cohort(1.0, 1.0, 20.0).with_exposure(10.0),
            RawRecord::age_cohort(2.0, 1.0, 5.0).with_exposure(5.0),
        ];
        let table = ObservationTable::new(records, DataFormat::AC).unwrap();
        let data = Family::LogNormalRates.working_data(&table).unwrap();
        assert_abs_diff_eq!(data.y[0], 2.0_f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(data.y[1], 0.0, epsilon = 1e-12);
        assert!(data.offset.is_none());

        let dose = Family::PoissonDoseResponse.working_data(&table).unwrap();
        assert_abs_diff_eq!(dose.offset.unwrap()[0], 10.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_working_data_rejections() {
        let records = vec![RawRecord::age_cohort(1.0, 1.0, 0.0)];
        let table = ObservationTable::new(records, DataFormat::AC).unwrap();
        assert!(matches!(
            Family::LogNormalResponse.working_data(&table).unwrap_err(),
            ApcError::Spec(SpecError::UnsupportedData { record: 0, .. })
        ));
        assert!(Family::GaussianRates.working_data(&table).is_err());
        assert!(Family::PoissonResponse.working_data(&table).is_ok());

        let records = vec![RawRecord::age_cohort(1.0, 1.0, 12.0).with_exposure(10.0)];
        let table = ObservationTable::new(records, DataFormat::AC).unwrap();
        assert!(Family::BinomialDoseResponse.working_data(&table).is_err());
    }

    #[test]
    fn test_initial_mu_is_valid() {
        let y = array![0.0, 3.0];
        let mu = Family::PoissonResponse.initialize_mu(&y, None);
        assert!(mu.iter().all(|&m| m > 0.0));

        let p = array![0.0, 1.0];
        let w = array![4.0, 4.0];
        let mu = Family::BinomialDoseResponse.initialize_mu(&p, Some(&w));
        assert_abs_diff_eq!(mu[0], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(mu[1], 0.9, epsilon = 1e-12);
    }
}
