// =============================================================================
// Model Comparison
// =============================================================================
//
// Tests comparing a model fitted on the whole table with models of the same
// family and predictor fitted on disjoint pieces of it:
//
//   - `f_test`: does letting the parameters differ between the pieces reduce
//     the residual sum of squares by more than chance?
//
//         F = ((RSS_full - RSS_r) / (df_full - df_r)) / (RSS_r / df_r)
//
//   - `bartlett_test`: do the pieces share a common dispersion?
//
// The residual sum of squares of a model is its deviance; for the Gaussian
// and log-normal families that is the ordinary RSS on the regressed scale.
//
// =============================================================================

use std::collections::{HashMap, HashSet};

use crate::error::{ApcError, Result};
use crate::index::Observation;
use crate::inference::{chi2_upper_tail, f_upper_tail};
use crate::model::ApcModel;

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FTestResult {
    /// F statistic, never negative.
    pub f_stat: f64,
    /// P(F(df_num, df_restricted) > f_stat), in [0, 1].
    pub p_value: f64,
    pub df_num: usize,
    pub df_restricted: usize,
    pub rss_full: f64,
    pub rss_restricted: f64,
    /// Observations of the full model no sub-model covers.
    pub uncovered: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BartlettResult {
    /// LR / correction
    pub b_stat: f64,
    pub lr_stat: f64,
    pub correction: f64,
    /// Number of sub-models compared.
    pub m: usize,
    pub p_value: f64,
}

// =============================================================================
// F-test
// =============================================================================

/// Nested F-test of `full` against the union of `subs`.
///
/// The sub-models must share the full model's family and predictor, contain
/// only observations of the full model, and be pairwise disjoint. Their
/// order does not matter.
pub fn f_test(full: &ApcModel, subs: &[ApcModel]) -> Result<FTestResult> {
    if subs.is_empty() {
        return Err(ApcError::IncompatibleModels(
            "no sub-models to compare against".to_string(),
        ));
    }
    for (i, sub) in subs.iter().enumerate() {
        check_same_spec(full, sub, i)?;
    }
    let uncovered = check_partition(full, subs)?;
    if uncovered > 0 {
        log::warn!(
            "{} of {} observations are not covered by any sub-model",
            uncovered,
            full.table().len()
        );
    }

    let ordered = canonical_order(subs);
    let rss_restricted: f64 = ordered.iter().map(|m| m.deviance()).sum();
    let df_restricted: usize = ordered.iter().map(|m| m.df_resid()).sum();
    let rss_full = full.deviance();
    let df_full = full.df_resid();

    if df_restricted == 0 {
        return Err(ApcError::IncompatibleModels(
            "sub-models leave no residual degrees of freedom".to_string(),
        ));
    }
    if df_full <= df_restricted {
        return Err(ApcError::IncompatibleModels(format!(
            "full model has {} residual df, sub-models have {}: nothing to test",
            df_full, df_restricted
        )));
    }
    let df_num = df_full - df_restricted;

    let f_stat = if rss_restricted > 0.0 {
        (((rss_full - rss_restricted) / df_num as f64) / (rss_restricted / df_restricted as f64))
            .max(0.0)
    } else if rss_full > rss_restricted {
        f64::INFINITY
    } else {
        0.0
    };
    let p_value = f_upper_tail(f_stat, df_num as f64, df_restricted as f64);

    log::debug!(
        "F-test: F({}, {}) = {:.4}, p = {:.4}",
        df_num,
        df_restricted,
        f_stat,
        p_value
    );

    Ok(FTestResult {
        f_stat,
        p_value,
        df_num,
        df_restricted,
        rss_full,
        rss_restricted,
        uncovered,
    })
}

fn check_same_spec(reference: &ApcModel, sub: &ApcModel, index: usize) -> Result<()> {
    if sub.family() != reference.family() {
        return Err(ApcError::IncompatibleModels(format!(
            "sub-model {} uses family {}, expected {}",
            index,
            sub.family(),
            reference.family()
        )));
    }
    if sub.predictor() != reference.predictor() {
        return Err(ApcError::IncompatibleModels(format!(
            "sub-model {} uses predictor {}, expected {}",
            index,
            sub.predictor(),
            reference.predictor()
        )));
    }
    Ok(())
}

/// Checks containment and disjointness; returns the number of uncovered
/// observations of `full`.
fn check_partition(full: &ApcModel, subs: &[ApcModel]) -> Result<usize> {
    let cells: HashMap<(i64, i64, i64), &Observation> = full
        .table()
        .observations()
        .iter()
        .map(|obs| (obs.key(), obs))
        .collect();

    let mut seen: HashSet<(i64, i64, i64)> = HashSet::with_capacity(cells.len());
    for (i, sub) in subs.iter().enumerate() {
        for obs in sub.table().observations() {
            let key = obs.key();
            match cells.get(&key) {
                Some(cell) if cell.same_values(obs) => {}
                Some(_) => {
                    return Err(ApcError::IncompatibleModels(format!(
                        "sub-model {} has a different response or exposure at age {}, period {}, cohort {}",
                        i, key.0, key.1, key.2
                    )))
                }
                None => {
                    return Err(ApcError::IncompatibleModels(format!(
                        "sub-model {} contains age {}, period {}, cohort {} which the full model lacks",
                        i, key.0, key.1, key.2
                    )))
                }
            }
            if !seen.insert(key) {
                return Err(ApcError::IncompatibleModels(format!(
                    "sub-models overlap at age {}, period {}, cohort {}",
                    key.0, key.1, key.2
                )));
            }
        }
    }
    Ok(cells.len() - seen.len())
}

/// Sub-models sorted by the position of their data, so that floating-point
/// sums do not depend on the caller's ordering.
fn canonical_order(subs: &[ApcModel]) -> Vec<&ApcModel> {
    let mut ordered: Vec<&ApcModel> = subs.iter().collect();
    ordered.sort_by_key(|m| {
        let r = m.ranges();
        (r.period.from, r.cohort.from, r.age.from, r.period.to, r.cohort.to, r.age.to)
    });
    ordered
}

// =============================================================================
// Bartlett test
// =============================================================================

/// Bartlett's test for a common dispersion across `subs`.
///
/// Uses σ̂ᵢ² = Dᵢ / dfᵢ for each sub-model and the pooled estimate
/// σ̂² = ΣDᵢ / Σdfᵢ; the statistic is approximately χ²(m - 1) under equal
/// dispersion.
pub fn bartlett_test(subs: &[ApcModel]) -> Result<BartlettResult> {
    let m = subs.len();
    if m < 2 {
        return Err(ApcError::IncompatibleModels(format!(
            "Bartlett test needs at least two sub-models, got {}",
            m
        )));
    }
    for (i, sub) in subs.iter().enumerate().skip(1) {
        check_same_spec(&subs[0], sub, i)?;
    }

    let ordered = canonical_order(subs);
    let mut df_total = 0.0;
    let mut dev_total = 0.0;
    let mut weighted_log_var = 0.0;
    let mut inverse_df = 0.0;

    for (i, sub) in ordered.iter().enumerate() {
        let df = sub.df_resid() as f64;
        let dev = sub.deviance();
        if df <= 0.0 || dev <= 0.0 {
            return Err(ApcError::IncompatibleModels(format!(
                "sub-model {} has df {} and deviance {}; dispersion is not estimable",
                i, df, dev
            )));
        }
        df_total += df;
        dev_total += dev;
        weighted_log_var += df * (dev / df).ln();
        inverse_df += 1.0 / df;
    }

    let lr_stat = df_total * (dev_total / df_total).ln() - weighted_log_var;
    let correction = 1.0 + (inverse_df - 1.0 / df_total) / (3.0 * (m as f64 - 1.0));
    let b_stat = (lr_stat / correction).max(0.0);
    let p_value = chi2_upper_tail(b_stat, m as f64 - 1.0);

    Ok(BartlettResult {
        b_stat,
        lr_stat,
        correction,
        m,
        p_value,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::PredictorSpec;
    use crate::families::Family;
    use crate::index::{DataFormat, ObservationTable, RawRecord};
    use crate::model::SubRange;
    use approx::assert_abs_diff_eq;

    fn triangle(k: i64) -> ObservationTable {
        let mut records = Vec::new();
        for cohort in 1..=k {
            for age in 1..=(k - cohort + 1) {
                let eta = 5.0 - 0.25 * age as f64
                    + 0.1 * cohort as f64
                    + 0.1 * ((age * 5 + cohort * 11) as f64).cos();
                records.push(RawRecord::age_cohort(age as f64, cohort as f64, eta.exp().round()));
            }
        }
        ObservationTable::new(records, DataFormat::AC).unwrap()
    }

    fn full_and_halves() -> (ApcModel, Vec<ApcModel>) {
        let full = ApcModel::fit(triangle(8), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
        let subs = vec![
            full.sub_model(SubRange::Cohort(1, 4)).unwrap(),
            full.sub_model(SubRange::Cohort(5, 8)).unwrap(),
        ];
        (full, subs)
    }

    #[test]
    fn test_f_test_basic_properties() {
        let (full, subs) = full_and_halves();
        let result = f_test(&full, &subs).unwrap();
        assert!(result.rss_restricted <= result.rss_full + 1e-10);
        assert!(result.f_stat >= 0.0);
        assert!((0.0..=1.0).contains(&result.p_value));
        assert_eq!(result.uncovered, 0);
        assert_eq!(result.df_num + result.df_restricted, full.df_resid());
    }

    #[test]
    fn test_f_test_order_invariant() {
        let (full, subs) = full_and_halves();
        let reversed: Vec<ApcModel> = subs.iter().rev().cloned().collect();
        let a = f_test(&full, &subs).unwrap();
        let b = f_test(&full, &reversed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_f_test_reports_uncovered() {
        let full = ApcModel::fit(triangle(8), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
        let subs = vec![
            full.sub_model(SubRange::Cohort(1, 3)).unwrap(),
            full.sub_model(SubRange::Cohort(5, 7)).unwrap(),
        ];
        let result = f_test(&full, &subs).unwrap();
        // cohort 4 has 5 cells, cohort 8 has 1
        assert_eq!(result.uncovered, 6);
    }

    #[test]
    fn test_f_test_rejects_overlap() {
        let full = ApcModel::fit(triangle(8), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
        let subs = vec![
            full.sub_model(SubRange::Cohort(1, 5)).unwrap(),
            full.sub_model(SubRange::Cohort(4, 8)).unwrap(),
        ];
        let err = f_test(&full, &subs).unwrap_err();
        assert!(matches!(err, ApcError::IncompatibleModels(ref msg) if msg.contains("overlap")));
    }

    #[test]
    fn test_f_test_rejects_mismatched_spec() {
        let (full, mut subs) = full_and_halves();
        let table = subs[1].table().clone();
        subs[1] = ApcModel::fit(table, Family::GaussianResponse, PredictorSpec::AC).unwrap();
        assert!(matches!(
            f_test(&full, &subs).unwrap_err(),
            ApcError::IncompatibleModels(_)
        ));
        assert!(matches!(f_test(&full, &[]).unwrap_err(), ApcError::IncompatibleModels(_)));
    }

    #[test]
    fn test_f_test_rejects_foreign_observations() {
        let full = ApcModel::fit(triangle(8), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
        let other = ApcModel::fit(triangle(9), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
        let subs = vec![other.sub_model(SubRange::Cohort(6, 9)).unwrap()];
        assert!(matches!(
            f_test(&full, &subs).unwrap_err(),
            ApcError::IncompatibleModels(_)
        ));
    }

    #[test]
    fn test_f_test_rejects_different_exposure() {
        let with_exposure = |exposure: f64| {
            let records = triangle(8)
                .observations()
                .iter()
                .map(|o| {
                    RawRecord::age_cohort(o.age as f64, o.cohort as f64, o.response)
                        .with_exposure(exposure)
                })
                .collect();
            ObservationTable::new(records, DataFormat::AC).unwrap()
        };
        let full =
            ApcModel::fit(with_exposure(1.0), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
        let other =
            ApcModel::fit(with_exposure(2.0), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
        let subs = vec![
            full.sub_model(SubRange::Cohort(1, 4)).unwrap(),
            other.sub_model(SubRange::Cohort(5, 8)).unwrap(),
        ];
        let err = f_test(&full, &subs).unwrap_err();
        assert!(matches!(err, ApcError::IncompatibleModels(ref msg) if msg.contains("exposure")));
    }

    #[test]
    fn test_bartlett_properties() {
        let (_, subs) = full_and_halves();
        let result = bartlett_test(&subs).unwrap();
        assert_eq!(result.m, 2);
        assert!(result.correction > 1.0);
        assert!(result.lr_stat >= 0.0);
        assert_abs_diff_eq!(result.b_stat, result.lr_stat / result.correction, epsilon = 1e-12);
        assert!((0.0..=1.0).contains(&result.p_value));

        let reversed: Vec<ApcModel> = subs.iter().rev().cloned().collect();
        assert_eq!(bartlett_test(&reversed).unwrap(), result);
    }

    #[test]
    fn test_bartlett_needs_two_models() {
        let (_, subs) = full_and_halves();
        assert!(matches!(
            bartlett_test(&subs[..1]).unwrap_err(),
            ApcError::IncompatibleModels(_)
        ));
    }
}
