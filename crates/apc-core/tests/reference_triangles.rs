//! End-to-end checks on two published paid-claims triangles: table
//! construction, APC fits, sub-sample restriction and the nested F-test.

mod common;

use apc_core::{
    bartlett_test, f_test, ApcError, ApcModel, Family, PredictorSpec, RangeError, ShapeClass,
    SpecError, SubRange, TimeScale,
};
use approx::assert_abs_diff_eq;
use common::{bz_table, bz_table_with_time_adjust, vnj_table};

#[test]
fn vnj_table_is_a_triangle() {
    let table = vnj_table();
    assert_eq!(table.len(), 55);
    assert_eq!(table.time_adjust(), 1);
    assert_eq!(table.shape(), ShapeClass::Triangle);
    assert_eq!((table.ranges().cohort.from, table.ranges().cohort.to), (1, 10));
    // period = age + cohort for accident-year data
    assert_eq!((table.ranges().period.from, table.ranges().period.to), (2, 11));
}

#[test]
fn vnj_log_normal_cohort_split() {
    let full = ApcModel::fit(vnj_table(), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
    assert_eq!(full.df_resid(), 36);

    let subs = vec![
        full.sub_model(SubRange::Cohort(1, 5)).unwrap(),
        full.sub_model(SubRange::Cohort(6, 10)).unwrap(),
    ];
    assert_eq!(subs[0].df_resid(), 26);
    assert_eq!(subs[1].df_resid(), 6);

    let result = f_test(&full, &subs).unwrap();
    assert_eq!(result.df_num, 4);
    assert_eq!(result.df_restricted, 32);
    assert_eq!(result.uncovered, 0);
    assert_abs_diff_eq!(result.rss_full, 2.7002, epsilon = 1e-3);
    assert_abs_diff_eq!(result.f_stat, 0.242, epsilon = 1e-3);
    assert_abs_diff_eq!(result.p_value, 0.912, epsilon = 1e-3);
}

#[test]
fn bz_over_dispersed_poisson_period_split() {
    let full = ApcModel::fit(bz_table(), Family::OdPoissonResponse, PredictorSpec::APC).unwrap();
    assert_eq!(full.df_resid(), 36);

    // calendar years run 1978..=1988; the first range is clipped
    let subs: Vec<ApcModel> = [(1977, 1981), (1982, 1984), (1985, 1987)]
        .iter()
        .map(|&(from, to)| full.sub_model(SubRange::Period(from, to)).unwrap())
        .collect();
    assert_eq!(subs[0].ranges().period.from, 1978);

    let result = f_test(&full, &subs).unwrap();
    assert_eq!(result.df_num, 24);
    assert_eq!(result.df_restricted, 12);
    // the 1988 calendar diagonal holds one cell per accident year and lies
    // outside every sub-model
    assert_eq!(result.uncovered, 11);
    assert_abs_diff_eq!(result.f_stat, 1.855, epsilon = 1e-3);
    assert_abs_diff_eq!(result.p_value, 0.133, epsilon = 1e-3);
}

#[test]
fn bz_period_split_without_time_adjust() {
    // calendar years 1977..=1987: the same bounds now tile the whole table
    let full = ApcModel::fit(
        bz_table_with_time_adjust(0),
        Family::OdPoissonResponse,
        PredictorSpec::APC,
    )
    .unwrap();
    assert_eq!((full.ranges().period.from, full.ranges().period.to), (1977, 1987));

    let subs: Vec<ApcModel> = [(1977, 1981), (1982, 1984), (1985, 1987)]
        .iter()
        .map(|&(from, to)| full.sub_model(SubRange::Period(from, to)).unwrap())
        .collect();
    let result = f_test(&full, &subs).unwrap();
    assert_eq!(result.uncovered, 0);
    assert_eq!(result.df_num, 20);
    assert_eq!(result.df_restricted, 16);
    assert_abs_diff_eq!(result.f_stat, 0.953, epsilon = 1e-3);
    assert_abs_diff_eq!(result.p_value, 0.547, epsilon = 1e-3);
}

#[test]
fn f_test_does_not_depend_on_sub_model_order() {
    let full = ApcModel::fit(bz_table(), Family::OdPoissonResponse, PredictorSpec::APC).unwrap();
    let mut subs: Vec<ApcModel> = [(1977, 1981), (1982, 1984), (1985, 1987)]
        .iter()
        .map(|&(from, to)| full.sub_model(SubRange::Period(from, to)).unwrap())
        .collect();
    let forward = f_test(&full, &subs).unwrap();
    subs.rotate_left(1);
    let rotated = f_test(&full, &subs).unwrap();
    assert_eq!(forward, rotated);
}

#[test]
fn bartlett_on_cohort_split() {
    let full = ApcModel::fit(vnj_table(), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
    let subs = vec![
        full.sub_model(SubRange::Cohort(1, 5)).unwrap(),
        full.sub_model(SubRange::Cohort(6, 10)).unwrap(),
    ];
    let result = bartlett_test(&subs).unwrap();
    assert_eq!(result.m, 2);
    let expected = 1.0 + (1.0 / 26.0 + 1.0 / 6.0 - 1.0 / 32.0) / 3.0;
    assert_abs_diff_eq!(result.correction, expected, epsilon = 1e-12);
    assert!((0.0..=1.0).contains(&result.p_value));
}

#[test]
fn full_range_restriction_reproduces_fit() {
    let full = ApcModel::fit(bz_table(), Family::OdPoissonResponse, PredictorSpec::APC).unwrap();
    let same = full.sub_model(SubRange::Age(1, 11)).unwrap();
    assert_abs_diff_eq!(same.deviance(), full.deviance(), epsilon = 1e-8);
    assert_eq!(same.df_resid(), full.df_resid());
    for (a, b) in same
        .fitted()
        .coefficients
        .iter()
        .zip(full.fitted().coefficients.iter())
    {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn chained_restrictions_combine() {
    let full = ApcModel::fit(vnj_table(), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
    let sub = full
        .sub_model(SubRange::Cohort(1, 6))
        .and_then(|m| m.sub_model(SubRange::Age(1, 6)))
        .unwrap();
    assert_eq!(sub.restrictions().len(), 2);
    assert!(sub
        .table()
        .observations()
        .iter()
        .all(|obs| obs.cohort <= 6 && obs.age <= 6));
}

#[test]
fn range_outside_data_is_rejected() {
    let full = ApcModel::fit(vnj_table(), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
    let err = full.sub_model(SubRange::Cohort(20, 30)).unwrap_err();
    assert!(matches!(err, ApcError::Range(RangeError::OutsideRange { .. })));
}

#[test]
fn single_level_is_rejected() {
    let full = ApcModel::fit(vnj_table(), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
    let err = full.sub_model(SubRange::Cohort(4, 4)).unwrap_err();
    assert!(matches!(
        err,
        ApcError::Spec(SpecError::TooFewLevels { scale: TimeScale::Cohort, .. })
    ));
}

#[test]
fn too_small_sub_model_is_rejected() {
    // the last two accident years hold three cells for three columns
    let full = ApcModel::fit(vnj_table(), Family::LogNormalResponse, PredictorSpec::AC).unwrap();
    let err = full.sub_model(SubRange::Cohort(9, 10)).unwrap_err();
    assert!(matches!(
        err,
        ApcError::Spec(SpecError::OverParameterized { .. }) | ApcError::SingularMatrix { .. }
    ));
}
