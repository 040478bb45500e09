//! Shared fixtures for the integration tests: two paid-claims run-off
//! triangles in long `CL` format (cohort = accident year, age = development
//! year, period = calendar year).

#![allow(dead_code)]

use apc_core::{DataFormat, ObservationTable, RawRecord, TableConfig};

/// 10 × 10 paid triangle, accident years 1..10, listed by accident year.
pub const VNJ_PAID: [f64; 55] = [
    451288.0, 339519.0, 333371.0, 144988.0, 93243.0, 45511.0, 25217.0, 20406.0, 31482.0, 1729.0,
    448627.0, 512882.0, 168467.0, 130674.0, 56044.0, 33397.0, 56071.0, 26522.0, 14346.0,
    693574.0, 497737.0, 202272.0, 120753.0, 125046.0, 37154.0, 27608.0, 17864.0,
    652043.0, 546406.0, 244474.0, 200896.0, 106802.0, 106753.0, 63688.0,
    566082.0, 503970.0, 217838.0, 145181.0, 165519.0, 91313.0,
    606606.0, 562543.0, 227374.0, 153551.0, 132743.0,
    536976.0, 472525.0, 154205.0, 150564.0,
    554833.0, 590880.0, 300964.0,
    537238.0, 701111.0,
    684944.0,
];

/// 11 × 11 paid triangle, accident years 1977..1987, listed by accident year.
pub const BZ_PAID: [f64; 66] = [
    153638.0, 188412.0, 134534.0, 87456.0, 60348.0, 42404.0, 31238.0, 21252.0, 16622.0, 14440.0,
    12200.0,
    178536.0, 226412.0, 158894.0, 104686.0, 71448.0, 47990.0, 35576.0, 24818.0, 22662.0, 18000.0,
    210172.0, 259168.0, 188388.0, 123074.0, 83380.0, 56086.0, 38496.0, 33768.0, 27400.0,
    211448.0, 253482.0, 183370.0, 131040.0, 78994.0, 60232.0, 45568.0, 38000.0,
    219810.0, 266304.0, 194650.0, 120098.0, 87582.0, 62750.0, 51000.0,
    205654.0, 252746.0, 177506.0, 129522.0, 96786.0, 82400.0,
    197716.0, 255408.0, 194648.0, 142328.0, 105600.0,
    239784.0, 329242.0, 264802.0, 190400.0,
    326304.0, 471744.0, 375400.0,
    420778.0, 590400.0,
    496200.0,
];

/// Unroll a triangle listed row by row (one row per cohort, development ages
/// 1..=k-row) into `CL` records.
pub fn triangle_records(values: &[f64], k: i64, first_cohort: i64) -> Vec<RawRecord> {
    let mut records = Vec::with_capacity(values.len());
    let mut next = values.iter();
    for row in 0..k {
        for age in 1..=(k - row) {
            let response = *next.next().expect("triangle has too few values");
            records.push(RawRecord::age_cohort(
                age as f64,
                (first_cohort + row) as f64,
                response,
            ));
        }
    }
    assert!(next.next().is_none(), "triangle has too many values");
    records
}

pub fn vnj_table() -> ObservationTable {
    ObservationTable::new(triangle_records(&VNJ_PAID, 10, 1), DataFormat::CL).unwrap()
}

pub fn bz_table() -> ObservationTable {
    ObservationTable::new(triangle_records(&BZ_PAID, 11, 1977), DataFormat::CL).unwrap()
}

/// BZ triangle with an explicit base offset in the time identity.
pub fn bz_table_with_time_adjust(time_adjust: i64) -> ObservationTable {
    let config = TableConfig {
        time_adjust: Some(time_adjust),
        ..TableConfig::default()
    };
    ObservationTable::with_config(triangle_records(&BZ_PAID, 11, 1977), DataFormat::CL, config)
        .unwrap()
}
