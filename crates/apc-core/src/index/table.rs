// =============================================================================
// Observation Table
// =============================================================================
//
// The long-format table the rest of the crate works on. Construction is the
// only place where indices are derived and validated; once built, a table is
// never mutated. Restriction produces a fresh, re-validated table.
//
// =============================================================================

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::error::{RangeError, Result, ShapeError};

use super::shape::{classify_shape, ShapeClass};
use super::{IndexRange, IndexRanges, TimeScale};

// =============================================================================
// Data format tag
// =============================================================================

/// Layout the source data was delivered in.
///
/// The core never parses these layouts; the tag only tells it which two
/// scales the records carry and which base offset applies by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {
    /// Age in rows, cohort in columns.
    AC,
    /// Age in rows, period in columns.
    AP,
    /// Cohort in rows, age in columns.
    CA,
    /// Chain-ladder run-off triangle: accident year in rows, development
    /// year in columns.
    CL,
    /// Cohort in rows, period in columns.
    CP,
    /// Period in rows, age in columns.
    PA,
    /// Period in rows, cohort in columns.
    PC,
    /// Generalized trapezoid in the age-cohort plane.
    Trapezoid,
}

impl DataFormat {
    /// The two scales every record must carry.
    pub fn supplied_scales(self) -> (TimeScale, TimeScale) {
        match self {
            DataFormat::AC | DataFormat::CA | DataFormat::CL | DataFormat::Trapezoid => {
                (TimeScale::Age, TimeScale::Cohort)
            }
            DataFormat::AP | DataFormat::PA => (TimeScale::Age, TimeScale::Period),
            DataFormat::CP | DataFormat::PC => (TimeScale::Period, TimeScale::Cohort),
        }
    }

    /// Base offset in `period = age + cohort - 1 + time_adjust`.
    ///
    /// Development year 1 of a run-off triangle is the calendar year after
    /// the accident year label, hence 1 for `CL`.
    pub fn default_time_adjust(self) -> i64 {
        match self {
            DataFormat::CL => 1,
            _ => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataFormat::AC => "AC",
            DataFormat::AP => "AP",
            DataFormat::CA => "CA",
            DataFormat::CL => "CL",
            DataFormat::CP => "CP",
            DataFormat::PA => "PA",
            DataFormat::PC => "PC",
            DataFormat::Trapezoid => "trapezoid",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Records
// =============================================================================

/// A row as delivered by the ingestion layer.
///
/// Labels are floats because tabular sources usually hold them that way;
/// they must nevertheless be integral.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawRecord {
    pub age: Option<f64>,
    pub period: Option<f64>,
    pub cohort: Option<f64>,
    pub response: f64,
    pub exposure: Option<f64>,
}

impl RawRecord {
    pub fn age_cohort(age: f64, cohort: f64, response: f64) -> Self {
        Self {
            age: Some(age),
            cohort: Some(cohort),
            response,
            ..Self::default()
        }
    }

    pub fn age_period(age: f64, period: f64, response: f64) -> Self {
        Self {
            age: Some(age),
            period: Some(period),
            response,
            ..Self::default()
        }
    }

    pub fn period_cohort(period: f64, cohort: f64, response: f64) -> Self {
        Self {
            period: Some(period),
            cohort: Some(cohort),
            response,
            ..Self::default()
        }
    }

    pub fn with_exposure(mut self, exposure: f64) -> Self {
        self.exposure = Some(exposure);
        self
    }

    fn label(&self, scale: TimeScale) -> Option<f64> {
        match scale {
            TimeScale::Age => self.age,
            TimeScale::Period => self.period,
            TimeScale::Cohort => self.cohort,
        }
    }
}

/// A validated observation with all three indices filled in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub age: i64,
    pub period: i64,
    pub cohort: i64,
    pub response: f64,
    pub exposure: Option<f64>,
}

impl Observation {
    pub fn index(&self, scale: TimeScale) -> i64 {
        match scale {
            TimeScale::Age => self.age,
            TimeScale::Period => self.period,
            TimeScale::Cohort => self.cohort,
        }
    }

    /// (age, period, cohort) position of the observation.
    pub fn key(&self) -> (i64, i64, i64) {
        (self.age, self.period, self.cohort)
    }

    /// Same response and exposure.
    pub(crate) fn same_values(&self, other: &Observation) -> bool {
        self.response == other.response && self.exposure == other.exposure
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Options for table construction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TableConfig {
    /// Overrides `DataFormat::default_time_adjust`.
    pub time_adjust: Option<i64>,

    /// Every observation must fall inside these ranges when given.
    pub declared_ranges: Option<IndexRanges>,
}

// =============================================================================
// Table
// =============================================================================

/// Immutable, validated long-format APC data.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    observations: Vec<Observation>,
    format: DataFormat,
    time_adjust: i64,
    ranges: IndexRanges,
    shape: ShapeClass,
}

impl ObservationTable {
    /// Validate `records` using the format's default base offset.
    pub fn new(records: Vec<RawRecord>, format: DataFormat) -> Result<Self> {
        Self::with_config(records, format, TableConfig::default())
    }

    /// Validate `records`, deriving the scale the format does not supply.
    pub fn with_config(
        records: Vec<RawRecord>,
        format: DataFormat,
        config: TableConfig,
    ) -> Result<Self> {
        let time_adjust = config
            .time_adjust
            .unwrap_or_else(|| format.default_time_adjust());
        let (first, second) = format.supplied_scales();

        let mut observations: Vec<Observation> = Vec::with_capacity(records.len());
        // position -> (record number, slot in `observations`)
        let mut seen: HashMap<(i64, i64, i64), (usize, usize)> = HashMap::new();

        for (i, rec) in records.iter().enumerate() {
            let obs = derive_observation(i, rec, format, first, second, time_adjust)?;

            if let Some(declared) = &config.declared_ranges {
                for scale in TimeScale::ALL {
                    let range = declared.get(scale);
                    let value = obs.index(scale);
                    if !range.contains(value) {
                        return Err(ShapeError::OutOfRange {
                            record: i,
                            scale,
                            value,
                            range,
                        }
                        .into());
                    }
                }
            }

            match seen.get(&obs.key()) {
                Some(&(record, slot)) => {
                    if !observations[slot].same_values(&obs) {
                        return Err(ShapeError::Collision {
                            first: record,
                            second: i,
                            age: obs.age,
                            period: obs.period,
                            cohort: obs.cohort,
                        }
                        .into());
                    }
                    log::debug!("dropping record {} duplicating record {}", i, record);
                }
                None => {
                    seen.insert(obs.key(), (i, observations.len()));
                    observations.push(obs);
                }
            }
        }

        Self::from_observations(observations, format, time_adjust)
    }

    /// Build from already-derived observations (used by restriction).
    fn from_observations(
        observations: Vec<Observation>,
        format: DataFormat,
        time_adjust: i64,
    ) -> Result<Self> {
        if observations.is_empty() {
            return Err(ShapeError::Empty.into());
        }

        let ranges = observed_ranges(&observations)?;
        let cells: HashSet<(i64, i64)> = observations.iter().map(|o| (o.age, o.cohort)).collect();
        let shape = classify_shape(&cells, &ranges);

        Ok(Self {
            observations,
            format,
            time_adjust,
            ranges,
            shape,
        })
    }

    /// Keep the observations whose `scale` index lies in `[from, to]`.
    ///
    /// Bounds that only partly overlap the table's range are clipped to it.
    pub fn restrict(&self, scale: TimeScale, from: i64, to: i64) -> Result<Self> {
        if from > to {
            return Err(RangeError::Inverted { scale, from, to }.into());
        }
        let range = self.ranges.get(scale);
        if range.intersect(from, to).is_none() {
            return Err(RangeError::OutsideRange {
                scale,
                from,
                to,
                range,
            }
            .into());
        }

        let kept: Vec<Observation> = self
            .observations
            .iter()
            .filter(|o| (from..=to).contains(&o.index(scale)))
            .copied()
            .collect();
        if kept.is_empty() {
            return Err(RangeError::EmptySubset { scale, from, to }.into());
        }

        Self::from_observations(kept, self.format, self.time_adjust)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    pub fn time_adjust(&self) -> i64 {
        self.time_adjust
    }

    pub fn ranges(&self) -> &IndexRanges {
        &self.ranges
    }

    pub fn shape(&self) -> ShapeClass {
        self.shape
    }

    /// Positions of all observations.
    pub fn keys(&self) -> HashSet<(i64, i64, i64)> {
        self.observations.iter().map(Observation::key).collect()
    }

    /// True when an observation with the same position and values exists.
    pub fn contains(&self, obs: &Observation) -> bool {
        self.observations
            .iter()
            .any(|o| o.key() == obs.key() && o.same_values(obs))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn derive_observation(
    record: usize,
    rec: &RawRecord,
    format: DataFormat,
    first: TimeScale,
    second: TimeScale,
    time_adjust: i64,
) -> Result<Observation> {
    if !rec.response.is_finite() {
        return Err(ShapeError::InvalidValue {
            record,
            what: format!("response {} is not finite", rec.response),
        }
        .into());
    }
    if let Some(e) = rec.exposure {
        if !e.is_finite() || e < 0.0 {
            return Err(ShapeError::InvalidValue {
                record,
                what: format!("exposure {} must be finite and non-negative", e),
            }
            .into());
        }
    }

    let a = required_label(record, rec, first, format)?;
    let b = required_label(record, rec, second, format)?;

    let shift = time_adjust.checked_sub(1);
    let derived_index = match (first, second) {
        (TimeScale::Age, TimeScale::Cohort) => a
            .checked_add(b)
            .and_then(|v| v.checked_add(shift?))
            .map(|period| (a, period, b)),
        (TimeScale::Age, TimeScale::Period) => b
            .checked_sub(a)
            .and_then(|v| v.checked_sub(shift?))
            .map(|cohort| (a, b, cohort)),
        // period + cohort
        _ => a
            .checked_sub(b)
            .and_then(|v| v.checked_sub(shift?))
            .map(|age| (age, a, b)),
    };
    let Some((age, period, cohort)) = derived_index else {
        return Err(ShapeError::InvalidValue {
            record,
            what: format!(
                "{} {} and {} {} overflow the derived index",
                first, a, second, b
            ),
        }
        .into());
    };
    let obs = Observation {
        age,
        period,
        cohort,
        response: rec.response,
        exposure: rec.exposure,
    };

    let derived = TimeScale::ALL
        .into_iter()
        .find(|s| *s != first && *s != second)
        .unwrap_or(TimeScale::Period);
    if let Some(raw) = rec.label(derived) {
        let given = to_integer(record, derived, raw)?;
        if given != obs.index(derived) {
            let mut shown = obs;
            match derived {
                TimeScale::Age => shown.age = given,
                TimeScale::Period => shown.period = given,
                TimeScale::Cohort => shown.cohort = given,
            }
            return Err(ShapeError::InconsistentIndices {
                record,
                age: shown.age,
                period: shown.period,
                cohort: shown.cohort,
                time_adjust,
            }
            .into());
        }
    }

    Ok(obs)
}

fn required_label(
    record: usize,
    rec: &RawRecord,
    scale: TimeScale,
    format: DataFormat,
) -> Result<i64> {
    let raw = rec.label(scale).ok_or_else(|| ShapeError::MissingIndex {
        record,
        scale,
        format: format.to_string(),
    })?;
    to_integer(record, scale, raw)
}

fn to_integer(record: usize, scale: TimeScale, value: f64) -> Result<i64> {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(ShapeError::NonIntegerIndex {
            record,
            scale,
            value,
        }
        .into());
    }
    Ok(value as i64)
}

/// Observed extent per scale; rejects internal gaps.
fn observed_ranges(observations: &[Observation]) -> Result<IndexRanges> {
    let mut ranges = Vec::with_capacity(3);
    for scale in TimeScale::ALL {
        let levels: BTreeSet<i64> = observations.iter().map(|o| o.index(scale)).collect();
        // non-empty: callers check for an empty table first
        let (lo, hi) = match (levels.first(), levels.last()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => return Err(ShapeError::Empty.into()),
        };
        let range = IndexRange::new(lo, hi);
        if let Some(level) = range.levels().find(|l| !levels.contains(l)) {
            return Err(ShapeError::MissingLevel {
                scale,
                level,
                range,
            }
            .into());
        }
        ranges.push(range);
    }
    Ok(IndexRanges {
        age: ranges[0],
        period: ranges[1],
        cohort: ranges[2],
    })
}

// =============================================================================
// Tests
// =============================================================================
