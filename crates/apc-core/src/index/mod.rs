// =============================================================================
// Index System
// =============================================================================
//
// Every observation in an APC analysis sits on three time scales:
//
//     age     - time since entry (development year, age at diagnosis, ...)
//     cohort  - time of entry (accident year, birth year, ...)
//     period  - calendar time of the observation
//
// Only two of them are free. With the base offset `time_adjust`:
//
//     period = age + cohort - 1 + time_adjust
//
// This module turns the records handed over by ingestion into an immutable
// `ObservationTable`: it derives the missing scale, validates the labels,
// records the observed extent of each scale (`IndexRanges`) and classifies
// the layout of the data in the age-cohort plane (`ShapeClass`).
//
// =============================================================================

mod shape;
mod table;

pub use shape::{classify_shape, ShapeClass};
pub use table::{DataFormat, Observation, ObservationTable, RawRecord, TableConfig};

use std::fmt;

// =============================================================================
// Time scales
// =============================================================================

/// One of the three APC time scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeScale {
    Age,
    Period,
    Cohort,
}

impl TimeScale {
    /// All scales in design-matrix column order.
    pub const ALL: [TimeScale; 3] = [TimeScale::Age, TimeScale::Period, TimeScale::Cohort];

    /// Single-letter code used in predictor labels ("A", "P", "C").
    pub fn code(self) -> char {
        match self {
            TimeScale::Age => 'A',
            TimeScale::Period => 'P',
            TimeScale::Cohort => 'C',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeScale::Age => "age",
            TimeScale::Period => "period",
            TimeScale::Cohort => "cohort",
        }
    }
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Ranges
// =============================================================================

/// Closed integer interval `[from, to]` of index labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRange {
    pub from: i64,
    pub to: i64,
}

impl IndexRange {
    /// Build a range; the endpoints are reordered if given backwards.
    pub fn new(from: i64, to: i64) -> Self {
        Self {
            from: from.min(to),
            to: from.max(to),
        }
    }

    /// Number of integer levels in the range.
    pub fn len(&self) -> usize {
        usize::try_from(self.to.abs_diff(self.from))
            .unwrap_or(usize::MAX)
            .saturating_add(1)
    }

    /// A range always holds at least one level.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, value: i64) -> bool {
        self.from <= value && value <= self.to
    }

    /// Intersection with `[from, to]`, or `None` when they do not overlap.
    pub fn intersect(&self, from: i64, to: i64) -> Option<IndexRange> {
        let lo = self.from.max(from);
        let hi = self.to.min(to);
        (lo <= hi).then_some(IndexRange { from: lo, to: hi })
    }

    /// Iterate over the levels in ascending order.
    pub fn levels(&self) -> impl Iterator<Item = i64> {
        self.from..=self.to
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Observed extent of the data on each time scale.
///
/// Every level inside each range is observed at least once, so the ranges
/// double as the factor levels of the design matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRanges {
    pub age: IndexRange,
    pub period: IndexRange,
    pub cohort: IndexRange,
}

impl IndexRanges {
    pub fn get(&self, scale: TimeScale) -> IndexRange {
        match scale {
            TimeScale::Age => self.age,
            TimeScale::Period => self.period,
            TimeScale::Cohort => self.cohort,
        }
    }
}

impl fmt::Display for IndexRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "age {}, period {}, cohort {}",
            self.age, self.period, self.cohort
        )
    }
}
