// =============================================================================
// Design Matrix Builder
// =============================================================================
//
// Each requested time scale enters the linear predictor as a categorical
// factor, encoded with indicator (dummy) columns, alongside an intercept:
//
//     η = level + Σ_a α_a·1{age=a} + Σ_p β_p·1{period=p} + Σ_c γ_c·1{cohort=c}
//
// THE IDENTIFICATION PROBLEM
// --------------------------
// A factor with k levels plus an intercept has one redundant column, so the
// lowest level of every factor is dropped (it becomes the reference level).
//
// With all three scales there is a second, structural redundancy: since
// period = age + cohort - 1 + const, a linear trend in period is exactly the
// sum of linear trends in age and cohort. Any two period levels pin down that
// trend, so under APC the two lowest period levels are dropped.
//
// The convention depends only on the predictor and the index ranges. Every
// fit of a comparison (full model and sub-models) goes through this same
// function, so deviances and degrees of freedom are computed on the same
// parameterization.
//
// Column order: level, age_*, period_*, cohort_*.
//
// =============================================================================

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;

use crate::error::{ApcError, Result, ShapeError, SpecError};
use crate::index::{IndexRange, IndexRanges, Observation, ObservationTable, TimeScale};

// =============================================================================
// Predictor specification
// =============================================================================

/// Non-empty subset of {Age, Period, Cohort} entering the model as factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PredictorSpec {
    age: bool,
    period: bool,
    cohort: bool,
}

impl PredictorSpec {
    pub const APC: PredictorSpec = PredictorSpec::from_flags(true, true, true);
    pub const AP: PredictorSpec = PredictorSpec::from_flags(true, true, false);
    pub const AC: PredictorSpec = PredictorSpec::from_flags(true, false, true);
    pub const PC: PredictorSpec = PredictorSpec::from_flags(false, true, true);
    pub const A: PredictorSpec = PredictorSpec::from_flags(true, false, false);
    pub const P: PredictorSpec = PredictorSpec::from_flags(false, true, false);
    pub const C: PredictorSpec = PredictorSpec::from_flags(false, false, true);

    const fn from_flags(age: bool, period: bool, cohort: bool) -> Self {
        Self { age, period, cohort }
    }

    /// Build from a list of scales. Duplicates are ignored; empty is an error.
    pub fn new(scales: &[TimeScale]) -> Result<Self> {
        let spec = Self::from_flags(
            scales.contains(&TimeScale::Age),
            scales.contains(&TimeScale::Period),
            scales.contains(&TimeScale::Cohort),
        );
        if spec.scales().is_empty() {
            return Err(SpecError::InvalidPredictor(String::new()).into());
        }
        Ok(spec)
    }

    pub fn includes(&self, scale: TimeScale) -> bool {
        match scale {
            TimeScale::Age => self.age,
            TimeScale::Period => self.period,
            TimeScale::Cohort => self.cohort,
        }
    }

    /// Requested scales in column order.
    pub fn scales(&self) -> Vec<TimeScale> {
        TimeScale::ALL
            .into_iter()
            .filter(|s| self.includes(*s))
            .collect()
    }

    /// Canonical label such as "AC" or "APC".
    pub fn label(&self) -> String {
        self.scales().iter().map(|s| s.code()).collect()
    }
}

impl FromStr for PredictorSpec {
    type Err = ApcError;

    /// Accepts any ordering and case of A, P, C without repeats ("ca", "APC").
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ApcError::from(SpecError::InvalidPredictor(s.to_string()));
        let mut scales = Vec::new();
        for ch in s.trim().chars() {
            let scale = match ch.to_ascii_uppercase() {
                'A' => TimeScale::Age,
                'P' => TimeScale::Period,
                'C' => TimeScale::Cohort,
                _ => return Err(invalid()),
            };
            if scales.contains(&scale) {
                return Err(invalid());
            }
            scales.push(scale);
        }
        Self::new(&scales).map_err(|_| invalid())
    }
}

impl fmt::Display for PredictorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// =============================================================================
// Layout: which levels get a column
// =============================================================================

/// Indicator columns contributed by one time scale.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorBlock {
    pub scale: TimeScale,
    pub range: IndexRange,
    /// Levels absorbed by the intercept and, under APC, by the trends.
    pub dropped: usize,
}

impl FactorBlock {
    pub fn n_columns(&self) -> usize {
        self.range.len() - self.dropped
    }

    /// Levels that own a column, ascending.
    pub fn kept_levels(&self) -> impl Iterator<Item = i64> + '_ {
        self.range.levels().skip(self.dropped)
    }

    /// Column offset inside the block for `level`; `None` for dropped levels
    /// and for levels outside the block's range.
    fn column_of(&self, level: i64) -> Option<usize> {
        if !self.range.contains(level) {
            return None;
        }
        let pos = usize::try_from(level.checked_sub(self.range.from)?).ok()?;
        pos.checked_sub(self.dropped)
    }
}

/// The identification convention applied to one set of index ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignLayout {
    pub predictor: PredictorSpec,
    pub ranges: IndexRanges,
    pub blocks: Vec<FactorBlock>,
}

impl DesignLayout {
    /// Apply the identification convention to `ranges`.
    pub fn new(ranges: &IndexRanges, predictor: PredictorSpec) -> Result<Self> {
        let full_apc = predictor == PredictorSpec::APC;
        let mut blocks = Vec::new();

        for scale in predictor.scales() {
            let range = ranges.get(scale);
            let dropped = if full_apc && scale == TimeScale::Period { 2 } else { 1 };
            let required = dropped + 1;
            if range.len() < required {
                return Err(SpecError::TooFewLevels {
                    predictor: predictor.label(),
                    scale,
                    range,
                    levels: range.len(),
                    required,
                }
                .into());
            }
            blocks.push(FactorBlock {
                scale,
                range,
                dropped,
            });
        }

        Ok(Self {
            predictor,
            ranges: *ranges,
            blocks,
        })
    }

    pub fn n_columns(&self) -> usize {
        1 + self.blocks.iter().map(FactorBlock::n_columns).sum::<usize>()
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec!["level".to_string()];
        for block in &self.blocks {
            names.extend(
                block
                    .kept_levels()
                    .map(|level| format!("{}_{}", block.scale.name(), level)),
            );
        }
        names
    }

    /// Encode `observations` into a dense design matrix.
    pub fn build(&self, observations: &[Observation]) -> Result<DesignMatrix> {
        let n = observations.len();
        let p = self.n_columns();
        if n < p {
            return Err(SpecError::OverParameterized {
                predictor: self.predictor.label(),
                rows: n,
                columns: p,
            }
            .into());
        }

        let mut matrix = Array2::zeros((n, p));
        for (i, obs) in observations.iter().enumerate() {
            for scale in TimeScale::ALL {
                let range = self.ranges.get(scale);
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
            matrix[[i, 0]] = 1.0;
            let mut offset = 1;
            for block in &self.blocks {
                if let Some(col) = block.column_of(obs.index(block.scale)) {
                    matrix[[i, offset + col]] = 1.0;
                }
                offset += block.n_columns();
            }
        }

        Ok(DesignMatrix {
            matrix,
            names: self.column_names(),
        })
    }
}

/// Dense design matrix with column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    pub matrix: Array2<f64>,
    pub names: Vec<String>,
}

/// Layout and matrix for a whole table.
pub fn build_design(
    table: &ObservationTable,
    predictor: PredictorSpec,
) -> Result<(DesignLayout, DesignMatrix)> {
    let layout = DesignLayout::new(table.ranges(), predictor)?;
    let design = layout.build(table.observations())?;
    Ok((layout, design))
}

// =============================================================================
// Tests
// =============================================================================
