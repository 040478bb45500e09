// =============================================================================
// Error Types
// =============================================================================
//
// Every fallible operation in the crate returns `Result<T>`, an alias for
// `std::result::Result<T, ApcError>`.
//
// The taxonomy mirrors the stages of the pipeline:
//
//   index table   → ShapeError         (malformed or inconsistent indices)
//   design matrix → SpecError          (predictor/family incompatible with data)
//   IRLS          → SingularMatrix     (normal equations not invertible)
//                 → Convergence        (iteration bound exceeded)
//   sub_model     → RangeError         (bounds invalid or empty subset)
//   f_test        → IncompatibleModels (mismatched specs or overlapping data)
//
// Nothing is retried internally. A failed call returns no partial result.
//
// =============================================================================

use thiserror::Error;

use crate::index::{IndexRange, TimeScale};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ApcError>;

/// Top-level error for all APC operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApcError {
    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("specification error: {0}")]
    Spec(#[from] SpecError),

    #[error("singular normal equations: {context}")]
    SingularMatrix { context: String },

    #[error(
        "IRLS for {family} did not converge after {iterations} iterations \
         (last relative deviance change {rel_change:.3e})"
    )]
    Convergence {
        family: String,
        iterations: usize,
        rel_change: f64,
    },

    #[error("range error: {0}")]
    Range(#[from] RangeError),

    #[error("incompatible models: {0}")]
    IncompatibleModels(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

// =============================================================================
// Index table errors
// =============================================================================

/// Problems detected while validating an observation table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("observation table is empty")]
    Empty,

    #[error("record {record}: {scale} index is required by data format {format}")]
    MissingIndex {
        record: usize,
        scale: TimeScale,
        format: String,
    },

    #[error("record {record}: {scale} index {value} is not a finite integer")]
    NonIntegerIndex {
        record: usize,
        scale: TimeScale,
        value: f64,
    },

    #[error(
        "record {record}: indices age={age}, period={period}, cohort={cohort} violate \
         period = age + cohort - 1 + {time_adjust}"
    )]
    InconsistentIndices {
        record: usize,
        age: i64,
        period: i64,
        cohort: i64,
        time_adjust: i64,
    },

    #[error("record {record}: {what}")]
    InvalidValue { record: usize, what: String },

    #[error("record {record}: {scale} index {value} lies outside declared range {range}")]
    OutOfRange {
        record: usize,
        scale: TimeScale,
        value: i64,
        range: IndexRange,
    },

    #[error(
        "records {first} and {second} share (age={age}, period={period}, cohort={cohort}) \
         with conflicting values"
    )]
    Collision {
        first: usize,
        second: usize,
        age: i64,
        period: i64,
        cohort: i64,
    },

    #[error("{scale} level {level} inside observed range {range} has no observations")]
    MissingLevel {
        scale: TimeScale,
        level: i64,
        range: IndexRange,
    },
}

// =============================================================================
// Specification errors
// =============================================================================

/// A predictor or family request that the data cannot support.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("cannot parse predictor '{0}': expected a non-empty combination of A, P and C")]
    InvalidPredictor(String),

    #[error("unknown family '{0}'")]
    UnknownFamily(String),

    #[error(
        "predictor {predictor} needs at least {required} {scale} levels but range {range} \
         has {levels}"
    )]
    TooFewLevels {
        predictor: String,
        scale: TimeScale,
        range: IndexRange,
        levels: usize,
        required: usize,
    },

    #[error(
        "predictor {predictor} is over-parameterized: {columns} columns for {rows} observations"
    )]
    OverParameterized {
        predictor: String,
        rows: usize,
        columns: usize,
    },

    #[error("family {family} cannot use record {record}: {reason}")]
    UnsupportedData {
        family: String,
        record: usize,
        reason: String,
    },
}

// =============================================================================
// Sub-model range errors
// =============================================================================

/// An invalid restriction passed to `sub_model`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeError {
    #[error("{scale} bounds ({from}, {to}) are inverted")]
    Inverted { scale: TimeScale, from: i64, to: i64 },

    #[error("{scale} bounds ({from}, {to}) lie outside the model's {scale} range {range}")]
    OutsideRange {
        scale: TimeScale,
        from: i64,
        to: i64,
        range: IndexRange,
    },

    #[error("{scale} bounds ({from}, {to}) select no observations")]
    EmptySubset { scale: TimeScale, from: i64, to: i64 },
}
