// =============================================================================
// APC Core Library
// =============================================================================
//
// Age-Period-Cohort generalized linear models on triangular and rectangular
// tables, with nested F-tests for structural change across sub-samples.
//
// STRUCTURE:
// ----------
// The library follows the fitting pipeline, one module per stage:
//
//   - index:       Long-format records → validated table with age, period
//                  and cohort on every observation
//   - design:      Predictor specification → dummy-coded design matrix
//   - families:    Response families (Gaussian, log-normal, Poisson, ...)
//   - links:       Link functions (Identity, Log, Logit)
//   - linalg:      ndarray ↔ nalgebra conversions, Cholesky, column rank
//   - solvers:     IRLS fitting
//   - diagnostics: Residuals, Pearson χ², dispersion
//   - inference:   P-values, confidence intervals, F and χ² tails
//   - model:       `ApcModel` container and sub-sample restriction
//   - comparison:  Nested F-test and Bartlett test
//   - error:       Error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//
// =============================================================================

pub mod comparison;
pub mod constants;
pub mod design;
pub mod diagnostics;
pub mod error;
pub mod families;
pub mod index;
pub mod inference;
pub mod linalg;
pub mod links;
pub mod model;
pub mod solvers;

// Re-export commonly used items at the top level
pub use comparison::{bartlett_test, f_test, BartlettResult, FTestResult};
pub use design::{build_design, DesignLayout, DesignMatrix, PredictorSpec};
pub use error::{ApcError, RangeError, Result, ShapeError, SpecError};
pub use families::Family;
pub use index::{
    DataFormat, IndexRange, IndexRanges, Observation, ObservationTable, RawRecord, ShapeClass,
    TableConfig, TimeScale,
};
pub use inference::CoefficientRow;
pub use links::Link;
pub use model::{ApcModel, FittedModel, ResidualKind, SubRange};
pub use solvers::{fit_glm, fit_glm_full, IRLSConfig, IRLSResult};
