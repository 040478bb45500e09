// =============================================================================
// GLM Solvers
// =============================================================================
//
// Algorithms for fitting Generalized Linear Models:
//
//     g(E[Y]) = Xβ + offset
//
// where:
//   - Y is the regressed quantity produced by the family
//   - X is the APC design matrix (intercept + factor indicators)
//   - β is the coefficient vector (what we're solving for)
//   - g is the family's link function
//
// Unlike ordinary least squares we can't solve this directly because:
//   1. The link function g() makes it non-linear
//   2. The variance depends on μ (heteroscedasticity)
//
// IRLS handles both by iteratively:
//   1. Linearizing the problem around current estimates
//   2. Solving a weighted least squares problem
//   3. Updating estimates and repeating until convergence
//
// =============================================================================

mod irls;

pub use irls::{fit_glm, fit_glm_full, IRLSConfig, IRLSResult};
