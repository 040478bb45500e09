// =============================================================================
// Numerical Constants
// =============================================================================
//
// Bounds and tolerances shared by the families, the IRLS solver and the
// linear algebra helpers. Kept in one place so that every fit in a model
// comparison runs under identical numerical settings.
//
// =============================================================================

/// Smallest fitted mean allowed for log-link count families.
pub const MU_MIN_POSITIVE: f64 = 1e-10;

/// Fitted probabilities for the binomial family are kept inside
/// [MU_MIN_PROBABILITY, MU_MAX_PROBABILITY].
pub const MU_MIN_PROBABILITY: f64 = 1e-10;
pub const MU_MAX_PROBABILITY: f64 = 1.0 - 1e-10;

/// Shift added to count responses when starting IRLS so that log(μ⁰) is finite.
pub const POISSON_START_SHIFT: f64 = 0.1;

/// Upper clip on IRLS working weights.
pub const MAX_WEIGHT: f64 = 1e10;

/// Relative singular-value threshold used to decide the column rank of X.
pub const RANK_TOLERANCE: f64 = 1e-9;

/// Deviances below this are treated as zero when forming relative changes.
pub const DEVIANCE_FLOOR: f64 = 1e-10;
