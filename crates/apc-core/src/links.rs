// =============================================================================
// Link Functions
// =============================================================================
//
// A link g connects the mean μ to the linear predictor: η = g(μ) = Xβ.
//
//   Identity   η = μ                 Gaussian and log-normal families
//   Log        η = log(μ)            Poisson families (multiplicative effects)
//   Logit      η = log(μ / (1 - μ))  binomial family
//
// IRLS needs three things from a link: g, its inverse, and the derivative
// dη/dμ used in both the working response and the working weights.
//
// =============================================================================

use ndarray::Array1;

use crate::constants::{MU_MAX_PROBABILITY, MU_MIN_POSITIVE, MU_MIN_PROBABILITY};

/// Closed set of link functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    Identity,
    Log,
    Logit,
}

impl Link {
    pub fn name(&self) -> &'static str {
        match self {
            Link::Identity => "identity",
            Link::Log => "log",
            Link::Logit => "logit",
        }
    }

    /// η = g(μ)
    pub fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => mu.clone(),
            Link::Log => mu.mapv(|m| m.max(MU_MIN_POSITIVE).ln()),
            Link::Logit => mu.mapv(|m| {
                let m = m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                (m / (1.0 - m)).ln()
            }),
        }
    }

    /// μ = g⁻¹(η)
    pub fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => eta.clone(),
            Link::Log => eta.mapv(f64::exp),
            Link::Logit => eta.mapv(|e| 1.0 / (1.0 + (-e).exp())),
        }
    }

    /// dη/dμ = g'(μ)
    pub fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => Array1::ones(mu.len()),
            Link::Log => mu.mapv(|m| 1.0 / m.max(MU_MIN_POSITIVE)),
            Link::Logit => mu.mapv(|m| {
                let m = m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                1.0 / (m * (1.0 - m))
            }),
        }
    }
}
