//! # Stage: Distribution Engine
//!
//! ## Responsibility
//! Sampling primitives behind the Thompson-sampling selector: a Box–Muller
//! standard normal, a Marsaglia–Tsang Gamma sampler, and a Beta sampler built
//! from two Gamma draws.
//!
//! ## Guarantees
//! - Reproducible: every sampler takes the random source as an explicit
//!   `&mut R: Rng`, so a seeded `StdRng` gives a deterministic stream
//! - Never returns NaN: uniforms are drawn from the open interval (0, 1) and
//!   Gamma draws are carried in log space, so Gamma stays positive and Beta
//!   never divides 0 by 0 for tiny shapes
//! - Terminates: the Gamma rejection loop accepts with probability > 0.95 per
//!   iteration for every shape >= 1
//!
//! ## NOT Responsible For
//! - Choosing which pattern wins (that is the selector)
//! - Owning the random source (the optimizer holds it)

use rand::distributions::{Distribution, Open01};
use rand::Rng;

use crate::error::{OptimizerError, Result};

// ---------------------------------------------------------------------------
// Normal
// ---------------------------------------------------------------------------

/// One standard-normal draw via the Box–Muller transform.
///
/// Only the cosine variate is returned; the sine companion is dropped.
pub fn normal_sample<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = Open01.sample(rng);
    let u2: f64 = Open01.sample(rng);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

// ---------------------------------------------------------------------------
// Gamma
// ---------------------------------------------------------------------------

/// Draw from Gamma(shape, 1).
///
/// Returns [`OptimizerError::InvalidShape`] unless `shape` is finite and > 0.
pub fn gamma_sample<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> Result<f64> {
    check_shape(shape)?;
    Ok(gamma_unchecked(rng, shape))
}

fn check_shape(shape: f64) -> Result<()> {
    if shape.is_finite() && shape > 0.0 {
        Ok(())
    } else {
        Err(OptimizerError::InvalidShape(shape))
    }
}

fn gamma_unchecked<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> f64 {
    ln_gamma_unchecked(rng, shape).exp().max(f64::MIN_POSITIVE)
}

/// Natural log of a Gamma(shape, 1) draw. Finite for every shape > 0, even
/// where the draw itself underflows.
fn ln_gamma_unchecked<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        // Boost to shape + 1, then scale back down by U^(1/shape).
        let u: f64 = Open01.sample(rng);
        return ln_gamma_unchecked(rng, shape + 1.0) + u.ln() / shape;
    }

    // Marsaglia & Tsang (2000), squeeze-and-reject.
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let (x, v) = loop {
            let x = normal_sample(rng);
            let t = 1.0 + c * x;
            if t > 0.0 {
                break (x, t * t * t);
            }
        };
        let u: f64 = Open01.sample(rng);
        let x2 = x * x;
        if u < 1.0 - 0.0331 * x2 * x2 {
            return (d * v).ln();
        }
        if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
            return (d * v).ln();
        }
    }
}

// ---------------------------------------------------------------------------
// Beta
// ---------------------------------------------------------------------------

/// Draw from Beta(alpha, beta) as `X / (X + Y)` with X ~ Gamma(alpha), Y ~ Gamma(beta).
pub fn beta_sample<R: Rng + ?Sized>(rng: &mut R, alpha: f64, beta: f64) -> Result<f64> {
    check_shape(alpha)?;
    check_shape(beta)?;
    Ok(beta_unchecked(rng, alpha, beta))
}

fn beta_unchecked<R: Rng + ?Sized>(rng: &mut R, alpha: f64, beta: f64) -> f64 {
    // X / (X + Y) as a logistic of ln Y - ln X, so tiny draws never give 0/0.
    let lx = ln_gamma_unchecked(rng, alpha);
    let ly = ln_gamma_unchecked(rng, beta);
    if lx >= ly {
        1.0 / (1.0 + (ly - lx).exp())
    } else {
        let r = (lx - ly).exp();
        r / (1.0 + r)
    }
}

/// Beta–Bernoulli posterior under a uniform Beta(1, 1) prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaPosterior {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaPosterior {
    /// Posterior after `successes` and `failures` observations.
    pub fn from_counts(successes: u64, failures: u64) -> Self {
        Self {
            alpha: successes as f64 + 1.0,
            beta: failures as f64 + 1.0,
        }
    }

    /// `alpha / (alpha + beta)`.
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// One Thompson draw. Both parameters are >= 1 by construction.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        beta_unchecked(rng, self.alpha, self.beta)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
