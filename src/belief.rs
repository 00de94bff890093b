//! Belief: a Laplace-smoothed success rate.
//!
//! Every thought and every rule carries a [`Belief`]. Rules use it to break
//! ties between matching candidates; thoughts use it as their default
//! sampling weight.

use serde::{Deserialize, Serialize};

/// Accumulated positive and negative evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Counts")]
pub struct Belief {
    pub pos: f64,
    pub neg: f64,
}

/// Wire form of [`Belief`]; loaded counts are clamped like [`Belief::new`].
#[derive(Deserialize)]
struct Counts {
    pos: f64,
    neg: f64,
}

impl From<Counts> for Belief {
    fn from(c: Counts) -> Self {
        Belief::new(c.pos, c.neg)
    }
}

impl Belief {
    /// Create a belief from evidence counts. Negative or non-finite counts
    /// clamp to zero.
    pub fn new(pos: f64, neg: f64) -> Self {
        let clamp = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            pos: clamp(pos),
            neg: clamp(neg),
        }
    }

    /// Smoothed success rate `(pos + 1) / (pos + neg + 2)`, always in (0, 1).
    pub fn score(&self) -> f64 {
        (self.pos + 1.0) / (self.pos + self.neg + 2.0)
    }

    /// Record one outcome.
    pub fn update(&mut self, success: bool) {
        if success {
            self.pos += 1.0;
        } else {
            self.neg += 1.0;
        }
    }
}

impl Default for Belief {
    fn default() -> Self {
        Self { pos: 1.0, neg: 1.0 }
    }
}

impl std::fmt::Display for Belief {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} (+{} / -{})", self.score(), self.pos, self.neg)
    }
}
