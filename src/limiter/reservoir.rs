//! Reservoir Module
//!
//! Quota pool that depletes on admission and refills on a fixed interval.

use std::time::Duration;

use serde::Serialize;

// == Reservoir ==
/// Scalar quota modelling "N requests per window".
///
/// The level stays within `0..=ceiling`: takes never overdraw and refills
/// add then cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservoir {
    level: u64,
    ceiling: u64,
    refill_amount: u64,
    #[serde(skip)]
    refill_interval: Duration,
}

impl Reservoir {
    /// Creates a reservoir; `initial` is clamped to the ceiling.
    pub fn new(initial: u64, ceiling: u64, refill_amount: u64, refill_interval: Duration) -> Self {
        Self {
            level: initial.min(ceiling),
            ceiling,
            refill_amount,
            refill_interval,
        }
    }

    // == Try Take ==
    /// Debits `weight` if the current level covers it.
    pub fn try_take(&mut self, weight: u64) -> bool {
        if weight <= self.level {
            self.level -= weight;
            true
        } else {
            false
        }
    }

    /// Returns `weight` to the pool, capped at the ceiling.
    ///
    /// Only used when an admission is abandoned before the job ran.
    pub fn give_back(&mut self, weight: u64) {
        self.level = self.level.saturating_add(weight).min(self.ceiling);
    }

    // == Refill ==
    /// Adds one refill amount, capped at the ceiling, and returns the new level.
    pub fn refill(&mut self) -> u64 {
        self.level = self.level.saturating_add(self.refill_amount).min(self.ceiling);
        self.level
    }

    pub fn level(&self) -> u64 {
        self.level
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    pub fn is_depleted(&self) -> bool {
        self.level == 0
    }
}
