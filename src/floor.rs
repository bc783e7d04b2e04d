//! Minimum effective bid for a message.
//!
//! A [`FloorPolicy`] must never decrease as the audience grows and never
//! increase as the cooldown counter (messages since the last ad in the room)
//! grows.

use serde::{Deserialize, Serialize};

use crate::cents::Cents;

pub trait FloorPolicy: Send + Sync {
    fn min_bid(&self, audience: u64, cooldown: u64) -> Cents;
}

/// `per_viewer * audience * multiplier * (threshold - cooldown)` while
/// `cooldown < threshold`, zero afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearFloor {
    pub per_viewer_cents: i64,
    pub multiplier: i64,
    pub cooldown_threshold: u64,
}

impl Default for LinearFloor {
    fn default() -> Self {
        Self {
            per_viewer_cents: 10,
            multiplier: 10,
            cooldown_threshold: 20,
        }
    }
}

impl FloorPolicy for LinearFloor {
    fn min_bid(&self, audience: u64, cooldown: u64) -> Cents {
        if cooldown >= self.cooldown_threshold {
            return Cents::ZERO;
        }
        let remaining = i64::try_from(self.cooldown_threshold - cooldown).unwrap_or(i64::MAX);
        let audience = i64::try_from(audience).unwrap_or(i64::MAX);
        Cents(
            self.per_viewer_cents
                .saturating_mul(audience)
                .saturating_mul(self.multiplier)
                .saturating_mul(remaining),
        )
    }
}

impl<F> FloorPolicy for F
where
    F: Fn(u64, u64) -> Cents + Send + Sync,
{
    fn min_bid(&self, audience: u64, cooldown: u64) -> Cents {
        self(audience, cooldown)
    }
}
