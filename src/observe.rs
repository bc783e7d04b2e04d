//! Process-wide observer for auction and billing events.
//!
//! The library never talks to a metrics backend itself. Callers install an
//! [`AuctionMetrics`] implementation with [`set_auction_metrics`]; the HTTP
//! server installs one backed by the `metrics` crate.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use crate::cents::Cents;

/// How an auction ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuctionOutcome {
    Sold,
    NoCandidates,
    Failed,
}

impl AuctionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AuctionOutcome::Sold => "sold",
            AuctionOutcome::NoCandidates => "no_candidates",
            AuctionOutcome::Failed => "failed",
        }
    }
}

pub trait AuctionMetrics: Send + Sync {
    fn record_auction(&self, latency: Duration, candidates: usize, outcome: AuctionOutcome);
    fn record_billing(&self, latency: Duration, price: Cents, impressions: u64, ok: bool);
}

/// Install or clear the global auction metrics recorder.
pub fn set_auction_metrics(recorder: Option<Arc<dyn AuctionMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn AuctionMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn AuctionMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn recorder() -> Option<Arc<dyn AuctionMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}
