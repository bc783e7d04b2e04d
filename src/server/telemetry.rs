//! `metrics`-crate backed [`AuctionMetrics`] and the Prometheus recorder.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::cents::Cents;
use crate::observe::{AuctionMetrics, AuctionOutcome, set_auction_metrics};

pub struct PrometheusAuctionMetrics;

impl AuctionMetrics for PrometheusAuctionMetrics {
    fn record_auction(&self, latency: Duration, candidates: usize, outcome: AuctionOutcome) {
        metrics::counter!("adbot_auctions_total", "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!("adbot_auction_duration_seconds").record(latency.as_secs_f64());
        metrics::histogram!("adbot_auction_candidates").record(candidates as f64);
    }

    fn record_billing(&self, latency: Duration, price: Cents, impressions: u64, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!("adbot_billings_total", "status" => status).increment(1);
        metrics::histogram!("adbot_billing_duration_seconds").record(latency.as_secs_f64());
        if ok {
            metrics::counter!("adbot_billed_cents_total").increment(price.get().max(0) as u64);
            metrics::counter!("adbot_impressions_total").increment(impressions);
        }
    }
}

/// Install the global Prometheus recorder and the auction observer.
///
/// Fails if another `metrics` recorder is already installed.
pub fn install() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    set_auction_metrics(Some(Arc::new(PrometheusAuctionMetrics)));
    Ok(handle)
}
