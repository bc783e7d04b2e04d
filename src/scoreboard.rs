//! Delivery counters and the advertiser ranking built from them.
//!
//! Every billing event bumps the winner's record and the global record kept
//! under [`SYSTEM`]. House spend is mirrored into `amount_spent_by_house` on
//! both, so system revenue is `amount_spent - amount_spent_by_house`.

use std::cmp::Ordering;

use redb::{ReadableTable, Table};
use serde::{Deserialize, Serialize};

use crate::cents::Cents;
use crate::ledger::{BalanceView, HOUSE, SYSTEM, is_pseudo};
use crate::store::{METRICS, Store, StoreError, decode, encode, open_read};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub ads_displayed: u64,
    pub impressions: u64,
    pub amount_spent: Cents,
    pub amount_spent_by_house: Cents,
}

impl Metrics {
    /// Average price per impression, if anything was shown.
    pub fn cost_per_impression(&self) -> Option<f64> {
        (self.impressions > 0).then(|| self.amount_spent.as_f64() / self.impressions as f64)
    }

    /// Money actually collected from advertisers.
    pub fn revenue(&self) -> Cents {
        self.amount_spent - self.amount_spent_by_house
    }

    fn apply(&mut self, impressions: u64, price: Cents, by_house: bool) {
        self.ads_displayed += 1;
        self.impressions += impressions;
        self.amount_spent += price;
        if by_house {
            self.amount_spent_by_house += price;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreboardEntry {
    pub account: String,
    pub nick: String,
    pub metrics: Metrics,
}

/// Record one delivered ad for `winner` and for the global record.
pub(crate) fn record_delivery(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    winner: &str,
    impressions: u64,
    price: Cents,
) -> Result<(), StoreError> {
    let by_house = winner == HOUSE;
    let mut accounts = vec![winner];
    if winner != SYSTEM {
        accounts.push(SYSTEM);
    }
    for account in accounts {
        let mut metrics: Metrics = match table.get(account)? {
            Some(raw) => decode(raw.value())?,
            None => Metrics::default(),
        };
        metrics.apply(impressions, price, by_house);
        let bytes = encode(&metrics)?;
        table.insert(account, bytes.as_slice())?;
    }
    Ok(())
}

/// One account's counters, zeroed when nothing was recorded.
pub fn load_metrics(store: &Store, account: &str) -> Result<Metrics, StoreError> {
    store.read(|txn| {
        let table = open_read(txn, METRICS)?;
        match table.get(account)? {
            Some(raw) => decode(raw.value()),
            None => Ok(Metrics::default()),
        }
    })
}

fn rank(a: &ScoreboardEntry, b: &ScoreboardEntry) -> Ordering {
    b.metrics
        .impressions
        .cmp(&a.metrics.impressions)
        .then_with(|| b.metrics.amount_spent.cmp(&a.metrics.amount_spent))
        .then_with(|| a.account.cmp(&b.account))
}

/// Advertisers ranked by impressions, then spend, then account id. The
/// pseudo-accounts are left out. `limit == 0` returns everyone.
pub fn scoreboard(store: &Store, limit: usize) -> Result<Vec<ScoreboardEntry>, StoreError> {
    let mut entries = store.read(|txn| {
        let table = open_read(txn, METRICS)?;
        let view = BalanceView::open(txn)?;
        let mut entries = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            let account = key.value();
            if is_pseudo(account) {
                continue;
            }
            let nick = view
                .record(account)?
                .nick
                .unwrap_or_else(|| account.to_string());
            entries.push(ScoreboardEntry {
                account: account.to_string(),
                nick,
                metrics: decode(value.value())?,
            });
        }
        Ok::<_, StoreError>(entries)
    })?;
    entries.sort_by(rank);
    if limit > 0 {
        entries.truncate(limit);
    }
    Ok(entries)
}
