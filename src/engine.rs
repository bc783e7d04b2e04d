//! The [`Adbot`] facade: one store, one floor policy, and the two contracts
//! the outside world uses.
//!
//! The speech side calls [`Adbot::evaluate`] for every chat message and, only
//! after the ad was actually delivered, [`Adbot::record_impression`]. The
//! administrative side (command table, HTTP API) uses the delegating CRUD and
//! reporting methods.

use std::collections::HashMap;
use std::time::Instant;

use tracing::warn;

use crate::auction::{self, BillReceipt, Selection};
use crate::campaign::{self, Creative, Spend};
use crate::cents::Cents;
use crate::config::AdbotConfig;
use crate::error::AdbotError;
use crate::floor::FloorPolicy;
use crate::ledger::{self, Advertiser, HOUSE, LedgerEntry};
use crate::observe::{self, AuctionOutcome};
use crate::overrides;
use crate::rooms;
use crate::scoreboard::{self, Metrics, ScoreboardEntry};
use crate::store::Store;

const DEFAULT_LEDGER_PAGE: usize = 20;
const DEFAULT_SCOREBOARD_SIZE: usize = 10;

pub struct Adbot {
    store: Store,
    floor: Box<dyn FloorPolicy>,
    ledger_page: usize,
    scoreboard_size: usize,
}

impl Adbot {
    pub fn new(store: Store, floor: impl FloorPolicy + 'static) -> Self {
        Self {
            store,
            floor: Box::new(floor),
            ledger_page: DEFAULT_LEDGER_PAGE,
            scoreboard_size: DEFAULT_SCOREBOARD_SIZE,
        }
    }

    /// Open the configured store file and apply the configured floor and
    /// report sizes.
    pub fn open(config: &AdbotConfig) -> Result<Self, AdbotError> {
        config.validate()?;
        let store = Store::open(&config.store.path)?;
        Ok(Self::new(store, config.floor)
            .with_report_sizes(config.ledger.page_size, config.scoreboard.size))
    }

    pub fn with_report_sizes(mut self, ledger_page: usize, scoreboard_size: usize) -> Self {
        self.ledger_page = ledger_page.max(1);
        self.scoreboard_size = scoreboard_size;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn ledger_page(&self) -> usize {
        self.ledger_page
    }

    pub fn floor(&self, audience: u64, cooldown: u64) -> Cents {
        self.floor.min_bid(audience, cooldown)
    }

    /// Pick the ad (if any) for a message seen by `audience` viewers,
    /// `cooldown` messages after the room's last ad. Nothing is written.
    pub fn evaluate(
        &self,
        message: &str,
        audience: u64,
        cooldown: u64,
    ) -> Result<Option<Selection>, AdbotError> {
        let start = Instant::now();
        let floor = self.floor(audience, cooldown);
        let result = auction::select(&self.store, message, floor);
        if let Some(recorder) = observe::recorder() {
            let (candidates, outcome) = match &result {
                Ok(Some(selection)) => (selection.candidates, AuctionOutcome::Sold),
                Ok(None) => (0, AuctionOutcome::NoCandidates),
                Err(_) => (0, AuctionOutcome::Failed),
            };
            recorder.record_auction(start.elapsed(), candidates, outcome);
        }
        Ok(result?)
    }

    /// Bill a delivered selection.
    pub fn record_impression(
        &self,
        room: &str,
        selection: &Selection,
        impressions: u64,
    ) -> Result<BillReceipt, AdbotError> {
        let start = Instant::now();
        let result = auction::bill(
            &self.store,
            room,
            &selection.winner,
            selection.price,
            &selection.creative.name,
            impressions,
        );
        if let Some(recorder) = observe::recorder() {
            recorder.record_billing(start.elapsed(), selection.price, impressions, result.is_ok());
        }
        if let Err(err) = &result {
            warn!(room, winner = %selection.winner, error = %err, "billing failed");
        }
        Ok(result?)
    }

    // Ledger

    pub fn balance(&self, account: &str) -> Result<Cents, AdbotError> {
        Ok(ledger::get_balance(&self.store, account)?)
    }

    pub fn advertiser(&self, account: &str) -> Result<Advertiser, AdbotError> {
        Ok(ledger::get_advertiser(&self.store, account)?)
    }

    pub fn set_nick(&self, account: &str, nick: &str) -> Result<(), AdbotError> {
        Ok(ledger::set_nick(&self.store, account, nick)?)
    }

    pub fn transfer(
        &self,
        amount: Cents,
        from: &str,
        to: &str,
        memo: &str,
        force: bool,
    ) -> Result<(Cents, Cents), AdbotError> {
        Ok(ledger::transfer(&self.store, amount, from, to, memo, force)?)
    }

    /// Forced grant from house. Returns the account's new balance.
    pub fn credit(&self, account: &str, amount: Cents, memo: &str) -> Result<Cents, AdbotError> {
        let (_, balance) = ledger::transfer(&self.store, amount, HOUSE, account, memo, true)?;
        Ok(balance)
    }

    /// The configured page of most recent entries.
    pub fn ledger(&self, account: &str) -> Result<Vec<LedgerEntry>, AdbotError> {
        self.ledger_entries(account, self.ledger_page)
    }

    pub fn ledger_entries(
        &self,
        account: &str,
        max_entries: usize,
    ) -> Result<Vec<LedgerEntry>, AdbotError> {
        Ok(ledger::ledger(&self.store, account, max_entries)?)
    }

    pub fn reset_balances(&self) -> Result<(), AdbotError> {
        Ok(ledger::reset_balances(&self.store)?)
    }

    pub fn add_stimulus(&self, amount: Cents) -> Result<usize, AdbotError> {
        Ok(ledger::add_stimulus(&self.store, amount)?)
    }

    pub fn stimulus_pool(&self) -> Result<Cents, AdbotError> {
        Ok(ledger::stimulus_pool(&self.store)?)
    }

    // Campaigns

    pub fn upsert_creative(
        &self,
        owner: &str,
        name: &str,
        content: &str,
    ) -> Result<bool, AdbotError> {
        Ok(campaign::upsert_creative(&self.store, owner, name, content)?)
    }

    pub fn delete_creative(&self, owner: &str, name: &str) -> Result<bool, AdbotError> {
        Ok(campaign::delete_creative(&self.store, owner, name)?)
    }

    pub fn creative(&self, owner: &str, name: &str) -> Result<Option<Creative>, AdbotError> {
        Ok(campaign::get_creative(&self.store, owner, name)?)
    }

    pub fn creatives(&self, owner: &str) -> Result<Vec<Creative>, AdbotError> {
        Ok(campaign::list_creatives(&self.store, owner)?)
    }

    pub fn upsert_spend(
        &self,
        owner: &str,
        creative: &str,
        keywords: &str,
        max_bid: Cents,
    ) -> Result<bool, AdbotError> {
        Ok(campaign::upsert_spend(
            &self.store,
            owner,
            creative,
            keywords,
            max_bid,
        )?)
    }

    pub fn delete_spend(&self, owner: &str, creative: &str) -> Result<bool, AdbotError> {
        Ok(campaign::delete_spend(&self.store, owner, creative)?)
    }

    pub fn spends(&self, owner: &str) -> Result<Vec<Spend>, AdbotError> {
        Ok(campaign::list_spends(&self.store, owner)?)
    }

    pub fn scale_spends(&self, owner: &str, factor: f64) -> Result<usize, AdbotError> {
        Ok(campaign::scale_spends(&self.store, owner, factor)?)
    }

    pub fn reset_campaigns(&self) -> Result<(), AdbotError> {
        Ok(campaign::reset_campaigns(&self.store)?)
    }

    // Overrides

    pub fn set_account_enabled(&self, account: &str, enabled: bool) -> Result<(), AdbotError> {
        Ok(overrides::set_account_enabled(&self.store, account, enabled)?)
    }

    pub fn set_spend_enabled(
        &self,
        account: &str,
        creative: &str,
        enabled: bool,
    ) -> Result<(), AdbotError> {
        Ok(overrides::set_spend_enabled(
            &self.store,
            account,
            creative,
            enabled,
        )?)
    }

    pub fn account_overrides(&self) -> Result<HashMap<String, bool>, AdbotError> {
        Ok(overrides::account_overrides(&self.store)?)
    }

    pub fn spend_overrides(&self) -> Result<HashMap<String, HashMap<String, bool>>, AdbotError> {
        Ok(overrides::spend_overrides(&self.store)?)
    }

    // Reporting

    pub fn scoreboard(&self) -> Result<Vec<ScoreboardEntry>, AdbotError> {
        Ok(scoreboard::scoreboard(&self.store, self.scoreboard_size)?)
    }

    pub fn metrics(&self, account: &str) -> Result<Metrics, AdbotError> {
        Ok(scoreboard::load_metrics(&self.store, account)?)
    }

    // Rooms

    pub fn join_room(&self, room: &str) -> Result<bool, AdbotError> {
        Ok(rooms::join(&self.store, room)?)
    }

    pub fn part_room(&self, room: &str) -> Result<bool, AdbotError> {
        Ok(rooms::part(&self.store, room)?)
    }

    pub fn rooms(&self) -> Result<Vec<String>, AdbotError> {
        Ok(rooms::list(&self.store)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::floor::LinearFloor;
    use crate::observe::{AuctionMetrics, set_auction_metrics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn adbot() -> Adbot {
        let fixed = |_: u64, _: u64| Cents(100);
        Adbot::new(Store::in_memory().unwrap(), fixed)
    }

    #[test]
    fn evaluate_then_record_impression() {
        let bot = adbot();
        bot.credit("alice", Cents(1_000), "seed").unwrap();
        bot.upsert_creative("alice", "shoes", "Buy shoes").unwrap();
        bot.upsert_spend("alice", "shoes", "shoes", Cents(500))
            .unwrap();

        let sel = bot.evaluate("shoes please", 3, 0).unwrap().unwrap();
        assert_eq!(sel.price, Cents(100));
        assert_eq!(bot.balance("alice").unwrap(), Cents(1_000));

        let receipt = bot.record_impression("lobby", &sel, 3).unwrap();
        assert_eq!(receipt.balance, Some(Cents(900)));
        assert_eq!(bot.metrics("alice").unwrap().impressions, 3);
        assert_eq!(bot.scoreboard().unwrap()[0].account, "alice");
    }

    #[test]
    fn linear_floor_is_applied() {
        let bot = Adbot::new(Store::in_memory().unwrap(), LinearFloor::default());
        assert_eq!(bot.floor(2, 10), Cents(10 * 2 * 10 * 10));
        assert_eq!(bot.floor(2, 20), Cents::ZERO);
    }

    #[test]
    fn open_uses_configured_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AdbotConfig::default();
        config.store.path = dir.path().join("ads.redb");
        config.ledger.page_size = 2;
        let bot = Adbot::open(&config).unwrap();
        for i in 0..3 {
            bot.credit("alice", Cents(i + 1), "seed").unwrap();
        }
        assert_eq!(bot.ledger("alice").unwrap().len(), 2);
    }

    struct Recording {
        auctions: AtomicUsize,
        outcomes: Mutex<Vec<AuctionOutcome>>,
    }

    impl AuctionMetrics for Recording {
        fn record_auction(&self, _: Duration, _: usize, outcome: AuctionOutcome) {
            self.auctions.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().unwrap().push(outcome);
        }

        fn record_billing(&self, _: Duration, _: Cents, _: u64, _: bool) {}
    }

    #[test]
    fn observer_sees_auctions() {
        let recording = Arc::new(Recording {
            auctions: AtomicUsize::new(0),
            outcomes: Mutex::new(Vec::new()),
        });
        set_auction_metrics(Some(recording.clone()));

        let bot = adbot();
        bot.evaluate("nothing matches", 1, 0).unwrap();
        set_auction_metrics(None);

        assert!(recording.auctions.load(Ordering::SeqCst) >= 1);
        assert!(
            recording
                .outcomes
                .lock()
                .unwrap()
                .contains(&AuctionOutcome::NoCandidates)
        );
    }
}
