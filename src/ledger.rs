//! Advertiser ledger: balances, append-only history and the transfer primitive.
//!
//! Balances change only through [`transfer`]. Each transfer allocates one id
//! from the persisted sequence and appends two [`LedgerEntry`] rows under it,
//! one per counterparty, each carrying that side's post-transfer balance. The
//! payer's row records `-amount` and the payee's `+amount`.
//!
//! An account that has never been touched has no stored balance. Reads then
//! resolve it to the pending stimulus pool (zero for the pseudo-accounts).
//! Inside a write transaction the same lookup materializes the account: it is
//! stored at zero and immediately credited the pool through a forced
//! `house -> account` transfer, so the grant shows up in both ledgers.

use chrono::{DateTime, Utc};
use redb::{ReadOnlyTable, ReadTransaction, ReadableTable, Table, WriteTransaction};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::cents::Cents;
use crate::store::{
    ACCOUNTS, LEDGER, META, METRICS, Store, StoreError, clear_table, decode, encode, open_read,
    open_write,
};

/// The operator's own account. Funds stimulus grants and pays nothing for its
/// own ads.
pub const HOUSE: &str = "house";
/// Sink for every ad payment; also the key of the global metrics record.
pub const SYSTEM: &str = "system";

pub const STIMULUS_MEMO: &str = "stimulus";

const META_STIMULUS: &str = "stimulus_pool";
const META_NEXT_TXID: &str = "next_txid";

/// Pseudo-accounts may carry negative balances.
pub fn is_pseudo(account: &str) -> bool {
    account == HOUSE || account == SYSTEM
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{account} has insufficient funds: balance {balance}, needs {amount}")]
    InsufficientFunds {
        account: String,
        balance: Cents,
        amount: Cents,
    },
    #[error("invalid amount {0}")]
    InvalidAmount(Cents),
    #[error("invalid transfer from {0} to itself")]
    InvalidTransfer(String),
    #[error("balance overflow on {0}")]
    Overflow(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stored per-account state. `balance == None` means the account has never
/// been materialized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Cents>,
}

/// One side of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub txid: u64,
    /// Signed from the recording account's point of view.
    pub amount: Cents,
    pub from: String,
    pub to: String,
    pub memo: String,
    /// Recording account's balance after this entry.
    pub balance: Cents,
    pub at: DateTime<Utc>,
}

/// Nickname plus resolved balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertiser {
    pub account: String,
    pub nick: String,
    pub balance: Cents,
}

/// Tables a transfer touches, opened once per write transaction.
pub(crate) struct Books<'txn> {
    accounts: Table<'txn, &'static str, &'static [u8]>,
    ledger: Table<'txn, (&'static str, u64), &'static [u8]>,
    meta: Table<'txn, &'static str, u64>,
}

impl<'txn> Books<'txn> {
    pub(crate) fn open(txn: &'txn WriteTransaction) -> Result<Self, StoreError> {
        Ok(Self {
            accounts: open_write(txn, ACCOUNTS)?,
            ledger: open_write(txn, LEDGER)?,
            meta: open_write(txn, META)?,
        })
    }

    fn record(&self, account: &str) -> Result<AccountRecord, StoreError> {
        match self.accounts.get(account)? {
            Some(raw) => decode(raw.value()),
            None => Ok(AccountRecord::default()),
        }
    }

    fn put_record(&mut self, account: &str, record: &AccountRecord) -> Result<(), StoreError> {
        let bytes = encode(record)?;
        self.accounts.insert(account, bytes.as_slice())?;
        Ok(())
    }

    pub(crate) fn stimulus_pool(&self) -> Result<Cents, StoreError> {
        Ok(self
            .meta
            .get(META_STIMULUS)?
            .map(|v| Cents(v.value() as i64))
            .unwrap_or_default())
    }

    fn next_txid(&mut self) -> Result<u64, StoreError> {
        let next = self
            .meta
            .get(META_NEXT_TXID)?
            .map(|v| v.value())
            .unwrap_or(1);
        self.meta.insert(META_NEXT_TXID, next + 1)?;
        Ok(next)
    }

    /// Balance with lazy materialization of the stimulus grant.
    pub(crate) fn balance(&mut self, account: &str) -> Result<Cents, LedgerError> {
        let mut record = self.record(account)?;
        if let Some(balance) = record.balance {
            return Ok(balance);
        }
        if is_pseudo(account) {
            return Ok(Cents::ZERO);
        }

        record.balance = Some(Cents::ZERO);
        self.put_record(account, &record)?;
        let pool = self.stimulus_pool()?;
        if pool == Cents::ZERO {
            return Ok(Cents::ZERO);
        }
        debug!(account, pool = pool.get(), "materializing stimulus grant");
        let (_, granted) = self.transfer(pool, HOUSE, account, STIMULUS_MEMO, true)?;
        Ok(granted)
    }

    pub(crate) fn transfer(
        &mut self,
        amount: Cents,
        from: &str,
        to: &str,
        memo: &str,
        force: bool,
    ) -> Result<(Cents, Cents), LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if from == to {
            return Err(LedgerError::InvalidTransfer(from.to_string()));
        }

        // Materializing either side may post a grant from house, so settle
        // both before reading balances.
        self.balance(from)?;
        self.balance(to)?;
        let from_before = self.balance(from)?;
        let to_before = self.balance(to)?;
        let from_after = from_before
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::Overflow(from.to_string()))?;
        let to_after = to_before
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(to.to_string()))?;

        if from_after.is_negative() && !force && !is_pseudo(from) {
            return Err(LedgerError::InsufficientFunds {
                account: from.to_string(),
                balance: from_before,
                amount,
            });
        }

        let txid = self.next_txid()?;
        let at = Utc::now();
        self.apply(from, from_after)?;
        self.apply(to, to_after)?;
        self.append(
            from,
            &LedgerEntry {
                txid,
                amount: -amount,
                from: from.to_string(),
                to: to.to_string(),
                memo: memo.to_string(),
                balance: from_after,
                at,
            },
        )?;
        self.append(
            to,
            &LedgerEntry {
                txid,
                amount,
                from: from.to_string(),
                to: to.to_string(),
                memo: memo.to_string(),
                balance: to_after,
                at,
            },
        )?;

        debug!(
            txid,
            from,
            to,
            amount = amount.get(),
            from_balance = from_after.get(),
            to_balance = to_after.get(),
            memo,
            "transfer posted"
        );
        Ok((from_after, to_after))
    }

    fn apply(&mut self, account: &str, balance: Cents) -> Result<(), StoreError> {
        let mut record = self.record(account)?;
        record.balance = Some(balance);
        self.put_record(account, &record)
    }

    fn append(&mut self, account: &str, entry: &LedgerEntry) -> Result<(), StoreError> {
        let bytes = encode(entry)?;
        self.ledger
            .insert((account, entry.txid), bytes.as_slice())?;
        Ok(())
    }

    /// Ids of every non-pseudo account whose balance is materialized.
    fn materialized(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for item in self.accounts.iter()? {
            let (key, value) = item?;
            let account = key.value();
            if is_pseudo(account) {
                continue;
            }
            let record: AccountRecord = decode(value.value())?;
            if record.balance.is_some() {
                out.push(account.to_string());
            }
        }
        Ok(out)
    }
}

/// Read-side balance resolution for one snapshot.
pub(crate) struct BalanceView {
    accounts: ReadOnlyTable<&'static str, &'static [u8]>,
    pool: Cents,
}

impl BalanceView {
    pub(crate) fn open(txn: &ReadTransaction) -> Result<Self, StoreError> {
        let meta = open_read(txn, META)?;
        let pool = meta
            .get(META_STIMULUS)?
            .map(|v| Cents(v.value() as i64))
            .unwrap_or_default();
        Ok(Self {
            accounts: open_read(txn, ACCOUNTS)?,
            pool,
        })
    }

    pub(crate) fn record(&self, account: &str) -> Result<AccountRecord, StoreError> {
        match self.accounts.get(account)? {
            Some(raw) => decode(raw.value()),
            None => Ok(AccountRecord::default()),
        }
    }

    pub(crate) fn balance(&self, account: &str) -> Result<Cents, StoreError> {
        let record = self.record(account)?;
        Ok(self.resolve(account, &record))
    }

    fn resolve(&self, account: &str, record: &AccountRecord) -> Cents {
        match record.balance {
            Some(balance) => balance,
            None if is_pseudo(account) => Cents::ZERO,
            None => self.pool,
        }
    }
}

/// Current balance without side effects.
pub fn get_balance(store: &Store, account: &str) -> Result<Cents, LedgerError> {
    store.read(|txn| Ok(BalanceView::open(txn)?.balance(account)?))
}

/// Nickname (falling back to the account id) and resolved balance.
pub fn get_advertiser(store: &Store, account: &str) -> Result<Advertiser, LedgerError> {
    store.read(|txn| {
        let view = BalanceView::open(txn)?;
        let record = view.record(account)?;
        Ok(Advertiser {
            account: account.to_string(),
            balance: view.resolve(account, &record),
            nick: record.nick.unwrap_or_else(|| account.to_string()),
        })
    })
}

/// Change the display name. Does not materialize the balance.
pub fn set_nick(store: &Store, account: &str, nick: &str) -> Result<(), LedgerError> {
    store.write(|txn| {
        let mut books = Books::open(txn)?;
        let mut record = books.record(account)?;
        record.nick = Some(nick.to_string());
        books.put_record(account, &record)?;
        Ok::<_, StoreError>(())
    })?;
    debug!(account, nick, "nickname updated");
    Ok(())
}

/// Move `amount` from `from` to `to` in one transaction and return both
/// post-transfer balances.
///
/// Fails with [`LedgerError::InsufficientFunds`] when `from` would go negative,
/// unless `force` is set or `from` is a pseudo-account. Nothing is written on
/// failure.
pub fn transfer(
    store: &Store,
    amount: Cents,
    from: &str,
    to: &str,
    memo: &str,
    force: bool,
) -> Result<(Cents, Cents), LedgerError> {
    store.write(|txn| {
        let mut books = Books::open(txn)?;
        books.transfer(amount, from, to, memo, force)
    })
}

/// The most recent `max_entries` entries of `account`, oldest first.
pub fn ledger(
    store: &Store,
    account: &str,
    max_entries: usize,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    store.read(|txn| {
        let table = open_read(txn, LEDGER)?;
        let mut entries = Vec::with_capacity(max_entries.min(64));
        for item in table
            .range((account, 0u64)..=(account, u64::MAX))
            .map_err(StoreError::from)?
            .rev()
            .take(max_entries)
        {
            let (_, value) = item.map_err(StoreError::from)?;
            entries.push(decode(value.value())?);
        }
        entries.reverse();
        Ok(entries)
    })
}

/// Forget every balance, all ledger history and all metrics. Nicknames, the
/// stimulus pool and the transaction sequence survive.
pub fn reset_balances(store: &Store) -> Result<(), LedgerError> {
    let cleared = store.write(|txn| {
        let mut accounts = open_write(txn, ACCOUNTS)?;
        let mut records: Vec<(String, AccountRecord)> = Vec::new();
        for item in accounts.iter()? {
            let (key, value) = item?;
            records.push((key.value().to_string(), decode(value.value())?));
        }
        for (account, mut record) in records.iter().cloned() {
            if record.nick.is_none() {
                accounts.remove(account.as_str())?;
            } else {
                record.balance = None;
                let bytes = encode(&record)?;
                accounts.insert(account.as_str(), bytes.as_slice())?;
            }
        }
        clear_table(txn, LEDGER)?;
        clear_table(txn, METRICS)?;
        Ok::<_, StoreError>(records.len())
    })?;
    info!(accounts = cleared, "balances, ledgers and metrics reset");
    Ok(())
}

/// Current pending stimulus pool.
pub fn stimulus_pool(store: &Store) -> Result<Cents, LedgerError> {
    store.read(|txn| Ok(BalanceView::open(txn)?.pool))
}

/// Grow the stimulus pool by `amount` and credit `amount` from house to every
/// materialized account. Returns how many accounts were credited.
pub fn add_stimulus(store: &Store, amount: Cents) -> Result<usize, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let credited = store.write(|txn| {
        let mut books = Books::open(txn)?;
        let pool = books
            .stimulus_pool()?
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(HOUSE.to_string()))?;
        books
            .meta
            .insert(META_STIMULUS, pool.get() as u64)
            .map_err(StoreError::from)?;
        let accounts = books.materialized()?;
        for account in &accounts {
            books.transfer(amount, HOUSE, account, STIMULUS_MEMO, true)?;
        }
        Ok::<_, LedgerError>(accounts.len())
    })?;
    info!(amount = amount.get(), credited, "stimulus issued");
    Ok(credited)
}
