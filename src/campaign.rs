//! Creatives, spend rules and the global spend index.
//!
//! A [`Spend`] is stored twice: under its owner in `spends`, keyed
//! `(owner, creative)` so per-owner listings are exact range scans, and in the
//! flat `spend_index`, keyed `"owner:creative"`, which the auction walks
//! without enumerating owners. Every mutation keeps both copies in step inside
//! one write transaction.

use redb::{ReadTransaction, ReadableTable, Table};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::cents::Cents;
use crate::keyword::WordSet;
use crate::ledger::HOUSE;
use crate::store::{
    CREATIVES, SPEND_INDEX, SPENDS, Store, StoreError, clear_table, decode, encode, open_read,
    open_write,
};

pub const FALLBACK_CONTENT: &str = "404 ad not found";

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("invalid max bid {0}")]
    InvalidBid(Cents),
    #[error("invalid scale factor {0}")]
    InvalidFactor(f64),
    #[error("creative name must be a single non-empty word without ':'")]
    InvalidName,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    pub owner: String,
    pub name: String,
    pub content: String,
}

impl Creative {
    /// Stand-in used when a winning spend points at a creative that no longer
    /// exists.
    pub fn fallback() -> Self {
        Creative {
            owner: HOUSE.to_string(),
            name: String::new(),
            content: FALLBACK_CONTENT.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spend {
    pub owner: String,
    pub creative: String,
    pub keywords: WordSet,
    pub max_bid: Cents,
}

impl Spend {
    pub fn index_key(&self) -> String {
        index_key(&self.owner, &self.creative)
    }
}

/// Key shared by the global index and spend-level overrides.
pub fn index_key(owner: &str, creative: &str) -> String {
    format!("{owner}:{creative}")
}

/// Account ids may contain `:`, creative names may not, so an index key
/// splits unambiguously at its last colon.
pub(crate) fn check_name(name: &str) -> Result<(), CampaignError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(CampaignError::InvalidName);
    }
    Ok(())
}

/// Insert or replace a creative. Returns whether one was replaced.
pub fn upsert_creative(
    store: &Store,
    owner: &str,
    name: &str,
    content: &str,
) -> Result<bool, CampaignError> {
    check_name(name)?;
    let creative = Creative {
        owner: owner.to_string(),
        name: name.to_string(),
        content: content.to_string(),
    };
    let replaced = store.write(|txn| {
        let mut table = open_write(txn, CREATIVES)?;
        let bytes = encode(&creative)?;
        let previous = table.insert((owner, name), bytes.as_slice())?;
        Ok::<_, StoreError>(previous.is_some())
    })?;
    info!(owner, name, replaced, "creative stored");
    Ok(replaced)
}

/// Delete a creative. Spends referencing it are left alone.
pub fn delete_creative(store: &Store, owner: &str, name: &str) -> Result<bool, CampaignError> {
    let existed = store.write(|txn| {
        let mut table = open_write(txn, CREATIVES)?;
        let previous = table.remove((owner, name))?;
        Ok::<_, StoreError>(previous.is_some())
    })?;
    info!(owner, name, existed, "creative deleted");
    Ok(existed)
}

pub fn get_creative(
    store: &Store,
    owner: &str,
    name: &str,
) -> Result<Option<Creative>, CampaignError> {
    Ok(store.read(|txn| lookup_creative(txn, owner, name))?)
}

pub(crate) fn lookup_creative(
    txn: &ReadTransaction,
    owner: &str,
    name: &str,
) -> Result<Option<Creative>, StoreError> {
    let table = open_read(txn, CREATIVES)?;
    match table.get((owner, name))? {
        Some(raw) => Ok(Some(decode(raw.value())?)),
        None => Ok(None),
    }
}

/// Every creative of `owner`, ordered by name.
pub fn list_creatives(store: &Store, owner: &str) -> Result<Vec<Creative>, CampaignError> {
    Ok(store.read(|txn| {
        let table = open_read(txn, CREATIVES)?;
        let mut out = Vec::new();
        for item in table.range((owner, "")..)? {
            let (key, value) = item?;
            if key.value().0 != owner {
                break;
            }
            out.push(decode(value.value())?);
        }
        Ok::<_, StoreError>(out)
    })?)
}

fn put_spend(
    spends: &mut Table<'_, (&'static str, &'static str), &'static [u8]>,
    index: &mut Table<'_, &'static str, &'static [u8]>,
    spend: &Spend,
) -> Result<bool, StoreError> {
    let bytes = encode(spend)?;
    let replaced = spends
        .insert(
            (spend.owner.as_str(), spend.creative.as_str()),
            bytes.as_slice(),
        )?
        .is_some();
    index.insert(spend.index_key().as_str(), bytes.as_slice())?;
    Ok(replaced)
}

/// Insert or replace the spend rule for `(owner, creative)`. The keyword text
/// is tokenized and stemmed before storage.
pub fn upsert_spend(
    store: &Store,
    owner: &str,
    creative: &str,
    keywords: &str,
    max_bid: Cents,
) -> Result<bool, CampaignError> {
    check_name(creative)?;
    if max_bid.is_negative() {
        return Err(CampaignError::InvalidBid(max_bid));
    }
    let spend = Spend {
        owner: owner.to_string(),
        creative: creative.to_string(),
        keywords: WordSet::parse(keywords),
        max_bid,
    };
    let replaced = store.write(|txn| {
        let mut spends = open_write(txn, SPENDS)?;
        let mut index = open_write(txn, SPEND_INDEX)?;
        put_spend(&mut spends, &mut index, &spend)
    })?;
    info!(
        owner,
        creative,
        max_bid = max_bid.get(),
        keywords = spend.keywords.len(),
        replaced,
        "spend stored"
    );
    Ok(replaced)
}

/// Remove a spend from both the owner table and the global index.
pub fn delete_spend(store: &Store, owner: &str, creative: &str) -> Result<bool, CampaignError> {
    check_name(creative)?;
    let existed = store.write(|txn| {
        let mut spends = open_write(txn, SPENDS)?;
        let mut index = open_write(txn, SPEND_INDEX)?;
        let existed = spends.remove((owner, creative))?.is_some();
        index.remove(index_key(owner, creative).as_str())?;
        Ok::<_, StoreError>(existed)
    })?;
    info!(owner, creative, existed, "spend deleted");
    Ok(existed)
}

/// Every spend of `owner`, ordered by creative name.
pub fn list_spends(store: &Store, owner: &str) -> Result<Vec<Spend>, CampaignError> {
    Ok(store.read(|txn| owner_spends(txn, owner))?)
}

fn owner_spends(txn: &ReadTransaction, owner: &str) -> Result<Vec<Spend>, StoreError> {
    let table = open_read(txn, SPENDS)?;
    let mut out = Vec::new();
    for item in table.range((owner, "")..)? {
        let (key, value) = item?;
        if key.value().0 != owner {
            break;
        }
        out.push(decode(value.value())?);
    }
    Ok(out)
}

/// Multiply each of `owner`'s max bids by `factor`, rounding to the nearest
/// cent. Returns how many spends were rescaled.
pub fn scale_spends(store: &Store, owner: &str, factor: f64) -> Result<usize, CampaignError> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(CampaignError::InvalidFactor(factor));
    }
    let scaled = store.write(|txn| {
        let mut spends = open_write(txn, SPENDS)?;
        let mut index = open_write(txn, SPEND_INDEX)?;

        let mut current: Vec<Spend> = Vec::new();
        for item in spends.range((owner, "")..)? {
            let (key, value) = item?;
            if key.value().0 != owner {
                break;
            }
            current.push(decode(value.value())?);
        }
        for spend in &mut current {
            spend.max_bid = Cents::from_f64_rounded(spend.max_bid.as_f64() * factor);
            put_spend(&mut spends, &mut index, spend)?;
        }
        Ok::<_, StoreError>(current.len())
    })?;
    info!(owner, factor, scaled, "spends rescaled");
    Ok(scaled)
}

/// Visit the global index in key order inside one read transaction.
pub fn for_each_spend<E, F>(store: &Store, visitor: F) -> Result<(), E>
where
    E: From<StoreError>,
    F: FnMut(Spend) -> Result<(), E>,
{
    store.read(|txn| scan_spends(txn, visitor))
}

pub(crate) fn scan_spends<E, F>(txn: &ReadTransaction, mut visitor: F) -> Result<(), E>
where
    E: From<StoreError>,
    F: FnMut(Spend) -> Result<(), E>,
{
    let index = open_read(txn, SPEND_INDEX)?;
    for item in index.iter().map_err(StoreError::from)? {
        let (_, value) = item.map_err(StoreError::from)?;
        let spend: Spend = decode(value.value())?;
        visitor(spend)?;
    }
    Ok(())
}

/// Drop every creative and spend. Overrides are kept.
pub fn reset_campaigns(store: &Store) -> Result<(), CampaignError> {
    store.write(|txn| {
        clear_table(txn, CREATIVES)?;
        clear_table(txn, SPENDS)?;
        clear_table(txn, SPEND_INDEX)?;
        Ok::<_, StoreError>(())
    })?;
    info!("campaigns reset");
    Ok(())
}
