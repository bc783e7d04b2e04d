//! Enable/disable switches for whole accounts and single spends.
//!
//! Absence of an entry means enabled. The auction reads both tables once, into
//! an [`OverrideSnapshot`], inside its own read transaction.

use std::collections::HashMap;

use redb::{ReadTransaction, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::campaign::{CampaignError, check_name, index_key};
use crate::store::{
    ACCOUNT_OVERRIDES, SPEND_OVERRIDES, Store, StoreError, decode, encode, open_read, open_write,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct SpendOverride {
    account: String,
    creative: String,
    enabled: bool,
}

pub fn set_account_enabled(store: &Store, account: &str, enabled: bool) -> Result<(), StoreError> {
    store.write(|txn| {
        let mut table = open_write(txn, ACCOUNT_OVERRIDES)?;
        table.insert(account, u8::from(enabled))?;
        Ok::<_, StoreError>(())
    })?;
    info!(account, enabled, "account override set");
    Ok(())
}

pub fn set_spend_enabled(
    store: &Store,
    account: &str,
    creative: &str,
    enabled: bool,
) -> Result<(), CampaignError> {
    check_name(creative)?;
    let record = SpendOverride {
        account: account.to_string(),
        creative: creative.to_string(),
        enabled,
    };
    store.write(|txn| {
        let mut table = open_write(txn, SPEND_OVERRIDES)?;
        let bytes = encode(&record)?;
        table.insert(index_key(account, creative).as_str(), bytes.as_slice())?;
        Ok::<_, StoreError>(())
    })?;
    info!(account, creative, enabled, "spend override set");
    Ok(())
}

pub fn account_overrides(store: &Store) -> Result<HashMap<String, bool>, StoreError> {
    store.read(read_account_overrides)
}

pub fn spend_overrides(
    store: &Store,
) -> Result<HashMap<String, HashMap<String, bool>>, StoreError> {
    store.read(read_spend_overrides)
}

fn read_account_overrides(txn: &ReadTransaction) -> Result<HashMap<String, bool>, StoreError> {
    let table = open_read(txn, ACCOUNT_OVERRIDES)?;
    let mut out = HashMap::new();
    for item in table.iter()? {
        let (key, value) = item?;
        out.insert(key.value().to_string(), value.value() != 0);
    }
    Ok(out)
}

fn read_spend_overrides(
    txn: &ReadTransaction,
) -> Result<HashMap<String, HashMap<String, bool>>, StoreError> {
    let table = open_read(txn, SPEND_OVERRIDES)?;
    let mut out: HashMap<String, HashMap<String, bool>> = HashMap::new();
    for item in table.iter()? {
        let (_, value) = item?;
        let record: SpendOverride = decode(value.value())?;
        out.entry(record.account)
            .or_default()
            .insert(record.creative, record.enabled);
    }
    Ok(out)
}

/// Both override tables as read by one transaction.
#[derive(Clone, Debug, Default)]
pub struct OverrideSnapshot {
    pub accounts: HashMap<String, bool>,
    pub spends: HashMap<String, HashMap<String, bool>>,
}

impl OverrideSnapshot {
    pub(crate) fn read(txn: &ReadTransaction) -> Result<Self, StoreError> {
        Ok(Self {
            accounts: read_account_overrides(txn)?,
            spends: read_spend_overrides(txn)?,
        })
    }

    /// Account-level disable wins over any spend-level setting.
    pub fn is_enabled(&self, account: &str, creative: &str) -> bool {
        if !self.accounts.get(account).copied().unwrap_or(true) {
            return false;
        }
        self.spends
            .get(account)
            .and_then(|by_creative| by_creative.get(creative))
            .copied()
            .unwrap_or(true)
    }
}
