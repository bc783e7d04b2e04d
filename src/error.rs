use thiserror::Error;

use crate::campaign::CampaignError;
use crate::cents::ParseCentsError;
use crate::config::ConfigLoadError;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Every failure the [`Adbot`](crate::engine::Adbot) facade can report.
#[derive(Debug, Error)]
pub enum AdbotError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Campaign(#[from] CampaignError),

    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error(transparent)]
    Amount(#[from] ParseCentsError),

    #[error("usage: {0}")]
    Usage(String),
}

impl AdbotError {
    /// Storage or codec failure, as opposed to a rejected request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AdbotError::Store(_)
                | AdbotError::Ledger(LedgerError::Store(_))
                | AdbotError::Campaign(CampaignError::Store(_))
        )
    }
}
