//! Chat-room ad inventory for adbot.
//!
//! Advertisers hold a balance in an append-only [`ledger`], register
//! [`campaign`] creatives and keyword spends, and compete in a per-message
//! keyword-weighted second-price [`auction`]. Everything persists in one
//! redb file behind [`store::Store`]; [`engine::Adbot`] is the facade the
//! speech and administrative sides call.
//!
//! ```no_run
//! use adbot::{Adbot, AdbotConfig};
//!
//! # fn main() -> Result<(), adbot::AdbotError> {
//! let bot = Adbot::open(&AdbotConfig::default())?;
//! if let Some(selection) = bot.evaluate("anyone selling running shoes?", 12, 40)? {
//!     println!("sponsored message: {}", selection.creative.content);
//!     bot.record_impression("lobby", &selection, 12)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod auction;
pub mod campaign;
pub mod cents;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod floor;
pub mod keyword;
pub mod ledger;
pub mod observe;
pub mod overrides;
pub mod report;
pub mod rooms;
pub mod scoreboard;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

pub use auction::{Bid, BillReceipt, Selection};
pub use campaign::{CampaignError, Creative, Spend};
pub use cents::{Cents, ParseCentsError};
pub use command::{Caller, dispatch};
pub use config::{AdbotConfig, ConfigLoadError};
pub use engine::Adbot;
pub use error::AdbotError;
pub use floor::{FloorPolicy, LinearFloor};
pub use keyword::WordSet;
pub use ledger::{Advertiser, HOUSE, LedgerEntry, LedgerError, SYSTEM};
pub use observe::{AuctionMetrics, AuctionOutcome, set_auction_metrics};
pub use scoreboard::{Metrics, ScoreboardEntry};
pub use store::{Store, StoreError};
