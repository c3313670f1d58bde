//! # sharefair-ledger
//!
//! Checkpointed share ledger with pro-rata revenue distribution.
//!
//! Holders of shares are entitled to a cut of every deposit proportional to
//! the shares they held *at the time-index the deposit arrived*. Balances stay
//! freely transferable; each deposit is attributed through the balance
//! history, and each `(holder, time-index)` pair is paid at most once.
//!
//! ## Modules
//!
//! - [`checkpoints`]: append-only `(time-index, value)` histories
//! - [`shares`]: transferable balances backed by checkpoint histories
//! - [`revenue`]: deposit buckets keyed by time-index
//! - [`dividends`]: settlement table, premiums, harvest planning
//! - [`payout`]: seam to the underlying value asset
//! - [`snapshot`]: plain-data export and validated restore
//! - [`changes`]: per-call change tracking for incremental saves and undo
//! - [`math`]: wide multiply-divide

pub mod changes;
pub mod checkpoints;
pub mod dividends;
pub mod ledger;
pub mod math;
pub mod payout;
pub mod revenue;
pub mod shares;
pub mod snapshot;

pub use changes::{ChangeSet, ValueChanges};
pub use dividends::{HarvestReceipt, SettledEntry};
pub use ledger::Ledger;
pub use payout::{Payment, Payout, PayoutError, ValueBook};
pub use snapshot::{LedgerDelta, LedgerSnapshot};

use sharefair_types::{AccountId, Amount, TimeIndex};

/// Error types for ledger operations.
///
/// Every error leaves the ledger exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Sender does not hold enough shares (or value).
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        /// Current balance.
        available: Amount,
        /// Requested amount.
        required: Amount,
    },

    /// Spender's allowance is below the requested amount.
    #[error("insufficient allowance: have {available}, need {required}")]
    InsufficientAllowance {
        /// Remaining allowance.
        available: Amount,
        /// Requested amount.
        required: Amount,
    },

    /// Premium fraction outside 0..=255.
    #[error("premium fraction {0} is outside 0..=255")]
    InvalidPremium(u32),

    /// Caller may not act on this account.
    #[error("caller {caller} is not authorized to modify account {account}")]
    Unauthorized {
        /// The calling account.
        caller: AccountId,
        /// The account being modified.
        account: AccountId,
    },

    /// Revenue exists at a time-index whose recorded total supply is zero.
    #[error("consistency violation: revenue recorded at time-index {time_index} with zero total supply")]
    ConsistencyViolation {
        /// Offending time-index.
        time_index: TimeIndex,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in ledger calculation")]
    ArithmeticOverflow,

    /// The ambient clock moved backwards.
    #[error("time-index went backwards: last {last}, got {new}")]
    NonMonotonicTime {
        /// Highest time-index already recorded.
        last: TimeIndex,
        /// The rejected time-index.
        new: TimeIndex,
    },

    /// The value asset refused the payout.
    #[error("payout failed: {0}")]
    Payout(#[from] PayoutError),

    /// A snapshot violates a ledger invariant.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
