//! Plain-data export of the ledger and validated restore.
//!
//! Vectors are sorted so that two snapshots of the same ledger compare equal
//! regardless of hash-map iteration order.
//!
//! A [`LedgerDelta`] uses the same row types for the subset of state a run of
//! calls touched.

use serde::{Deserialize, Serialize};
use sharefair_types::{AccountId, Amount, PremiumFraction, TimeIndex};

use crate::checkpoints::Checkpoint;

/// Complete ledger state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Highest time-index any mutating call has observed.
    pub high_water: TimeIndex,
    /// Balance history of every account that ever held a checkpoint.
    pub balance_histories: Vec<AccountHistory>,
    /// Total supply history.
    pub supply_history: Vec<Checkpoint>,
    /// Non-empty revenue buckets.
    pub revenue: Vec<RevenueBucket>,
    /// Settled `(account, time-index)` pairs.
    pub settlements: Vec<Settlement>,
    /// Non-zero harvest premiums.
    pub premiums: Vec<PremiumSetting>,
    /// Non-zero allowances.
    pub allowances: Vec<Allowance>,
    /// Sum of all dividends paid.
    pub total_paid: Amount,
}

/// Rows touched by a run of ledger calls, with their current values.
///
/// Checkpoints, revenue buckets, and settlements are upserts. A premium of
/// zero or an allowance of zero means the row no longer exists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub high_water: TimeIndex,
    /// Changed tail of each touched balance history.
    pub balance_checkpoints: Vec<AccountHistory>,
    /// Changed tail of the supply history.
    pub supply_checkpoints: Vec<Checkpoint>,
    pub revenue: Vec<RevenueBucket>,
    /// Newly settled pairs.
    pub settlements: Vec<Settlement>,
    pub premiums: Vec<PremiumSetting>,
    pub allowances: Vec<Allowance>,
    pub total_paid: Amount,
}

/// Balance history of one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHistory {
    pub account: AccountId,
    pub checkpoints: Vec<Checkpoint>,
}

/// Deposits accumulated at one time-index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueBucket {
    pub time_index: TimeIndex,
    pub amount: Amount,
}

/// A paid `(account, time-index)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Settlement {
    pub account: AccountId,
    pub time_index: TimeIndex,
}

/// An account's harvest premium.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumSetting {
    pub account: AccountId,
    pub fraction: PremiumFraction,
}

/// A spender's allowance over an owner's shares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub owner: AccountId,
    pub spender: AccountId,
    pub amount: Amount,
}
