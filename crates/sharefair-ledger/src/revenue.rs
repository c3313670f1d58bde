//! Deposit buckets keyed by time-index.
//!
//! Every deposit lands in the bucket of the time-index it arrived at;
//! deposits sharing a time-index accumulate. Buckets are never decremented:
//! they are the permanent record of what arrived, and payouts are tracked
//! separately by the dividend engine.

use std::collections::{BTreeMap, HashMap};

use sharefair_types::{Amount, TimeIndex};

use crate::{LedgerError, Result};

/// Revenue received, per time-index.
#[derive(Clone, Debug, Default)]
pub struct RevenueReceiver {
    buckets: BTreeMap<TimeIndex, Amount>,
    total_received: Amount,
}

impl RevenueReceiver {
    /// Create an empty receiver.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_buckets(buckets: BTreeMap<TimeIndex, Amount>) -> Result<Self> {
        let total_received = buckets
            .values()
            .try_fold(0u128, |acc, v| acc.checked_add(*v))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(Self {
            buckets,
            total_received,
        })
    }

    /// Record `amount` arriving at `now`. Returns the bucket's new total.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ArithmeticOverflow`] if the bucket or running total overflows
    pub fn receive(&mut self, now: TimeIndex, amount: Amount) -> Result<Amount> {
        let bucket = self
            .revenue_at(now)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total = self
            .total_received
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        if bucket > 0 {
            self.buckets.insert(now, bucket);
        }
        self.total_received = total;
        Ok(bucket)
    }

    /// Put `buckets` and the running total back to earlier values.
    pub(crate) fn reset(&mut self, buckets: HashMap<TimeIndex, Amount>, total_received: Amount) {
        for (time_index, amount) in buckets {
            if amount == 0 {
                self.buckets.remove(&time_index);
            } else {
                self.buckets.insert(time_index, amount);
            }
        }
        self.total_received = total_received;
    }

    /// Accumulated deposits at exactly `time_index`.
    pub fn revenue_at(&self, time_index: TimeIndex) -> Amount {
        self.buckets.get(&time_index).copied().unwrap_or(0)
    }

    /// Sum of every deposit ever received.
    pub fn total_received(&self) -> Amount {
        self.total_received
    }

    /// Non-empty buckets in time order.
    pub fn buckets(&self) -> impl Iterator<Item = (TimeIndex, Amount)> + '_ {
        self.buckets.iter().map(|(t, v)| (*t, *v))
    }
}
