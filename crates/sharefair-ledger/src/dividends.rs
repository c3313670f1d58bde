//! Settlement table, harvest premiums, and harvest planning.
//!
//! A harvest settles a holder's share of past deposits:
//!
//! ```text
//! dividend(t) = revenue(t) * past_shares(holder, t) / past_total_shares(t)
//! premium(t)  = dividend(t) * premium_fraction / 255
//! ```
//!
//! Both divisions truncate and the remainder is forfeited. Each
//! `(holder, t)` pair moves from recorded to settled exactly once.
//!
//! Planning is read-only; [`DividendEngine::commit`] applies a plan to the
//! settlement table. Time-indexes at or after `now` are still open (more
//! deposits may arrive in the same time-index) and are left untouched.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sharefair_types::{AccountId, Amount, PremiumFraction, TimeIndex, PREMIUM_DENOMINATOR};

use crate::math::mul_div;
use crate::payout::Payment;
use crate::revenue::RevenueReceiver;
use crate::shares::ShareLedger;
use crate::{LedgerError, Result};

/// One settled `(holder, time-index)` pair within a harvest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledEntry {
    /// The settled time-index.
    pub time_index: TimeIndex,
    /// Holder's full dividend for this time-index.
    pub dividend: Amount,
    /// Portion of `dividend` owed to the operator.
    pub premium: Amount,
}

/// Outcome of a harvest (or a dry run of one).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestReceipt {
    /// Holder whose dividends were settled.
    pub account: AccountId,
    /// Caller that triggered the harvest.
    pub operator: AccountId,
    /// Entries settled by this harvest, in request order.
    pub entries: Vec<SettledEntry>,
    /// Sum of dividends.
    pub total: Amount,
    /// Sum of premiums, paid to `operator`.
    pub premium: Amount,
    /// `total - premium`, paid to `account`.
    pub net: Amount,
}

impl HarvestReceipt {
    /// Outbound payments, skipping zero amounts.
    pub fn payments(&self) -> Vec<Payment> {
        [
            Payment {
                to: self.operator,
                amount: self.premium,
            },
            Payment {
                to: self.account,
                amount: self.net,
            },
        ]
        .into_iter()
        .filter(|p| p.amount > 0)
        .collect()
    }

    /// Time-indexes settled by this harvest.
    pub fn settled_time_indexes(&self) -> impl Iterator<Item = TimeIndex> + '_ {
        self.entries.iter().map(|e| e.time_index)
    }
}

/// Settlement state and per-holder premiums.
#[derive(Clone, Debug, Default)]
pub struct DividendEngine {
    settled: HashSet<(AccountId, TimeIndex)>,
    premiums: HashMap<AccountId, PremiumFraction>,
    total_paid: Amount,
}

impl DividendEngine {
    /// Create an engine with nothing settled.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        settled: HashSet<(AccountId, TimeIndex)>,
        premiums: HashMap<AccountId, PremiumFraction>,
        total_paid: Amount,
    ) -> Self {
        Self {
            settled,
            premiums,
            total_paid,
        }
    }

    /// Premium fraction `account` grants to harvest operators.
    pub fn premium_of(&self, account: &AccountId) -> PremiumFraction {
        self.premiums.get(account).copied().unwrap_or_default()
    }

    /// Whether `(account, time_index)` has been paid.
    pub fn is_settled(&self, account: &AccountId, time_index: TimeIndex) -> bool {
        self.settled.contains(&(*account, time_index))
    }

    /// Sum of every dividend paid out, premiums included.
    pub fn total_paid(&self) -> Amount {
        self.total_paid
    }

    /// All settled pairs, in arbitrary order.
    pub fn settlements(&self) -> impl Iterator<Item = &(AccountId, TimeIndex)> {
        self.settled.iter()
    }

    /// All non-zero premiums, in arbitrary order.
    pub fn premiums(&self) -> impl Iterator<Item = (&AccountId, &PremiumFraction)> {
        self.premiums.iter()
    }

    /// Set the premium `account` grants to harvest operators.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not `account`
    /// - [`LedgerError::InvalidPremium`] if `fraction` exceeds 255
    pub fn set_premium(
        &mut self,
        caller: AccountId,
        account: AccountId,
        fraction: u32,
    ) -> Result<PremiumFraction> {
        if caller != account {
            return Err(LedgerError::Unauthorized { caller, account });
        }
        let premium = PremiumFraction::try_from(fraction)
            .map_err(|_| LedgerError::InvalidPremium(fraction))?;

        if premium == PremiumFraction::ZERO {
            self.premiums.remove(&account);
        } else {
            self.premiums.insert(account, premium);
        }
        Ok(premium)
    }

    /// Compute what harvesting `time_indexes` for `account` would settle.
    ///
    /// Already-settled, duplicate, and still-open time-indexes contribute
    /// nothing and are left out of the receipt. Past time-indexes with no
    /// revenue are included with a zero dividend so that committing the plan
    /// settles them.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ConsistencyViolation`] if a time-index has revenue but
    ///   zero total supply
    /// - [`LedgerError::ArithmeticOverflow`] if a sum overflows
    pub fn plan(
        &self,
        operator: AccountId,
        account: AccountId,
        time_indexes: &[TimeIndex],
        now: TimeIndex,
        shares: &ShareLedger,
        revenue: &RevenueReceiver,
    ) -> Result<HarvestReceipt> {
        let fraction = u128::from(self.premium_of(&account).get());
        let denominator = u128::from(PREMIUM_DENOMINATOR);

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut total: Amount = 0;
        let mut premium: Amount = 0;

        for &time_index in time_indexes {
            if time_index >= now {
                tracing::trace!(time_index, now, "harvest: skipping open time-index");
                continue;
            }
            if !seen.insert(time_index) || self.is_settled(&account, time_index) {
                continue;
            }

            let received = revenue.revenue_at(time_index);
            let dividend = if received == 0 {
                0
            } else {
                let total_shares = shares.past_total_shares(time_index);
                if total_shares == 0 {
                    return Err(LedgerError::ConsistencyViolation { time_index });
                }
                let holder_shares = shares.past_shares(&account, time_index);
                mul_div(received, holder_shares, total_shares)?
            };
            let entry_premium = mul_div(dividend, fraction, denominator)?;

            total = total
                .checked_add(dividend)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            premium = premium
                .checked_add(entry_premium)
                .ok_or(LedgerError::ArithmeticOverflow)?;

            tracing::trace!(time_index, dividend, premium = entry_premium, "harvest: entry");
            entries.push(SettledEntry {
                time_index,
                dividend,
                premium: entry_premium,
            });
        }

        Ok(HarvestReceipt {
            account,
            operator,
            entries,
            total,
            premium,
            // Each entry premium is at most its dividend.
            net: total - premium,
        })
    }

    /// Mark every entry of `receipt` as settled.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ArithmeticOverflow`] if the paid total overflows
    pub fn commit(&mut self, receipt: &HarvestReceipt) -> Result<()> {
        let total_paid = self
            .total_paid
            .checked_add(receipt.total)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        for time_index in receipt.settled_time_indexes() {
            self.settled.insert((receipt.account, time_index));
        }
        self.total_paid = total_paid;
        Ok(())
    }

    /// Drop `settlements` and put premiums and the paid total back to
    /// earlier values.
    pub(crate) fn reset(
        &mut self,
        settlements: &[(AccountId, TimeIndex)],
        premiums: HashMap<AccountId, PremiumFraction>,
        total_paid: Amount,
    ) {
        for pair in settlements {
            self.settled.remove(pair);
        }
        for (account, premium) in premiums {
            if premium == PremiumFraction::ZERO {
                self.premiums.remove(&account);
            } else {
                self.premiums.insert(account, premium);
            }
        }
        self.total_paid = total_paid;
    }

    /// Undo [`DividendEngine::commit`] for a harvest whose payout failed.
    pub fn rollback(&mut self, receipt: &HarvestReceipt) {
        for time_index in receipt.settled_time_indexes() {
            self.settled.remove(&(receipt.account, time_index));
        }
        self.total_paid = self.total_paid.saturating_sub(receipt.total);
    }
}
