//! Change tracking across ledger calls.
//!
//! While tracking is on, every mutating [`Ledger`](crate::Ledger) call notes
//! which rows it touches together with their state before the first touch.
//! The resulting [`ChangeSet`] serves two purposes: it names the rows a
//! store has to rewrite ([`Ledger::delta`](crate::Ledger::delta)), and it
//! carries what is needed to undo the calls
//! ([`Ledger::revert`](crate::Ledger::revert)). Both cost time proportional
//! to what the calls touched, not to the size of the ledger.

use std::collections::HashMap;

use sharefair_types::{AccountId, Amount, PremiumFraction, TimeIndex};

use crate::checkpoints::TailMark;

/// Rows touched since tracking began, with their prior state.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub(crate) high_water: TimeIndex,
    pub(crate) total_received: Amount,
    pub(crate) total_paid: Amount,
    pub(crate) balances: HashMap<AccountId, TailMark>,
    pub(crate) supply: Option<TailMark>,
    pub(crate) allowances: HashMap<(AccountId, AccountId), Amount>,
    pub(crate) revenue: HashMap<TimeIndex, Amount>,
    pub(crate) premiums: HashMap<AccountId, PremiumFraction>,
    pub(crate) settlements: Vec<(AccountId, TimeIndex)>,
}

impl ChangeSet {
    pub(crate) fn new(high_water: TimeIndex, total_received: Amount, total_paid: Amount) -> Self {
        Self {
            high_water,
            total_received,
            total_paid,
            ..Self::default()
        }
    }

    /// Whether no row was touched.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.supply.is_none()
            && self.allowances.is_empty()
            && self.revenue.is_empty()
            && self.premiums.is_empty()
            && self.settlements.is_empty()
    }

    pub(crate) fn touch_balance(&mut self, account: AccountId, mark: TailMark) {
        self.balances.entry(account).or_insert(mark);
    }

    pub(crate) fn touch_supply(&mut self, mark: TailMark) {
        self.supply.get_or_insert(mark);
    }

    pub(crate) fn touch_allowance(&mut self, owner: AccountId, spender: AccountId, prior: Amount) {
        self.allowances.entry((owner, spender)).or_insert(prior);
    }

    pub(crate) fn touch_revenue(&mut self, time_index: TimeIndex, prior: Amount) {
        self.revenue.entry(time_index).or_insert(prior);
    }

    pub(crate) fn touch_premium(&mut self, account: AccountId, prior: PremiumFraction) {
        self.premiums.entry(account).or_insert(prior);
    }
}

/// Value-book accounts touched since tracking began, with their prior balances.
#[derive(Clone, Debug, Default)]
pub struct ValueChanges {
    pub(crate) prior: HashMap<AccountId, Amount>,
}

impl ValueChanges {
    /// Accounts whose balance may have changed.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.prior.keys()
    }

    /// Whether no account was touched.
    pub fn is_empty(&self) -> bool {
        self.prior.is_empty()
    }
}
