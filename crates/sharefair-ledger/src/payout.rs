//! Seam to the underlying value asset.
//!
//! Harvest settles its bookkeeping first and only then hands the aggregate
//! payments to a [`Payout`] implementation. Implementations must apply a
//! batch of payments all-or-nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sharefair_types::{AccountId, Amount};

use crate::changes::ValueChanges;
use crate::{LedgerError, Result};

/// A single outbound value transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Recipient.
    pub to: AccountId,
    /// Amount of the value asset.
    pub amount: Amount,
}

/// Error reported by a value asset when it cannot apply a payment batch.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PayoutError(pub String);

/// Destination for harvest payouts.
pub trait Payout {
    /// Apply every payment in `payments`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`PayoutError`] if the batch cannot be applied; no payment
    /// in the batch may have taken effect in that case.
    fn pay(&mut self, payments: &[Payment]) -> std::result::Result<(), PayoutError>;
}

/// In-process balances of the value asset.
///
/// Used by the daemon as its value asset and by tests to observe payouts.
/// Like [`Ledger`](crate::Ledger), it can record which balances a run of
/// calls touched so that they can be saved or undone on their own.
#[derive(Clone, Debug, Default)]
pub struct ValueBook {
    balances: HashMap<AccountId, Amount>,
    changes: Option<ValueChanges>,
}

impl ValueBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value held by `account`.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Add `amount` to `account`. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ArithmeticOverflow`] if the balance overflows
    pub fn credit(&mut self, account: AccountId, amount: Amount) -> Result<Amount> {
        let balance = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.set(account, balance);
        Ok(balance)
    }

    /// Remove `amount` from `account`. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientBalance`] if `account` holds less than `amount`
    pub fn debit(&mut self, account: AccountId, amount: Amount) -> Result<Amount> {
        let available = self.balance_of(&account);
        let balance = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                available,
                required: amount,
            })?;
        self.set(account, balance);
        Ok(balance)
    }

    /// Non-zero balances, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &Amount)> {
        self.balances.iter()
    }

    /// Start recording touched balances, discarding any earlier record.
    pub fn begin_changes(&mut self) {
        self.changes = Some(ValueChanges::default());
    }

    /// Stop recording and return the balances touched since
    /// [`ValueBook::begin_changes`].
    pub fn take_changes(&mut self) -> ValueChanges {
        self.changes.take().unwrap_or_default()
    }

    /// Put every balance named in `changes` back to its prior value.
    pub fn revert(&mut self, changes: ValueChanges) {
        for (account, balance) in changes.prior {
            self.set(account, balance);
        }
    }

    fn set(&mut self, account: AccountId, balance: Amount) {
        if let Some(changes) = &mut self.changes {
            let prior = self.balances.get(&account).copied().unwrap_or(0);
            changes.prior.entry(account).or_insert(prior);
        }
        if balance == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }
}

impl FromIterator<(AccountId, Amount)> for ValueBook {
    fn from_iter<I: IntoIterator<Item = (AccountId, Amount)>>(iter: I) -> Self {
        Self {
            balances: iter.into_iter().filter(|(_, v)| *v > 0).collect(),
            changes: None,
        }
    }
}

impl Payout for ValueBook {
    fn pay(&mut self, payments: &[Payment]) -> std::result::Result<(), PayoutError> {
        // Compute every resulting balance before touching any of them.
        let mut staged: HashMap<AccountId, Amount> = HashMap::new();
        for payment in payments {
            let current = staged
                .get(&payment.to)
                .copied()
                .unwrap_or_else(|| self.balance_of(&payment.to));
            let next = current
                .checked_add(payment.amount)
                .ok_or_else(|| PayoutError(format!("balance overflow for {}", payment.to)))?;
            staged.insert(payment.to, next);
        }
        for (account, balance) in staged {
            self.set(account, balance);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: AccountId = AccountId::new([0xA0; 32]);
    const B: AccountId = AccountId::new([0xB0; 32]);

    #[test]
    fn test_credit_debit() {
        let mut book = ValueBook::new();
        assert_eq!(book.credit(A, 100).expect("credit"), 100);
        assert_eq!(book.debit(A, 40).expect("debit"), 60);
        assert!(matches!(
            book.debit(A, 61),
            Err(LedgerError::InsufficientBalance { available: 60, required: 61 })
        ));
        assert_eq!(book.balance_of(&A), 60);
    }

    #[test]
    fn test_revert_restores_touched_balances() {
        let mut book: ValueBook = [(A, 10)].into_iter().collect();
        book.begin_changes();
        book.debit(A, 4).expect("debit");
        book.debit(A, 6).expect("debit");
        book.pay(&[Payment { to: B, amount: 3 }]).expect("pay");

        let changes = book.take_changes();
        assert_eq!(changes.accounts().count(), 2);
        book.revert(changes);
        assert_eq!(book.balance_of(&A), 10);
        assert_eq!(book.balance_of(&B), 0);
        assert_eq!(book.iter().count(), 1);
    }

    #[test]
    fn test_pay_batch() {
        let mut book = ValueBook::new();
        book.pay(&[
            Payment { to: A, amount: 5 },
            Payment { to: B, amount: 7 },
            Payment { to: A, amount: 1 },
        ])
        .expect("pay");
        assert_eq!(book.balance_of(&A), 6);
        assert_eq!(book.balance_of(&B), 7);
    }

    #[test]
    fn test_pay_overflow_applies_nothing() {
        let mut book: ValueBook = [(B, u128::MAX)].into_iter().collect();
        let result = book.pay(&[Payment { to: A, amount: 5 }, Payment { to: B, amount: 1 }]);
        assert!(result.is_err());
        assert_eq!(book.balance_of(&A), 0);
        assert_eq!(book.balance_of(&B), u128::MAX);
    }
}
