//! Transferable share balances backed by checkpoint histories.
//!
//! An account's current balance *is* the latest entry of its history, so a
//! balance change and its checkpoint are a single write and can never
//! diverge. Total supply has its own history, touched only by mint and burn.

use std::collections::HashMap;

use sharefair_types::{AccountId, Amount, TimeIndex};

use crate::checkpoints::{CheckpointStore, Checkpoints, TailMark};
use crate::{LedgerError, Result};

/// Share balances, allowances, and their histories.
#[derive(Clone, Debug, Default)]
pub struct ShareLedger {
    history: CheckpointStore<AccountId>,
    supply: Checkpoints,
    allowances: HashMap<(AccountId, AccountId), Amount>,
}

impl ShareLedger {
    /// Create a ledger with no shares issued.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        history: CheckpointStore<AccountId>,
        supply: Checkpoints,
        allowances: HashMap<(AccountId, AccountId), Amount>,
    ) -> Self {
        Self {
            history,
            supply,
            allowances,
        }
    }

    /// Current balance of `account`.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.history.latest(account)
    }

    /// Current total supply.
    pub fn total_supply(&self) -> Amount {
        self.supply.latest()
    }

    /// Balance of `account` as of `time_index`.
    pub fn past_shares(&self, account: &AccountId, time_index: TimeIndex) -> Amount {
        self.history.query(account, time_index)
    }

    /// Total supply as of `time_index`.
    pub fn past_total_shares(&self, time_index: TimeIndex) -> Amount {
        self.supply.value_at(time_index)
    }

    /// Remaining amount `spender` may move on behalf of `owner`.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Per-account balance histories.
    pub fn histories(&self) -> &CheckpointStore<AccountId> {
        &self.history
    }

    /// Total supply history.
    pub fn supply_history(&self) -> &Checkpoints {
        &self.supply
    }

    /// All non-zero allowances.
    pub fn allowances(&self) -> impl Iterator<Item = (&(AccountId, AccountId), &Amount)> {
        self.allowances.iter()
    }

    /// Move `amount` shares from `from` to `to` as of `now`.
    ///
    /// Both accounts get a checkpoint at `now`, including for self-transfers
    /// and zero amounts.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`
    /// - [`LedgerError::NonMonotonicTime`] if either history is ahead of `now`
    /// - [`LedgerError::ArithmeticOverflow`] if the recipient balance overflows
    pub fn transfer(
        &mut self,
        now: TimeIndex,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        let available = self.balance_of(&from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        self.history.ensure_writable(&from, now)?;
        self.history.ensure_writable(&to, now)?;

        if from == to {
            return self.history.record(from, now, available);
        }

        let to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.history.record(from, now, available - amount)?;
        self.history.record(to, now, to_balance)?;
        Ok(())
    }

    pub(crate) fn rewind_balance(&mut self, account: &AccountId, mark: TailMark) {
        self.history.rewind(account, mark);
    }

    pub(crate) fn rewind_supply(&mut self, mark: TailMark) {
        self.supply.rewind(mark);
    }

    /// Set the allowance of `spender` over `owner`'s shares.
    pub fn approve(&mut self, owner: AccountId, spender: AccountId, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    /// Move shares on behalf of `from`, consuming `spender`'s allowance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientAllowance`] if the allowance is short
    /// - Any error of [`ShareLedger::transfer`]
    pub fn transfer_from(
        &mut self,
        now: TimeIndex,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        let allowed = self.allowance(&from, &spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                available: allowed,
                required: amount,
            });
        }
        self.transfer(now, from, to, amount)?;
        self.approve(from, spender, allowed - amount);
        Ok(())
    }

    /// Issue `amount` new shares to `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ArithmeticOverflow`] if the balance or supply overflows
    /// - [`LedgerError::NonMonotonicTime`] if a history is ahead of `now`
    pub fn mint(&mut self, now: TimeIndex, to: AccountId, amount: Amount) -> Result<()> {
        let balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let supply = self
            .total_supply()
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.history.ensure_writable(&to, now)?;
        self.supply.ensure_writable(now)?;

        self.history.record(to, now, balance)?;
        self.supply.record(now, supply)?;
        Ok(())
    }

    /// Destroy `amount` shares held by `from`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`
    /// - [`LedgerError::NonMonotonicTime`] if a history is ahead of `now`
    pub fn burn(&mut self, now: TimeIndex, from: AccountId, amount: Amount) -> Result<()> {
        let available = self.balance_of(&from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        let supply = self
            .total_supply()
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.history.ensure_writable(&from, now)?;
        self.supply.ensure_writable(now)?;

        self.history.record(from, now, available - amount)?;
        self.supply.record(now, supply)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: AccountId = AccountId::new([0x01; 32]);
    const ALICE: AccountId = AccountId::new([0x02; 32]);
    const BOB: AccountId = AccountId::new([0x03; 32]);

    fn issued(supply: Amount) -> ShareLedger {
        let mut ledger = ShareLedger::new();
        ledger.mint(1, ISSUER, supply).expect("mint");
        ledger
    }

    #[test]
    fn test_mint_updates_supply() {
        let ledger = issued(1_000_000);
        assert_eq!(ledger.balance_of(&ISSUER), 1_000_000);
        assert_eq!(ledger.total_supply(), 1_000_000);
        assert_eq!(ledger.past_total_shares(0), 0);
        assert_eq!(ledger.past_total_shares(1), 1_000_000);
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = issued(1_000_000);
        ledger.transfer(2, ISSUER, ALICE, 150_000).expect("transfer");
        ledger.transfer(3, ISSUER, BOB, 200_000).expect("transfer");

        assert_eq!(ledger.balance_of(&ISSUER), 650_000);
        assert_eq!(ledger.balance_of(&ALICE), 150_000);
        assert_eq!(ledger.balance_of(&BOB), 200_000);
        assert_eq!(ledger.total_supply(), 1_000_000);
        // Transfers never touch the supply history.
        assert_eq!(ledger.supply_history().len(), 1);
    }

    #[test]
    fn test_transfer_insufficient_balance_leaves_state() {
        let mut ledger = issued(100);
        ledger.transfer(2, ISSUER, ALICE, 40).expect("transfer");

        let err = ledger.transfer(3, ALICE, BOB, 41).expect_err("rejected");
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { available: 40, required: 41 }
        ));
        assert_eq!(ledger.histories().history(&ALICE).map(Checkpoints::len), Some(1));
        assert!(ledger.histories().history(&BOB).is_none());
    }

    #[test]
    fn test_self_and_zero_transfers_record_checkpoints() {
        let mut ledger = issued(100);
        ledger.transfer(5, ISSUER, ISSUER, 60).expect("self transfer");
        ledger.transfer(6, ISSUER, ALICE, 0).expect("zero transfer");

        assert_eq!(ledger.balance_of(&ISSUER), 100);
        assert_eq!(ledger.balance_of(&ALICE), 0);
        let issuer_history = ledger.histories().history(&ISSUER).expect("history");
        assert_eq!(issuer_history.last_time_index(), Some(6));
        assert_eq!(
            ledger.histories().history(&ALICE).and_then(Checkpoints::last_time_index),
            Some(6)
        );
    }

    #[test]
    fn test_self_transfer_over_balance_rejected() {
        let mut ledger = issued(100);
        assert!(ledger.transfer(2, ISSUER, ISSUER, 101).is_err());
    }

    #[test]
    fn test_past_shares_survive_transfers() {
        let mut ledger = issued(1_000);
        ledger.transfer(2, ISSUER, ALICE, 150).expect("transfer");
        for t in 3..20 {
            ledger.transfer(t, ISSUER, ALICE, 10).expect("transfer");
        }
        assert_eq!(ledger.past_shares(&ALICE, 2), 150);
        assert_eq!(ledger.past_shares(&ALICE, 1), 0);
        assert_eq!(ledger.balance_of(&ALICE), 150 + 17 * 10);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut ledger = issued(1_000);
        ledger.approve(ISSUER, ALICE, 300);

        ledger.transfer_from(2, ALICE, ISSUER, BOB, 200).expect("transfer_from");
        assert_eq!(ledger.allowance(&ISSUER, &ALICE), 100);
        assert_eq!(ledger.balance_of(&BOB), 200);

        let err = ledger.transfer_from(3, ALICE, ISSUER, BOB, 101).expect_err("rejected");
        assert!(matches!(
            err,
            LedgerError::InsufficientAllowance { available: 100, required: 101 }
        ));
        assert_eq!(ledger.balance_of(&BOB), 200);
    }

    #[test]
    fn test_transfer_from_failure_keeps_allowance() {
        let mut ledger = issued(50);
        ledger.approve(ISSUER, ALICE, 500);
        assert!(ledger.transfer_from(2, ALICE, ISSUER, BOB, 100).is_err());
        assert_eq!(ledger.allowance(&ISSUER, &ALICE), 500);
    }

    #[test]
    fn test_burn() {
        let mut ledger = issued(1_000);
        ledger.burn(4, ISSUER, 400).expect("burn");
        assert_eq!(ledger.total_supply(), 600);
        assert_eq!(ledger.past_total_shares(3), 1_000);
        assert!(ledger.burn(5, ISSUER, 601).is_err());
    }

    #[test]
    fn test_backwards_time_rejected_without_partial_write() {
        let mut ledger = issued(1_000);
        ledger.transfer(10, ISSUER, ALICE, 100).expect("transfer");
        // BOB has no history, ALICE is at 10: the whole transfer must fail.
        assert!(ledger.transfer(9, BOB, ALICE, 0).is_err());
        assert!(ledger.histories().history(&BOB).is_none());
    }
}
