//! The ledger facade.
//!
//! [`Ledger`] owns the share ledger, the revenue receiver, and the dividend
//! engine, and is the only place that mutates them. Every mutating call takes
//! the ambient `now` and rejects a clock that moved backwards before touching
//! any state. A call either applies all of its effects or none of them.
//!
//! A caller that needs a run of calls to be all-or-nothing, or that persists
//! the ledger incrementally, brackets the run with
//! [`Ledger::begin_changes`] and [`Ledger::take_changes`].

use std::collections::{BTreeMap, HashMap, HashSet};

use sharefair_types::{AccountId, Amount, PremiumFraction, TimeIndex};

use crate::changes::ChangeSet;
use crate::checkpoints::{CheckpointStore, Checkpoints};
use crate::dividends::{DividendEngine, HarvestReceipt};
use crate::payout::Payout;
use crate::revenue::RevenueReceiver;
use crate::shares::ShareLedger;
use crate::snapshot::{
    AccountHistory, Allowance, LedgerDelta, LedgerSnapshot, PremiumSetting, RevenueBucket,
    Settlement,
};
use crate::{LedgerError, Result};

/// Checkpointed share ledger with pro-rata revenue distribution.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    shares: ShareLedger,
    revenue: RevenueReceiver,
    dividends: DividendEngine,
    high_water: TimeIndex,
    changes: Option<ChangeSet>,
}

impl Ledger {
    /// Create an empty ledger with no shares issued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger whose entire initial supply belongs to `issuer`.
    ///
    /// # Errors
    ///
    /// See [`Ledger::mint`].
    pub fn with_issuance(now: TimeIndex, issuer: AccountId, supply: Amount) -> Result<Self> {
        let mut ledger = Self::new();
        ledger.mint(now, issuer, supply)?;
        Ok(ledger)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Current share balance of `account`.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.shares.balance_of(account)
    }

    /// Current total share supply.
    pub fn total_supply(&self) -> Amount {
        self.shares.total_supply()
    }

    /// Shares `account` held as of `time_index`.
    pub fn past_shares(&self, account: &AccountId, time_index: TimeIndex) -> Amount {
        self.shares.past_shares(account, time_index)
    }

    /// Total supply as of `time_index`.
    pub fn past_total_shares(&self, time_index: TimeIndex) -> Amount {
        self.shares.past_total_shares(time_index)
    }

    /// Remaining amount `spender` may move on behalf of `owner`.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.shares.allowance(owner, spender)
    }

    /// Premium `account` grants to harvest operators.
    pub fn premium_of(&self, account: &AccountId) -> PremiumFraction {
        self.dividends.premium_of(account)
    }

    /// Deposits recorded at exactly `time_index`.
    pub fn revenue_at(&self, time_index: TimeIndex) -> Amount {
        self.revenue.revenue_at(time_index)
    }

    /// Whether `(account, time_index)` has been paid.
    pub fn is_settled(&self, account: &AccountId, time_index: TimeIndex) -> bool {
        self.dividends.is_settled(account, time_index)
    }

    /// Value received and not yet paid out, including forfeited remainders.
    pub fn held_value(&self) -> Amount {
        self.revenue
            .total_received()
            .saturating_sub(self.dividends.total_paid())
    }

    /// Highest time-index observed by a mutating call.
    pub fn high_water(&self) -> TimeIndex {
        self.high_water
    }

    /// Share balances and histories.
    pub fn shares(&self) -> &ShareLedger {
        &self.shares
    }

    /// Revenue buckets.
    pub fn revenue(&self) -> &RevenueReceiver {
        &self.revenue
    }

    /// Settlement state and premiums.
    pub fn dividends(&self) -> &DividendEngine {
        &self.dividends
    }

    // ------------------------------------------------------------------
    // Share operations
    // ------------------------------------------------------------------

    /// Move `amount` shares from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonMonotonicTime`] if `now` is behind the ledger clock
    /// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`
    /// - [`LedgerError::ArithmeticOverflow`] if the recipient balance overflows
    pub fn transfer(
        &mut self,
        now: TimeIndex,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.check_clock(now)?;
        self.touch_balance(from);
        self.touch_balance(to);
        self.shares
            .transfer(now, from, to, amount)
            .inspect_err(|e| tracing::warn!(%from, %to, amount, "transfer rejected: {e}"))?;
        self.advance(now);
        tracing::debug!(%from, %to, amount, now, "shares transferred");
        Ok(())
    }

    /// Allow `spender` to move up to `amount` of `owner`'s shares.
    pub fn approve(&mut self, owner: AccountId, spender: AccountId, amount: Amount) {
        self.touch_allowance(owner, spender);
        self.shares.approve(owner, spender, amount);
        tracing::debug!(%owner, %spender, amount, "allowance set");
    }

    /// Move shares from `from` to `to` on `spender`'s allowance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientAllowance`] if the allowance is short
    /// - Any error of [`Ledger::transfer`]
    pub fn transfer_from(
        &mut self,
        now: TimeIndex,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.check_clock(now)?;
        self.touch_balance(from);
        self.touch_balance(to);
        self.touch_allowance(from, spender);
        self.shares
            .transfer_from(now, spender, from, to, amount)
            .inspect_err(|e| tracing::warn!(%spender, %from, %to, amount, "transfer_from rejected: {e}"))?;
        self.advance(now);
        tracing::debug!(%spender, %from, %to, amount, now, "shares transferred on allowance");
        Ok(())
    }

    /// Issue new shares to `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonMonotonicTime`] if `now` is behind the ledger clock
    /// - [`LedgerError::ArithmeticOverflow`] if the balance or supply overflows
    pub fn mint(&mut self, now: TimeIndex, to: AccountId, amount: Amount) -> Result<()> {
        self.check_clock(now)?;
        self.touch_balance(to);
        self.touch_supply();
        self.shares.mint(now, to, amount)?;
        self.advance(now);
        tracing::info!(%to, amount, supply = self.total_supply(), "shares minted");
        Ok(())
    }

    /// Destroy shares held by `from`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonMonotonicTime`] if `now` is behind the ledger clock
    /// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`
    pub fn burn(&mut self, now: TimeIndex, from: AccountId, amount: Amount) -> Result<()> {
        self.check_clock(now)?;
        self.touch_balance(from);
        self.touch_supply();
        self.shares.burn(now, from, amount)?;
        self.advance(now);
        tracing::info!(%from, amount, supply = self.total_supply(), "shares burned");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Revenue and dividends
    // ------------------------------------------------------------------

    /// Record `amount` of inbound value at `now`. Returns the bucket total.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonMonotonicTime`] if `now` is behind the ledger clock
    /// - [`LedgerError::ArithmeticOverflow`] if the bucket overflows
    pub fn receive(&mut self, now: TimeIndex, amount: Amount) -> Result<Amount> {
        self.check_clock(now)?;
        if let Some(changes) = &mut self.changes {
            changes.touch_revenue(now, self.revenue.revenue_at(now));
        }
        let bucket = self.revenue.receive(now, amount).inspect_err(|e| {
            tracing::error!(now, amount, "revenue accounting failed: {e}");
        })?;
        self.advance(now);
        tracing::debug!(now, amount, bucket, "revenue received");
        Ok(bucket)
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
        if let Some(changes) = &mut self.changes {
            changes.touch_premium(account, self.dividends.premium_of(&account));
        }
        let premium = self
            .dividends
            .set_premium(caller, account, fraction)
            .inspect_err(|e| tracing::warn!(%caller, %account, fraction, "set_premium rejected: {e}"))?;
        tracing::info!(%account, premium = premium.get(), "harvest premium set");
        Ok(premium)
    }

    /// Settle and pay `account`'s dividends for `time_indexes`.
    ///
    /// Any caller may act as `operator`. Settlement state is committed before
    /// `payout` runs; the premium goes to `operator` and the rest to
    /// `account`. If `payout` fails, the settlements are undone and the error
    /// is returned.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonMonotonicTime`] if `now` is behind the ledger clock
    /// - [`LedgerError::ConsistencyViolation`] on revenue with zero total supply
    /// - [`LedgerError::ArithmeticOverflow`] if a sum overflows
    /// - [`LedgerError::Payout`] if the value asset rejects the payments
    pub fn harvest_batch<P: Payout + ?Sized>(
        &mut self,
        now: TimeIndex,
        operator: AccountId,
        account: AccountId,
        time_indexes: &[TimeIndex],
        payout: &mut P,
    ) -> Result<HarvestReceipt> {
        self.check_clock(now)?;
        let receipt = self
            .dividends
            .plan(operator, account, time_indexes, now, &self.shares, &self.revenue)
            .inspect_err(|e| tracing::error!(%account, "harvest aborted: {e}"))?;
        self.dividends.commit(&receipt)?;

        let payments = receipt.payments();
        if !payments.is_empty() {
            if let Err(e) = payout.pay(&payments) {
                self.dividends.rollback(&receipt);
                tracing::warn!(%account, %operator, "harvest payout failed, settlements rolled back: {e}");
                return Err(e.into());
            }
        }
        if let Some(changes) = &mut self.changes {
            changes
                .settlements
                .extend(receipt.settled_time_indexes().map(|t| (account, t)));
        }
        self.advance(now);

        tracing::info!(
            %account,
            %operator,
            settled = receipt.entries.len(),
            total = receipt.total,
            premium = receipt.premium,
            net = receipt.net,
            "dividends harvested"
        );
        Ok(receipt)
    }

    /// Dry run of [`Ledger::harvest_batch`] with `account` as its own operator.
    ///
    /// # Errors
    ///
    /// Same as the planning step of [`Ledger::harvest_batch`].
    pub fn pending_dividends(
        &self,
        account: AccountId,
        time_indexes: &[TimeIndex],
        now: TimeIndex,
    ) -> Result<HarvestReceipt> {
        self.dividends
            .plan(account, account, time_indexes, now, &self.shares, &self.revenue)
    }

    // ------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------

    /// Start recording the rows mutating calls touch, discarding any
    /// earlier record.
    pub fn begin_changes(&mut self) {
        self.changes = Some(ChangeSet::new(
            self.high_water,
            self.revenue.total_received(),
            self.dividends.total_paid(),
        ));
    }

    /// Stop recording and return what was touched since
    /// [`Ledger::begin_changes`]. Empty if tracking was off.
    pub fn take_changes(&mut self) -> ChangeSet {
        self.changes.take().unwrap_or_else(|| {
            ChangeSet::new(
                self.high_water,
                self.revenue.total_received(),
                self.dividends.total_paid(),
            )
        })
    }

    /// Current values of the rows named by `changes`.
    pub fn delta(&self, changes: &ChangeSet) -> LedgerDelta {
        let mut balance_checkpoints: Vec<AccountHistory> = changes
            .balances
            .iter()
            .map(|(account, mark)| AccountHistory {
                account: *account,
                checkpoints: self.shares.histories().since(account, *mark).to_vec(),
            })
            .filter(|h| !h.checkpoints.is_empty())
            .collect();
        balance_checkpoints.sort_by_key(|h| h.account);

        let mut revenue: Vec<RevenueBucket> = changes
            .revenue
            .keys()
            .map(|&time_index| RevenueBucket {
                time_index,
                amount: self.revenue.revenue_at(time_index),
            })
            .filter(|b| b.amount > 0)
            .collect();
        revenue.sort_by_key(|b| b.time_index);

        let mut premiums: Vec<PremiumSetting> = changes
            .premiums
            .keys()
            .map(|account| PremiumSetting {
                account: *account,
                fraction: self.dividends.premium_of(account),
            })
            .collect();
        premiums.sort_by_key(|p| p.account);

        let mut allowances: Vec<Allowance> = changes
            .allowances
            .keys()
            .map(|(owner, spender)| Allowance {
                owner: *owner,
                spender: *spender,
                amount: self.shares.allowance(owner, spender),
            })
            .collect();
        allowances.sort_by_key(|a| (a.owner, a.spender));

        LedgerDelta {
            high_water: self.high_water,
            balance_checkpoints,
            supply_checkpoints: changes
                .supply
                .map(|mark| self.shares.supply_history().since(mark).to_vec())
                .unwrap_or_default(),
            revenue,
            settlements: changes
                .settlements
                .iter()
                .map(|&(account, time_index)| Settlement {
                    account,
                    time_index,
                })
                .collect(),
            premiums,
            allowances,
            total_paid: self.dividends.total_paid(),
        }
    }

    /// Undo every call recorded in `changes`.
    pub fn revert(&mut self, changes: ChangeSet) {
        for (account, mark) in &changes.balances {
            self.shares.rewind_balance(account, *mark);
        }
        if let Some(mark) = changes.supply {
            self.shares.rewind_supply(mark);
        }
        for ((owner, spender), amount) in changes.allowances {
            self.shares.approve(owner, spender, amount);
        }
        self.revenue.reset(changes.revenue, changes.total_received);
        self.dividends
            .reset(&changes.settlements, changes.premiums, changes.total_paid);
        self.high_water = changes.high_water;
        tracing::debug!(high_water = self.high_water, "ledger changes reverted");
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Export the complete ledger state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut balance_histories: Vec<AccountHistory> = self
            .shares
            .histories()
            .iter()
            .map(|(account, history)| AccountHistory {
                account: *account,
                checkpoints: history.entries().to_vec(),
            })
            .collect();
        balance_histories.sort_by_key(|h| h.account);

        let mut settlements: Vec<Settlement> = self
            .dividends
            .settlements()
            .map(|(account, time_index)| Settlement {
                account: *account,
                time_index: *time_index,
            })
            .collect();
        settlements.sort();

        let mut premiums: Vec<PremiumSetting> = self
            .dividends
            .premiums()
            .map(|(account, fraction)| PremiumSetting {
                account: *account,
                fraction: *fraction,
            })
            .collect();
        premiums.sort_by_key(|p| p.account);

        let mut allowances: Vec<Allowance> = self
            .shares
            .allowances()
            .map(|((owner, spender), amount)| Allowance {
                owner: *owner,
                spender: *spender,
                amount: *amount,
            })
            .collect();
        allowances.sort_by_key(|a| (a.owner, a.spender));

        LedgerSnapshot {
            high_water: self.high_water,
            balance_histories,
            supply_history: self.shares.supply_history().entries().to_vec(),
            revenue: self
                .revenue
                .buckets()
                .map(|(time_index, amount)| RevenueBucket { time_index, amount })
                .collect(),
            settlements,
            premiums,
            allowances,
            total_paid: self.dividends.total_paid(),
        }
    }

    /// Rebuild a ledger from a snapshot, checking its invariants.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSnapshot`] if any invariant does not hold
    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self> {
        let high_water = snapshot.high_water;
        let after_clock = |what: &str, t: TimeIndex| {
            LedgerError::InvalidSnapshot(format!("{what} at {t} is after high-water {high_water}"))
        };

        let mut history = CheckpointStore::new();
        let mut balance_sum: Amount = 0;
        for entry in snapshot.balance_histories {
            let checkpoints = Checkpoints::from_entries(entry.checkpoints)?;
            if let Some(t) = checkpoints.last_time_index().filter(|t| *t > high_water) {
                return Err(after_clock("balance checkpoint", t));
            }
            if history.history(&entry.account).is_some() {
                return Err(LedgerError::InvalidSnapshot(format!(
                    "duplicate history for {}",
                    entry.account
                )));
            }
            balance_sum = balance_sum
                .checked_add(checkpoints.latest())
                .ok_or(LedgerError::ArithmeticOverflow)?;
            history.insert_history(entry.account, checkpoints);
        }

        let supply = Checkpoints::from_entries(snapshot.supply_history)?;
        if let Some(t) = supply.last_time_index().filter(|t| *t > high_water) {
            return Err(after_clock("supply checkpoint", t));
        }
        if balance_sum != supply.latest() {
            return Err(LedgerError::InvalidSnapshot(format!(
                "balances sum to {balance_sum}, supply is {}",
                supply.latest()
            )));
        }

        let mut buckets = BTreeMap::new();
        for bucket in snapshot.revenue {
            if bucket.time_index > high_water {
                return Err(after_clock("revenue", bucket.time_index));
            }
            if buckets.insert(bucket.time_index, bucket.amount).is_some() {
                return Err(LedgerError::InvalidSnapshot(format!(
                    "duplicate revenue bucket at {}",
                    bucket.time_index
                )));
            }
        }
        let revenue = RevenueReceiver::from_buckets(buckets)?;
        if snapshot.total_paid > revenue.total_received() {
            return Err(LedgerError::InvalidSnapshot(format!(
                "paid {} exceeds received {}",
                snapshot.total_paid,
                revenue.total_received()
            )));
        }

        let mut settled = HashSet::new();
        for s in snapshot.settlements {
            // Only closed time-indexes are ever settled.
            if s.time_index >= high_water {
                return Err(after_clock("settlement", s.time_index));
            }
            settled.insert((s.account, s.time_index));
        }

        let premiums: HashMap<_, _> = snapshot
            .premiums
            .into_iter()
            .map(|p| (p.account, p.fraction))
            .collect();
        let allowances: HashMap<_, _> = snapshot
            .allowances
            .into_iter()
            .filter(|a| a.amount > 0)
            .map(|a| ((a.owner, a.spender), a.amount))
            .collect();

        Ok(Self {
            shares: ShareLedger::from_parts(history, supply, allowances),
            revenue,
            dividends: DividendEngine::from_parts(settled, premiums, snapshot.total_paid),
            high_water,
            changes: None,
        })
    }

    fn check_clock(&self, now: TimeIndex) -> Result<()> {
        if now < self.high_water {
            return Err(LedgerError::NonMonotonicTime {
                last: self.high_water,
                new: now,
            });
        }
        Ok(())
    }

    fn advance(&mut self, now: TimeIndex) {
        self.high_water = self.high_water.max(now);
    }

    fn touch_balance(&mut self, account: AccountId) {
        if let Some(changes) = &mut self.changes {
            changes.touch_balance(account, self.shares.histories().mark(&account));
        }
    }

    fn touch_supply(&mut self) {
        if let Some(changes) = &mut self.changes {
            changes.touch_supply(self.shares.supply_history().mark());
        }
    }

    fn touch_allowance(&mut self, owner: AccountId, spender: AccountId) {
        if let Some(changes) = &mut self.changes {
            changes.touch_allowance(owner, spender, self.shares.allowance(&owner, &spender));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payout::{Payment, PayoutError, ValueBook};

    const ISSUER: AccountId = AccountId::new([0x01; 32]);
    const ALICE: AccountId = AccountId::new([0x02; 32]);
    const BOB: AccountId = AccountId::new([0x03; 32]);
    const OPERATOR: AccountId = AccountId::new([0x0E; 32]);

    struct Refusing;

    impl Payout for Refusing {
        fn pay(&mut self, _payments: &[Payment]) -> std::result::Result<(), PayoutError> {
            Err(PayoutError("refused".to_string()))
        }
    }

    fn ledger() -> Ledger {
        let mut ledger = Ledger::with_issuance(1, ISSUER, 1_000_000).expect("issue");
        ledger.transfer(2, ISSUER, ALICE, 150_000).expect("transfer");
        ledger.transfer(3, ISSUER, BOB, 200_000).expect("transfer");
        ledger
    }

    #[test]
    fn test_clock_cannot_go_backwards() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.transfer(2, ISSUER, ALICE, 1),
            Err(LedgerError::NonMonotonicTime { last: 3, new: 2 })
        ));
        assert!(ledger.receive(1, 5).is_err());
        assert_eq!(ledger.revenue_at(1), 0);
        assert_eq!(ledger.balance_of(&ALICE), 150_000);
    }

    #[test]
    fn test_harvest_pays_and_settles() {
        let mut ledger = ledger();
        let mut book = ValueBook::new();
        ledger.receive(4, 1_000).expect("receive");

        let receipt = ledger
            .harvest_batch(5, OPERATOR, ALICE, &[4], &mut book)
            .expect("harvest");
        assert_eq!(receipt.net, 150);
        assert_eq!(book.balance_of(&ALICE), 150);
        assert!(ledger.is_settled(&ALICE, 4));
        assert_eq!(ledger.held_value(), 850);

        let again = ledger
            .harvest_batch(6, OPERATOR, ALICE, &[4], &mut book)
            .expect("harvest");
        assert_eq!(again.total, 0);
        assert_eq!(book.balance_of(&ALICE), 150);
    }

    #[test]
    fn test_harvest_of_current_time_index_waits() {
        let mut ledger = ledger();
        let mut book = ValueBook::new();
        ledger.receive(4, 1_000).expect("receive");

        let receipt = ledger
            .harvest_batch(4, OPERATOR, ALICE, &[4], &mut book)
            .expect("harvest");
        assert!(receipt.entries.is_empty());
        assert!(!ledger.is_settled(&ALICE, 4));

        // A second deposit in the same time-index still counts.
        ledger.receive(4, 1_000).expect("receive");
        let receipt = ledger
            .harvest_batch(5, OPERATOR, ALICE, &[4], &mut book)
            .expect("harvest");
        assert_eq!(receipt.net, 300);
    }

    #[test]
    fn test_failed_payout_rolls_back() {
        let mut ledger = ledger();
        ledger.receive(4, 1_000).expect("receive");

        let err = ledger
            .harvest_batch(9, OPERATOR, ALICE, &[4], &mut Refusing)
            .expect_err("rejected");
        assert!(matches!(err, LedgerError::Payout(_)));
        assert!(!ledger.is_settled(&ALICE, 4));
        assert_eq!(ledger.held_value(), 1_000);
        assert_eq!(ledger.high_water(), 4);
    }

    #[test]
    fn test_zero_payout_skips_value_asset() {
        let mut ledger = ledger();
        // Refusing would fail if it were called.
        let receipt = ledger
            .harvest_batch(9, OPERATOR, ALICE, &[4, 5], &mut Refusing)
            .expect("harvest");
        assert_eq!(receipt.total, 0);
        assert!(ledger.is_settled(&ALICE, 4));
    }

    #[test]
    fn test_pending_matches_harvest() {
        let mut ledger = ledger();
        let mut book = ValueBook::new();
        ledger.receive(4, 777).expect("receive");
        ledger.set_premium(BOB, BOB, 10).expect("premium");

        let preview = ledger.pending_dividends(BOB, &[4], 5).expect("preview");
        assert!(!ledger.is_settled(&BOB, 4));
        let receipt = ledger
            .harvest_batch(5, OPERATOR, BOB, &[4], &mut book)
            .expect("harvest");
        assert_eq!(preview.total, receipt.total);
        assert_eq!(preview.premium, receipt.premium);
    }

    #[test]
    fn test_revert_undoes_a_run_of_calls() {
        let mut ledger = ledger();
        let mut book = ValueBook::new();
        ledger.receive(4, 1_000).expect("receive");
        ledger.approve(ISSUER, ALICE, 10);
        let before = ledger.snapshot();

        ledger.begin_changes();
        ledger.transfer(5, ISSUER, ALICE, 1).expect("transfer");
        ledger.transfer(5, ALICE, OPERATOR, 2).expect("transfer");
        ledger.transfer_from(6, ALICE, ISSUER, BOB, 3).expect("transfer_from");
        ledger.mint(6, BOB, 50).expect("mint");
        ledger.burn(7, BOB, 5).expect("burn");
        ledger.receive(7, 9).expect("receive");
        ledger.receive(4, 1).expect_err("clock went backwards");
        ledger.set_premium(ALICE, ALICE, 3).expect("premium");
        ledger
            .harvest_batch(8, OPERATOR, ALICE, &[4, 5], &mut book)
            .expect("harvest");
        let changes = ledger.take_changes();
        assert!(!changes.is_empty());

        ledger.revert(changes);
        assert_eq!(ledger.snapshot(), before);
        assert!(!ledger.is_settled(&ALICE, 4));
        assert_eq!(ledger.high_water(), 4);
    }

    #[test]
    fn test_delta_holds_only_touched_rows() {
        let mut ledger = ledger();
        for t in 4..50 {
            ledger.transfer(t, ISSUER, BOB, 1).expect("transfer");
        }

        ledger.begin_changes();
        ledger.transfer(50, ISSUER, ALICE, 7).expect("transfer");
        ledger.receive(50, 20).expect("receive");
        ledger.approve(ALICE, BOB, 0);
        let changes = ledger.take_changes();
        let delta = ledger.delta(&changes);

        assert_eq!(delta.high_water, 50);
        assert_eq!(delta.balance_checkpoints.len(), 2);
        let issuer = delta
            .balance_checkpoints
            .iter()
            .find(|h| h.account == ISSUER)
            .expect("issuer tail");
        // The entry that was last before the run plus the new one.
        assert_eq!(issuer.checkpoints.len(), 2);
        assert_eq!(issuer.checkpoints[1].time_index, 50);
        assert!(delta.supply_checkpoints.is_empty());
        assert_eq!(
            delta.revenue,
            vec![RevenueBucket {
                time_index: 50,
                amount: 20
            }]
        );
        assert_eq!(delta.allowances.len(), 1);
        assert_eq!(delta.allowances[0].amount, 0);
        assert!(delta.settlements.is_empty());
    }

    #[test]
    fn test_untracked_calls_record_nothing() {
        let mut ledger = ledger();
        ledger.transfer(4, ISSUER, ALICE, 1).expect("transfer");
        assert!(ledger.take_changes().is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut ledger = ledger();
        let mut book = ValueBook::new();
        ledger.receive(4, 1_000).expect("receive");
        ledger.set_premium(BOB, BOB, 10).expect("premium");
        ledger.approve(ISSUER, ALICE, 5);
        ledger
            .harvest_batch(5, OPERATOR, BOB, &[4], &mut book)
            .expect("harvest");

        let snapshot = ledger.snapshot();
        let restored = Ledger::restore(snapshot.clone()).expect("restore");
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.past_shares(&ALICE, 2), 150_000);
        assert!(restored.is_settled(&BOB, 4));
        assert_eq!(restored.premium_of(&BOB).get(), 10);
        assert_eq!(restored.allowance(&ISSUER, &ALICE), 5);
        assert_eq!(restored.held_value(), ledger.held_value());
    }

    #[test]
    fn test_restore_rejects_unbalanced_supply() {
        let mut snapshot = ledger().snapshot();
        snapshot.supply_history.push(crate::checkpoints::Checkpoint {
            time_index: 3,
            value: 1,
        });
        assert!(matches!(
            Ledger::restore(snapshot),
            Err(LedgerError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_restore_rejects_overpayment() {
        let mut snapshot = ledger().snapshot();
        snapshot.total_paid = 1;
        assert!(Ledger::restore(snapshot).is_err());
    }
}
