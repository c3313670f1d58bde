//! The daemon's in-memory ledger with write-through persistence.
//!
//! Every mutation goes through [`Book::apply`]: the closure runs against the
//! in-memory ledger and value book with change tracking on, the touched rows
//! are written to SQLite in one transaction, and only then is the call
//! considered done. If either step fails, the tracked changes are reverted.

use rusqlite::Connection;
use sharefair_db::queries;
use sharefair_db::DbError;
use sharefair_ledger::{ChangeSet, Ledger, LedgerError, ValueBook, ValueChanges};
use sharefair_types::{AccountId, Amount, TimeIndex};

/// Failure of a persisted mutation.
#[derive(Debug, thiserror::Error)]
pub enum BookError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Ledger, value balances, and the database they are persisted to.
pub struct Book {
    ledger: Ledger,
    values: ValueBook,
    conn: Connection,
}

impl Book {
    /// Load the stored state from `conn`.
    pub fn load(conn: Connection) -> Result<Self, DbError> {
        let ledger = queries::ledger::load_ledger(&conn)?;
        let values = queries::values::load_value_book(&conn)?;
        tracing::info!(
            supply = ledger.total_supply(),
            high_water = ledger.high_water(),
            held = ledger.held_value(),
            "ledger loaded"
        );
        Ok(Self {
            ledger,
            values,
            conn,
        })
    }

    /// Issue `supply` shares to `issuer` unless shares were ever issued.
    ///
    /// Returns whether an issuance happened.
    pub fn ensure_genesis(
        &mut self,
        now: TimeIndex,
        issuer: AccountId,
        supply: Amount,
    ) -> Result<bool, BookError> {
        if supply == 0 || !self.ledger.shares().supply_history().is_empty() {
            return Ok(false);
        }
        self.apply(|ledger, _| ledger.mint(now, issuer, supply))?;
        tracing::info!(%issuer, supply, now, "genesis issuance");
        Ok(true)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn values(&self) -> &ValueBook {
        &self.values
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `mutate` and persist its outcome.
    pub fn apply<T, F>(&mut self, mutate: F) -> Result<T, BookError>
    where
        F: FnOnce(&mut Ledger, &mut ValueBook) -> sharefair_ledger::Result<T>,
    {
        self.apply_logged(mutate, |_, _| Ok(()))
    }

    /// Like [`Book::apply`], additionally running `log` inside the same
    /// database transaction.
    pub fn apply_logged<T, F, L>(&mut self, mutate: F, log: L) -> Result<T, BookError>
    where
        F: FnOnce(&mut Ledger, &mut ValueBook) -> sharefair_ledger::Result<T>,
        L: FnOnce(&Connection, &T) -> sharefair_db::Result<()>,
    {
        self.ledger.begin_changes();
        self.values.begin_changes();
        let outcome = mutate(&mut self.ledger, &mut self.values);
        let ledger_changes = self.ledger.take_changes();
        let value_changes = self.values.take_changes();

        let result = match outcome {
            Ok(value) => self
                .persist(&ledger_changes, &value_changes, |conn| log(conn, &value))
                .map(|()| value),
            Err(e) => Err(BookError::Ledger(e)),
        };

        if let Err(e) = &result {
            if matches!(e, BookError::Db(_)) {
                tracing::error!("persisting ledger failed, state reverted: {e}");
            }
            self.ledger.revert(ledger_changes);
            self.values.revert(value_changes);
        }
        result
    }

    fn persist<L>(
        &self,
        ledger_changes: &ChangeSet,
        value_changes: &ValueChanges,
        log: L,
    ) -> Result<(), BookError>
    where
        L: FnOnce(&Connection) -> sharefair_db::Result<()>,
    {
        let tx = self.conn.unchecked_transaction().map_err(DbError::from)?;
        queries::ledger::write_delta(&tx, &self.ledger.delta(ledger_changes))?;
        queries::values::write_balances(
            &tx,
            value_changes
                .accounts()
                .map(|account| (*account, self.values.balance_of(account))),
        )?;
        log(&tx)?;
        tx.commit().map_err(DbError::from)?;
        Ok(())
    }
}
