//! Value-asset balances backing the daemon's payout book.

use rusqlite::{params, Connection};
use sharefair_ledger::ValueBook;
use sharefair_types::{AccountId, Amount};

use crate::{account_from_sql, amount_from_sql, amount_to_sql, Result};

/// Replace the stored value balances with the contents of `book`.
pub fn save_value_book(conn: &Connection, book: &ValueBook) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    write_value_book(&tx, book)?;
    tx.commit()?;
    Ok(())
}

/// Same as [`save_value_book`] without opening a transaction.
pub fn write_value_book(conn: &Connection, book: &ValueBook) -> Result<()> {
    conn.execute("DELETE FROM value_balances", [])?;
    let mut stmt =
        conn.prepare_cached("INSERT INTO value_balances (account, amount) VALUES (?1, ?2)")?;
    for (account, amount) in book.iter() {
        stmt.execute(params![account.as_bytes().as_slice(), amount_to_sql(*amount)])?;
    }
    Ok(())
}

/// Upsert the given balances; a zero balance removes the row.
pub fn write_balances<I>(conn: &Connection, balances: I) -> Result<()>
where
    I: IntoIterator<Item = (AccountId, Amount)>,
{
    let mut upsert = conn.prepare_cached(
        "INSERT OR REPLACE INTO value_balances (account, amount) VALUES (?1, ?2)",
    )?;
    let mut delete = conn.prepare_cached("DELETE FROM value_balances WHERE account = ?1")?;
    for (account, amount) in balances {
        if amount == 0 {
            delete.execute(params![account.as_bytes().as_slice()])?;
        } else {
            upsert.execute(params![account.as_bytes().as_slice(), amount_to_sql(amount)])?;
        }
    }
    Ok(())
}

/// Load the stored value balances.
pub fn load_value_book(conn: &Connection) -> Result<ValueBook> {
    let mut stmt = conn.prepare("SELECT account, amount FROM value_balances")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(a, v)| -> Result<(AccountId, Amount)> {
            Ok((account_from_sql(&a)?, amount_from_sql(&v)?))
        })
        .collect()
}
