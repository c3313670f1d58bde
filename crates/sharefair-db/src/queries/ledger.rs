//! Ledger state save and load.
//!
//! [`write_delta`] is the incremental path: it upserts just the rows a run of
//! calls touched, so its cost does not grow with the ledger's history.
//! [`save_ledger`] writes a complete snapshot, for initial export or repair.
//! Checkpoints, revenue buckets, and settlements only ever grow (a checkpoint
//! may be overwritten within its own time-index), so both paths upsert them.
//! A load reads the tables back into a [`LedgerSnapshot`] and validates it
//! through [`Ledger::restore`].

use rusqlite::{params, Connection};
use sharefair_ledger::checkpoints::Checkpoint;
use sharefair_ledger::snapshot::{
    AccountHistory, Allowance, PremiumSetting, RevenueBucket, Settlement,
};
use sharefair_ledger::{Ledger, LedgerDelta, LedgerSnapshot};
use sharefair_types::{Amount, PremiumFraction, TimeIndex};

use crate::queries::meta;
use crate::{
    account_from_sql, amount_from_sql, amount_to_sql, time_from_sql, time_to_sql, DbError,
    Result,
};

/// Persist the complete ledger state in its own transaction.
pub fn save_ledger(conn: &Connection, ledger: &Ledger) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    write_ledger(&tx, ledger)?;
    tx.commit()?;
    Ok(())
}

/// Write the complete ledger state without opening a transaction.
///
/// Premiums and allowances are replaced wholesale.
pub fn write_ledger(conn: &Connection, ledger: &Ledger) -> Result<()> {
    let snapshot = ledger.snapshot();

    conn.execute("DELETE FROM premiums", [])?;
    conn.execute("DELETE FROM allowances", [])?;
    write_checkpoints(conn, &snapshot.balance_histories, &snapshot.supply_history)?;
    write_revenue(conn, &snapshot.revenue)?;
    write_settlements(conn, &snapshot.settlements)?;
    write_premiums(conn, &snapshot.premiums)?;
    write_allowances(conn, &snapshot.allowances)?;
    write_counters(conn, snapshot.high_water, snapshot.total_paid)?;

    tracing::trace!(high_water = snapshot.high_water, "ledger written");
    Ok(())
}

/// Write the rows in `delta` without opening a transaction.
pub fn write_delta(conn: &Connection, delta: &LedgerDelta) -> Result<()> {
    write_checkpoints(conn, &delta.balance_checkpoints, &delta.supply_checkpoints)?;
    write_revenue(conn, &delta.revenue)?;
    write_settlements(conn, &delta.settlements)?;
    write_premiums(conn, &delta.premiums)?;
    write_allowances(conn, &delta.allowances)?;
    write_counters(conn, delta.high_water, delta.total_paid)?;

    tracing::trace!(
        high_water = delta.high_water,
        accounts = delta.balance_checkpoints.len(),
        settlements = delta.settlements.len(),
        "ledger delta written"
    );
    Ok(())
}

/// Load and validate the stored ledger. An empty database yields an empty ledger.
pub fn load_ledger(conn: &Connection) -> Result<Ledger> {
    let snapshot = read_snapshot(conn)?;
    Ok(Ledger::restore(snapshot)?)
}

/// Read the stored ledger state without validating it.
pub fn read_snapshot(conn: &Connection) -> Result<LedgerSnapshot> {
    let high_water: TimeIndex = match meta::get(conn, meta::HIGH_WATER)? {
        Some(v) => v
            .parse()
            .map_err(|e| DbError::Corrupt(format!("high_water {v:?}: {e}")))?,
        None => 0,
    };
    let total_paid = match meta::get(conn, meta::TOTAL_PAID)? {
        Some(v) => amount_from_sql(&v)?,
        None => 0,
    };

    Ok(LedgerSnapshot {
        high_water,
        balance_histories: read_balance_histories(conn)?,
        supply_history: read_supply_history(conn)?,
        revenue: read_revenue(conn)?,
        settlements: read_settlements(conn)?,
        premiums: read_premiums(conn)?,
        allowances: read_allowances(conn)?,
        total_paid,
    })
}

fn write_counters(conn: &Connection, high_water: TimeIndex, total_paid: Amount) -> Result<()> {
    meta::set(conn, meta::HIGH_WATER, &high_water.to_string())?;
    meta::set(conn, meta::TOTAL_PAID, &amount_to_sql(total_paid))
}

fn write_checkpoints(
    conn: &Connection,
    balances: &[AccountHistory],
    supply: &[Checkpoint],
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO balance_checkpoints (account, time_index, value)
         VALUES (?1, ?2, ?3)",
    )?;
    for history in balances {
        for cp in &history.checkpoints {
            stmt.execute(params![
                history.account.as_bytes().as_slice(),
                time_to_sql(cp.time_index)?,
                amount_to_sql(cp.value),
            ])?;
        }
    }

    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO supply_checkpoints (time_index, value) VALUES (?1, ?2)",
    )?;
    for cp in supply {
        stmt.execute(params![time_to_sql(cp.time_index)?, amount_to_sql(cp.value)])?;
    }
    Ok(())
}

fn write_revenue(conn: &Connection, buckets: &[RevenueBucket]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO revenue_buckets (time_index, amount) VALUES (?1, ?2)",
    )?;
    for bucket in buckets {
        stmt.execute(params![
            time_to_sql(bucket.time_index)?,
            amount_to_sql(bucket.amount)
        ])?;
    }
    Ok(())
}

fn write_settlements(conn: &Connection, settlements: &[Settlement]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO settlements (account, time_index) VALUES (?1, ?2)",
    )?;
    for s in settlements {
        stmt.execute(params![s.account.as_bytes().as_slice(), time_to_sql(s.time_index)?])?;
    }
    Ok(())
}

fn write_premiums(conn: &Connection, premiums: &[PremiumSetting]) -> Result<()> {
    let mut upsert = conn.prepare_cached(
        "INSERT OR REPLACE INTO premiums (account, fraction) VALUES (?1, ?2)",
    )?;
    let mut delete = conn.prepare_cached("DELETE FROM premiums WHERE account = ?1")?;
    for p in premiums {
        if p.fraction == PremiumFraction::ZERO {
            delete.execute(params![p.account.as_bytes().as_slice()])?;
        } else {
            upsert.execute(params![p.account.as_bytes().as_slice(), p.fraction.get()])?;
        }
    }
    Ok(())
}

fn write_allowances(conn: &Connection, allowances: &[Allowance]) -> Result<()> {
    let mut upsert = conn.prepare_cached(
        "INSERT OR REPLACE INTO allowances (owner, spender, amount) VALUES (?1, ?2, ?3)",
    )?;
    let mut delete =
        conn.prepare_cached("DELETE FROM allowances WHERE owner = ?1 AND spender = ?2")?;
    for a in allowances {
        let owner = a.owner.as_bytes().as_slice();
        let spender = a.spender.as_bytes().as_slice();
        if a.amount == 0 {
            delete.execute(params![owner, spender])?;
        } else {
            upsert.execute(params![owner, spender, amount_to_sql(a.amount)])?;
        }
    }
    Ok(())
}

fn read_balance_histories(conn: &Connection) -> Result<Vec<AccountHistory>> {
    let mut stmt = conn.prepare(
        "SELECT account, time_index, value FROM balance_checkpoints
         ORDER BY account, time_index",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut histories: Vec<AccountHistory> = Vec::new();
    for (account, time_index, value) in rows {
        let account = account_from_sql(&account)?;
        let checkpoint = Checkpoint {
            time_index: time_from_sql(time_index)?,
            value: amount_from_sql(&value)?,
        };
        match histories.last_mut() {
            Some(last) if last.account == account => last.checkpoints.push(checkpoint),
            _ => histories.push(AccountHistory {
                account,
                checkpoints: vec![checkpoint],
            }),
        }
    }
    Ok(histories)
}

fn read_supply_history(conn: &Connection) -> Result<Vec<Checkpoint>> {
    let mut stmt =
        conn.prepare("SELECT time_index, value FROM supply_checkpoints ORDER BY time_index")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(t, v)| -> Result<Checkpoint> {
            Ok(Checkpoint {
                time_index: time_from_sql(t)?,
                value: amount_from_sql(&v)?,
            })
        })
        .collect()
}

fn read_revenue(conn: &Connection) -> Result<Vec<RevenueBucket>> {
    let mut stmt =
        conn.prepare("SELECT time_index, amount FROM revenue_buckets ORDER BY time_index")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(t, v)| -> Result<RevenueBucket> {
            Ok(RevenueBucket {
                time_index: time_from_sql(t)?,
                amount: amount_from_sql(&v)?,
            })
        })
        .collect()
}

fn read_settlements(conn: &Connection) -> Result<Vec<Settlement>> {
    let mut stmt =
        conn.prepare("SELECT account, time_index FROM settlements ORDER BY account, time_index")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(a, t)| -> Result<Settlement> {
            Ok(Settlement {
                account: account_from_sql(&a)?,
                time_index: time_from_sql(t)?,
            })
        })
        .collect()
}

fn read_premiums(conn: &Connection) -> Result<Vec<PremiumSetting>> {
    let mut stmt = conn.prepare("SELECT account, fraction FROM premiums ORDER BY account")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, u8>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(a, f)| -> Result<PremiumSetting> {
            Ok(PremiumSetting {
                account: account_from_sql(&a)?,
                fraction: PremiumFraction::from(f),
            })
        })
        .collect()
}

fn read_allowances(conn: &Connection) -> Result<Vec<Allowance>> {
    let mut stmt =
        conn.prepare("SELECT owner, spender, amount FROM allowances ORDER BY owner, spender")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(o, s, a)| -> Result<Allowance> {
            Ok(Allowance {
                owner: account_from_sql(&o)?,
                spender: account_from_sql(&s)?,
                amount: amount_from_sql(&a)?,
            })
        })
        .collect()
}
