//! Harvest history.
//!
//! One row per settled harvest. The ledger itself only keeps the settlement
//! set; this log records who ran each harvest and what it paid.

use rusqlite::{params, Connection};
use serde::Serialize;
use sharefair_ledger::HarvestReceipt;
use sharefair_types::{AccountId, Amount, TimeIndex};

use crate::{
    account_from_sql, amount_from_sql, amount_to_sql, time_from_sql, time_to_sql, DbError, Result,
};

/// A logged harvest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HarvestRow {
    pub id: i64,
    pub account: AccountId,
    pub operator: AccountId,
    pub time_index: TimeIndex,
    /// Number of entries the harvest settled.
    pub settled: u64,
    #[serde(with = "amount_string")]
    pub total: Amount,
    #[serde(with = "amount_string")]
    pub premium: Amount,
    #[serde(with = "amount_string")]
    pub net: Amount,
}

/// Append a harvest to the log. Receipts that settled nothing are skipped.
pub fn record_harvest(conn: &Connection, now: TimeIndex, receipt: &HarvestReceipt) -> Result<()> {
    if receipt.entries.is_empty() {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO harvest_log (account, operator, time_index, settled, total, premium, net)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            receipt.account.as_bytes().as_slice(),
            receipt.operator.as_bytes().as_slice(),
            time_to_sql(now)?,
            settled_to_sql(receipt.entries.len())?,
            amount_to_sql(receipt.total),
            amount_to_sql(receipt.premium),
            amount_to_sql(receipt.net),
        ],
    )?;
    Ok(())
}

/// Most recent harvests first, optionally filtered by account.
pub fn recent_harvests(
    conn: &Connection,
    account: Option<&AccountId>,
    limit: u32,
) -> Result<Vec<HarvestRow>> {
    type Raw = (i64, Vec<u8>, Vec<u8>, i64, i64, String, String, String);
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Raw> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    };

    let raw: Vec<Raw> = match account {
        Some(account) => {
            let mut stmt = conn.prepare(
                "SELECT id, account, operator, time_index, settled, total, premium, net
                 FROM harvest_log WHERE account = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![account.as_bytes().as_slice(), limit], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, account, operator, time_index, settled, total, premium, net
                 FROM harvest_log ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    raw.into_iter()
        .map(
            |(id, account, operator, time_index, settled, total, premium, net)| -> Result<HarvestRow> {
                Ok(HarvestRow {
                    id,
                    account: account_from_sql(&account)?,
                    operator: account_from_sql(&operator)?,
                    time_index: time_from_sql(time_index)?,
                    settled: settled_from_sql(settled)?,
                    total: amount_from_sql(&total)?,
                    premium: amount_from_sql(&premium)?,
                    net: amount_from_sql(&net)?,
                })
            },
        )
        .collect()
}

fn settled_to_sql(count: usize) -> Result<i64> {
    i64::try_from(count)
        .map_err(|_| DbError::Corrupt(format!("settled count {count} exceeds INTEGER range")))
}

fn settled_from_sql(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| DbError::Corrupt(format!("negative settled count {value}")))
}

mod amount_string {
    use serde::Serializer;
    use sharefair_types::Amount;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharefair_ledger::SettledEntry;

    const ALICE: AccountId = AccountId::new([0xaa; 32]);
    const BOB: AccountId = AccountId::new([0xbb; 32]);

    fn receipt(account: AccountId, total: Amount) -> HarvestReceipt {
        HarvestReceipt {
            account,
            operator: BOB,
            entries: vec![SettledEntry {
                time_index: 1,
                dividend: total,
                premium: 1,
            }],
            total,
            premium: 1,
            net: total - 1,
        }
    }

    #[test]
    fn test_record_and_list() {
        let conn = crate::open_memory().expect("open");
        record_harvest(&conn, 5, &receipt(ALICE, 10)).expect("record");
        record_harvest(&conn, 6, &receipt(BOB, 20)).expect("record");

        let all = recent_harvests(&conn, None, 10).expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].account, BOB);
        assert_eq!(all[0].time_index, 6);

        let alice = recent_harvests(&conn, Some(&ALICE), 10).expect("list");
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].total, 10);
        assert_eq!(alice[0].net, 9);
        assert_eq!(alice[0].settled, 1);
    }

    #[test]
    fn test_empty_receipt_not_logged() {
        let conn = crate::open_memory().expect("open");
        let empty = HarvestReceipt {
            account: ALICE,
            operator: ALICE,
            entries: Vec::new(),
            total: 0,
            premium: 0,
            net: 0,
        };
        record_harvest(&conn, 1, &empty).expect("record");
        assert!(recent_harvests(&conn, None, 10).expect("list").is_empty());
    }

    #[test]
    fn test_settled_count_is_not_capped() {
        assert_eq!(settled_to_sql(70_000).expect("fits"), 70_000);
        if usize::BITS >= 64 {
            assert!(matches!(settled_to_sql(usize::MAX), Err(DbError::Corrupt(_))));
        }

        let conn = crate::open_memory().expect("open");
        conn.execute(
            "INSERT INTO harvest_log (account, operator, time_index, settled, total, premium, net)
             VALUES (?1, ?1, 1, -1, '0', '0', '0')",
            [ALICE.as_bytes().as_slice()],
        )
        .expect("insert");
        assert!(matches!(
            recent_harvests(&conn, None, 10),
            Err(DbError::Corrupt(_))
        ));
    }

    #[test]
    fn test_limit() {
        let conn = crate::open_memory().expect("open");
        for t in 0..5 {
            record_harvest(&conn, t, &receipt(ALICE, 3)).expect("record");
        }
        assert_eq!(recent_harvests(&conn, None, 2).expect("list").len(), 2);
    }
}
