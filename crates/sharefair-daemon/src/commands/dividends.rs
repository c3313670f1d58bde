//! Revenue and dividend command handlers.

use std::sync::Arc;

use serde_json::{json, Value};
use sharefair_db::queries;

use super::{
    account_param, amount_param, amount_value, optional_account_param, receipt_value,
    time_index_param, time_indexes_param, u32_param,
};
use crate::events::EventKind;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Default page size for harvest history.
const DEFAULT_HARVEST_LIMIT: u32 = 50;

/// Pay value from the caller into the ledger as revenue.
pub async fn receive(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = account_param(params, "caller")?;
    let amount = amount_param(params, "amount")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    let bucket = book.apply(|ledger, values| {
        values.debit(caller, amount)?;
        ledger.receive(now, amount)
    })?;

    state.event_bus.emit(
        EventKind::RevenueReceived,
        now,
        json!({"from": caller, "amount": amount_value(amount), "bucket": amount_value(bucket)}),
    );

    Ok(json!({
        "time_index": now,
        "bucket": amount_value(bucket),
    }))
}

/// Set the harvest premium an account grants to operators.
pub async fn set_premium(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = account_param(params, "caller")?;
    let account = optional_account_param(params, "account")?.unwrap_or(caller);
    let fraction = u32_param(params, "fraction")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    let premium = book.apply(|ledger, _| ledger.set_premium(caller, account, fraction))?;

    state.event_bus.emit(
        EventKind::PremiumSet,
        now,
        json!({"account": account, "fraction": premium.get()}),
    );

    Ok(json!({ "account": account, "fraction": premium.get() }))
}

/// Settle and pay an account's dividends for a batch of time-indexes.
///
/// The caller acts as operator and receives the account's premium.
pub async fn harvest_batch(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = account_param(params, "caller")?;
    let account = account_param(params, "account")?;
    let time_indexes = time_indexes_param(params, "time_indexes")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    let receipt = book.apply_logged(
        |ledger, values| ledger.harvest_batch(now, caller, account, &time_indexes, values),
        |conn, receipt| queries::harvests::record_harvest(conn, now, receipt),
    )?;

    if !receipt.entries.is_empty() {
        state
            .event_bus
            .emit(EventKind::DividendsHarvested, now, receipt_value(&receipt));
    }

    Ok(receipt_value(&receipt))
}

/// Current premium of an account.
pub async fn get_premium(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = account_param(params, "account")?;
    let book = state.book.lock().await;
    Ok(json!({
        "account": account,
        "fraction": book.ledger().premium_of(&account).get(),
    }))
}

/// Revenue received during a time-index.
pub async fn get_revenue(state: &Arc<DaemonState>, params: &Value) -> Result {
    let time_index = time_index_param(params, "time_index")?;
    let book = state.book.lock().await;
    Ok(json!({
        "time_index": time_index,
        "amount": amount_value(book.ledger().revenue_at(time_index)),
    }))
}

/// What a self-harvest of the given time-indexes would pay right now.
pub async fn get_pending_dividends(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = account_param(params, "account")?;
    let time_indexes = time_indexes_param(params, "time_indexes")?;

    let book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    let receipt = book
        .ledger()
        .pending_dividends(account, &time_indexes, now)?;
    Ok(receipt_value(&receipt))
}

/// Logged harvests, newest first.
pub async fn get_harvests(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = optional_account_param(params, "account")?;
    let limit = match params.get("limit") {
        None | Some(Value::Null) => DEFAULT_HARVEST_LIMIT,
        Some(_) => u32_param(params, "limit")?,
    };

    let book = state.book.lock().await;
    let rows = queries::harvests::recent_harvests(book.conn(), account.as_ref(), limit)?;
    serde_json::to_value(rows).map_err(|e| RpcError::internal_error(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sharefair_types::AccountId;

    use crate::commands::testing::{call, hex, state};

    const UNIT: u128 = 1_000_000_000_000_000_000;

    /// Issue 1000 shares to account 1 and give account 9 value to pay in.
    async fn setup() -> std::sync::Arc<crate::DaemonState> {
        let state = state();
        {
            let mut book = state.book.lock().await;
            let now = state.clock.now(0);
            book.ensure_genesis(now, AccountId::new([1; 32]), 1_000 * UNIT)
                .expect("genesis");
        }
        call(
            &state,
            "deposit_value",
            json!({"account": hex(9), "amount": (100 * UNIT).to_string()}),
        )
        .await
        .expect("deposit");
        state
    }

    /// Pretend the clock moved one slot past everything recorded so far.
    async fn advance(state: &std::sync::Arc<crate::DaemonState>) -> u64 {
        let mut book = state.book.lock().await;
        let next = book.ledger().high_water() + 1;
        book.apply(|ledger, _| ledger.receive(next, 0)).expect("tick");
        next
    }

    #[tokio::test]
    async fn test_receive_debits_payer() {
        let state = setup().await;
        let result = call(
            &state,
            "receive",
            json!({"caller": hex(9), "amount": (40 * UNIT).to_string()}),
        )
        .await
        .expect("receive");
        assert_eq!(result["bucket"], (40 * UNIT).to_string());

        let value = call(&state, "get_value_balance", json!({"account": hex(9)}))
            .await
            .expect("value balance");
        assert_eq!(value["balance"], (60 * UNIT).to_string());

        let err = call(
            &state,
            "receive",
            json!({"caller": hex(8), "amount": "1"}),
        )
        .await
        .expect_err("unfunded payer");
        assert_eq!(err.code, -32040);
    }

    #[tokio::test]
    async fn test_harvest_pays_holder_and_operator() {
        let state = setup().await;
        call(
            &state,
            "transfer",
            json!({"caller": hex(1), "to": hex(2), "amount": (250 * UNIT).to_string()}),
        )
        .await
        .expect("transfer");
        let paid_at = {
            let result = call(
                &state,
                "receive",
                json!({"caller": hex(9), "amount": (40 * UNIT).to_string()}),
            )
            .await
            .expect("receive");
            result["time_index"].as_u64().expect("time index")
        };
        call(
            &state,
            "set_premium",
            json!({"caller": hex(2), "fraction": 51}),
        )
        .await
        .expect("premium");
        advance(&state).await;

        let receipt = call(
            &state,
            "harvest_batch",
            json!({"caller": hex(3), "account": hex(2), "time_indexes": [paid_at, paid_at]}),
        )
        .await
        .expect("harvest");

        // 250/1000 of 40 = 10; premium 51/255 of 10 = 2.
        assert_eq!(receipt["total"], (10 * UNIT).to_string());
        assert_eq!(receipt["premium"], (2 * UNIT).to_string());
        assert_eq!(receipt["entries"].as_array().expect("entries").len(), 1);

        let holder = call(&state, "get_value_balance", json!({"account": hex(2)}))
            .await
            .expect("holder");
        assert_eq!(holder["balance"], (8 * UNIT).to_string());
        let operator = call(&state, "get_value_balance", json!({"account": hex(3)}))
            .await
            .expect("operator");
        assert_eq!(operator["balance"], (2 * UNIT).to_string());

        // Second harvest of the same entry pays nothing.
        let again = call(
            &state,
            "harvest_batch",
            json!({"caller": hex(3), "account": hex(2), "time_indexes": [paid_at]}),
        )
        .await
        .expect("harvest again");
        assert_eq!(again["total"], "0");

        let log = call(&state, "get_harvests", json!({"account": hex(2)}))
            .await
            .expect("harvest log");
        assert_eq!(log.as_array().expect("rows").len(), 1);
    }

    #[tokio::test]
    async fn test_default_config_funds_and_pays_out() {
        let conn = sharefair_db::open_memory().expect("open db");
        let book = crate::book::Book::load(conn).expect("load book");
        let state = std::sync::Arc::new(crate::DaemonState::new(
            crate::config::DaemonConfig::default(),
            book,
        ));
        {
            let mut book = state.book.lock().await;
            let now = state.clock.now(0);
            book.ensure_genesis(now, AccountId::new([1; 32]), 1_000)
                .expect("genesis");
        }

        // Outside value comes in for a third party, who pays it in.
        call(&state, "deposit_value", json!({"account": hex(7), "amount": "500"}))
            .await
            .expect("deposit");
        let paid_at = call(&state, "receive", json!({"caller": hex(7), "amount": "500"}))
            .await
            .expect("receive")["time_index"]
            .as_u64()
            .expect("time index");
        advance(&state).await;

        let receipt = call(
            &state,
            "harvest_batch",
            json!({"caller": hex(1), "account": hex(1), "time_indexes": [paid_at]}),
        )
        .await
        .expect("harvest");
        assert_eq!(receipt["net"], "500");

        // The holder takes the dividend back out.
        let left = call(&state, "withdraw_value", json!({"account": hex(1), "amount": "500"}))
            .await
            .expect("withdraw");
        assert_eq!(left["balance"], "0");
        let status = call(&state, "get_ledger_status", json!({}))
            .await
            .expect("status");
        assert_eq!(status["held_value"], "0");
    }

    #[tokio::test]
    async fn test_pending_matches_harvest() {
        let state = setup().await;
        let paid_at = call(
            &state,
            "receive",
            json!({"caller": hex(9), "amount": "1000"}),
        )
        .await
        .expect("receive")["time_index"]
            .as_u64()
            .expect("time index");
        advance(&state).await;

        let pending = call(
            &state,
            "get_pending_dividends",
            json!({"account": hex(1), "time_indexes": [paid_at]}),
        )
        .await
        .expect("pending");
        assert_eq!(pending["total"], "1000");

        let receipt = call(
            &state,
            "harvest_batch",
            json!({"caller": hex(1), "account": hex(1), "time_indexes": [paid_at]}),
        )
        .await
        .expect("harvest");
        assert_eq!(receipt["net"], pending["net"]);
    }

    #[tokio::test]
    async fn test_premium_rules() {
        let state = setup().await;
        let err = call(
            &state,
            "set_premium",
            json!({"caller": hex(2), "account": hex(1), "fraction": 10}),
        )
        .await
        .expect_err("not own account");
        assert_eq!(err.code, -32043);

        let err = call(
            &state,
            "set_premium",
            json!({"caller": hex(1), "fraction": 256}),
        )
        .await
        .expect_err("out of range");
        assert_eq!(err.code, -32042);

        call(&state, "set_premium", json!({"caller": hex(1), "fraction": 255}))
            .await
            .expect("max premium");
        let premium = call(&state, "get_premium", json!({"account": hex(1)}))
            .await
            .expect("get premium");
        assert_eq!(premium["fraction"], 255);
    }

    #[tokio::test]
    async fn test_revenue_view() {
        let state = setup().await;
        let result = call(
            &state,
            "receive",
            json!({"caller": hex(9), "amount": "5"}),
        )
        .await
        .expect("receive");
        let t = result["time_index"].as_u64().expect("time index");

        let revenue = call(&state, "get_revenue", json!({"time_index": t}))
            .await
            .expect("revenue");
        assert_eq!(revenue["amount"], "5");
    }
}
