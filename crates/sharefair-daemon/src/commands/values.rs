//! Value asset and status command handlers.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{account_param, amount_param, amount_value};
use crate::events::EventKind;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Value-asset balance of an account.
pub async fn get_value_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = account_param(params, "account")?;
    let book = state.book.lock().await;
    Ok(json!({
        "account": account,
        "balance": amount_value(book.values().balance_of(&account)),
    }))
}

/// Ledger-wide counters.
pub async fn get_ledger_status(state: &Arc<DaemonState>) -> Result {
    let book = state.book.lock().await;
    let ledger = book.ledger();
    Ok(json!({
        "high_water": ledger.high_water(),
        "total_supply": amount_value(ledger.total_supply()),
        "held_value": amount_value(ledger.held_value()),
        "total_paid": amount_value(ledger.dividends().total_paid()),
        "time_slot_secs": state.clock.slot_secs(),
        "event_sequence": state.event_bus.sequence(),
    }))
}

/// Bring value from outside the daemon into an account's value balance.
///
/// This is the entry point for the value asset: whatever custody sits in
/// front of the socket has taken the funds, and the daemon books them here
/// so they can be paid in through `receive`.
pub async fn deposit_value(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = account_param(params, "account")?;
    let amount = amount_param(params, "amount")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    let balance = book.apply(|_, values| values.credit(account, amount))?;
    tracing::info!(%account, amount, balance, "value deposited");

    state.event_bus.emit(
        EventKind::ValueDeposited,
        now,
        json!({"account": account, "amount": amount_value(amount)}),
    );

    Ok(json!({ "account": account, "balance": amount_value(balance) }))
}

/// Take value out of an account's value balance, e.g. harvested dividends.
pub async fn withdraw_value(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = account_param(params, "account")?;
    let amount = amount_param(params, "amount")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    let balance = book.apply(|_, values| values.debit(account, amount))?;
    tracing::info!(%account, amount, balance, "value withdrawn");

    state.event_bus.emit(
        EventKind::ValueWithdrawn,
        now,
        json!({"account": account, "amount": amount_value(amount)}),
    );

    Ok(json!({ "account": account, "balance": amount_value(balance) }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::commands::testing::{call, hex, state};
    use crate::rpc::{dispatch_request, RpcRequest};

    #[tokio::test]
    async fn test_deposit_withdraw_and_status() {
        let state = state();
        let result = call(
            &state,
            "deposit_value",
            json!({"account": hex(4), "amount": "12"}),
        )
        .await
        .expect("deposit");
        assert_eq!(result["balance"], "12");

        let result = call(
            &state,
            "withdraw_value",
            json!({"account": hex(4), "amount": "5"}),
        )
        .await
        .expect("withdraw");
        assert_eq!(result["balance"], "7");

        let err = call(
            &state,
            "withdraw_value",
            json!({"account": hex(4), "amount": "8"}),
        )
        .await
        .expect_err("overdrawn");
        assert_eq!(err.code, -32040);

        let balance = call(&state, "get_value_balance", json!({"account": hex(4)}))
            .await
            .expect("balance");
        assert_eq!(balance["balance"], "7");

        let status = call(&state, "get_ledger_status", json!({}))
            .await
            .expect("status");
        assert_eq!(status["total_supply"], "0");
        assert_eq!(status["held_value"], "0");
        assert_eq!(status["event_sequence"], 2);
    }

    #[tokio::test]
    async fn test_bad_version_and_unknown_method() {
        let state = state();
        let response = dispatch_request(
            &state,
            RpcRequest {
                jsonrpc: "1.0".to_string(),
                id: json!(7),
                method: "get_total_supply".to_string(),
                params: json!({}),
            },
        )
        .await;
        assert_eq!(response.error.expect("error").code, -32600);

        let err = call(&state, "mint_everything", json!({}))
            .await
            .expect_err("unknown");
        assert_eq!(err.code, -32601);
    }
}
