//! Share ledger command handlers.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{account_param, amount_param, amount_value, time_index_param};
use crate::events::EventKind;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Move shares from the caller to another account.
pub async fn transfer(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = account_param(params, "caller")?;
    let to = account_param(params, "to")?;
    let amount = amount_param(params, "amount")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    book.apply(|ledger, _| ledger.transfer(now, caller, to, amount))?;

    state.event_bus.emit(
        EventKind::SharesTransferred,
        now,
        json!({"from": caller, "to": to, "amount": amount_value(amount)}),
    );

    Ok(json!({
        "time_index": now,
        "balance": amount_value(book.ledger().balance_of(&caller)),
    }))
}

/// Move shares on an allowance granted to the caller.
pub async fn transfer_from(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = account_param(params, "caller")?;
    let from = account_param(params, "from")?;
    let to = account_param(params, "to")?;
    let amount = amount_param(params, "amount")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    book.apply(|ledger, _| ledger.transfer_from(now, caller, from, to, amount))?;

    state.event_bus.emit(
        EventKind::SharesTransferred,
        now,
        json!({"from": from, "to": to, "amount": amount_value(amount), "spender": caller}),
    );

    Ok(json!({
        "time_index": now,
        "allowance": amount_value(book.ledger().allowance(&from, &caller)),
    }))
}

/// Set the caller's allowance for a spender.
pub async fn approve(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = account_param(params, "caller")?;
    let spender = account_param(params, "spender")?;
    let amount = amount_param(params, "amount")?;

    let mut book = state.book.lock().await;
    let now = state.clock.now(book.ledger().high_water());
    book.apply(|ledger, _| {
        ledger.approve(caller, spender, amount);
        Ok(())
    })?;

    state.event_bus.emit(
        EventKind::AllowanceSet,
        now,
        json!({"owner": caller, "spender": spender, "amount": amount_value(amount)}),
    );

    Ok(json!({ "allowance": amount_value(amount) }))
}

/// Current share balance.
pub async fn get_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = account_param(params, "account")?;
    let book = state.book.lock().await;
    Ok(json!({
        "account": account,
        "balance": amount_value(book.ledger().balance_of(&account)),
    }))
}

/// Current total supply.
pub async fn get_total_supply(state: &Arc<DaemonState>) -> Result {
    let book = state.book.lock().await;
    Ok(json!({ "total_supply": amount_value(book.ledger().total_supply()) }))
}

/// Shares held by an account as of a time-index.
pub async fn get_past_shares(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = account_param(params, "account")?;
    let time_index = time_index_param(params, "time_index")?;
    let book = state.book.lock().await;
    Ok(json!({
        "account": account,
        "time_index": time_index,
        "shares": amount_value(book.ledger().past_shares(&account, time_index)),
    }))
}

/// Total supply as of a time-index.
pub async fn get_past_total_shares(state: &Arc<DaemonState>, params: &Value) -> Result {
    let time_index = time_index_param(params, "time_index")?;
    let book = state.book.lock().await;
    Ok(json!({
        "time_index": time_index,
        "total_shares": amount_value(book.ledger().past_total_shares(time_index)),
    }))
}

/// Remaining allowance of a spender over an owner's shares.
pub async fn get_allowance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let owner = account_param(params, "owner")?;
    let spender = account_param(params, "spender")?;
    let book = state.book.lock().await;
    Ok(json!({ "allowance": amount_value(book.ledger().allowance(&owner, &spender)) }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::commands::testing::{call, hex, state};
    use crate::events::EventKind;

    async fn issue(state: &std::sync::Arc<crate::DaemonState>, supply: u128) {
        let mut book = state.book.lock().await;
        let now = state.clock.now(book.ledger().high_water());
        book.ensure_genesis(now, sharefair_types::AccountId::new([1; 32]), supply)
            .expect("genesis");
    }

    #[tokio::test]
    async fn test_transfer_and_balances() {
        let state = state();
        issue(&state, 1_000).await;
        let mut events = state.event_bus.subscribe();

        let result = call(
            &state,
            "transfer",
            json!({"caller": hex(1), "to": hex(2), "amount": "300"}),
        )
        .await
        .expect("transfer");
        assert_eq!(result["balance"], "700");

        let balance = call(&state, "get_balance", json!({"account": hex(2)}))
            .await
            .expect("balance");
        assert_eq!(balance["balance"], "300");

        let supply = call(&state, "get_total_supply", json!({}))
            .await
            .expect("supply");
        assert_eq!(supply["total_supply"], "1000");

        let event = events.try_recv().expect("event");
        assert_eq!(event.kind, EventKind::SharesTransferred);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance() {
        let state = state();
        issue(&state, 10).await;
        let err = call(
            &state,
            "transfer",
            json!({"caller": hex(2), "to": hex(1), "amount": "1"}),
        )
        .await
        .expect_err("empty sender");
        assert_eq!(err.code, -32040);
    }

    #[tokio::test]
    async fn test_allowance_flow() {
        let state = state();
        issue(&state, 100).await;

        call(
            &state,
            "approve",
            json!({"caller": hex(1), "spender": hex(3), "amount": "40"}),
        )
        .await
        .expect("approve");

        let err = call(
            &state,
            "transfer_from",
            json!({"caller": hex(3), "from": hex(1), "to": hex(2), "amount": "41"}),
        )
        .await
        .expect_err("over allowance");
        assert_eq!(err.code, -32041);

        let result = call(
            &state,
            "transfer_from",
            json!({"caller": hex(3), "from": hex(1), "to": hex(2), "amount": "15"}),
        )
        .await
        .expect("transfer_from");
        assert_eq!(result["allowance"], "25");

        let allowance = call(
            &state,
            "get_allowance",
            json!({"owner": hex(1), "spender": hex(3)}),
        )
        .await
        .expect("allowance");
        assert_eq!(allowance["allowance"], "25");
    }

    #[tokio::test]
    async fn test_past_shares_views() {
        let state = state();
        issue(&state, 500).await;
        let t = {
            let book = state.book.lock().await;
            book.ledger().high_water()
        };

        let shares = call(
            &state,
            "get_past_shares",
            json!({"account": hex(1), "time_index": t}),
        )
        .await
        .expect("past shares");
        assert_eq!(shares["shares"], "500");

        let before = call(&state, "get_past_total_shares", json!({"time_index": t - 1}))
            .await
            .expect("past total");
        assert_eq!(before["total_shares"], "0");
    }
}
