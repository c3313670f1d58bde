//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Amounts
//! travel as decimal strings on the wire because they exceed JSON's safe
//! integer range; time-indexes are plain numbers.

pub mod dividends;
pub mod shares;
pub mod values;

use serde_json::Value;
use sharefair_ledger::HarvestReceipt;
use sharefair_types::{AccountId, Amount, TimeIndex};

use crate::rpc::RpcError;

type ParamResult<T> = std::result::Result<T, RpcError>;

fn required<'a>(params: &'a Value, name: &str) -> ParamResult<&'a Value> {
    params
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} required")))
}

/// Hex account id parameter.
pub(crate) fn account_param(params: &Value, name: &str) -> ParamResult<AccountId> {
    required(params, name)?
        .as_str()
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} must be a hex string")))?
        .parse()
        .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}")))
}

/// Optional hex account id parameter.
pub(crate) fn optional_account_param(params: &Value, name: &str) -> ParamResult<Option<AccountId>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => account_param(params, name).map(Some),
    }
}

/// Amount parameter: a decimal string, or a non-negative JSON integer.
pub(crate) fn amount_param(params: &Value, name: &str) -> ParamResult<Amount> {
    match required(params, name)? {
        Value::String(s) => s
            .parse()
            .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}"))),
        Value::Number(n) => n
            .as_u64()
            .map(Amount::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{name} must be non-negative"))),
        _ => Err(RpcError::invalid_params(&format!(
            "{name} must be a decimal string"
        ))),
    }
}

/// Time-index parameter.
pub(crate) fn time_index_param(params: &Value, name: &str) -> ParamResult<TimeIndex> {
    required(params, name)?
        .as_u64()
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} must be a non-negative integer")))
}

/// Array of time-indexes parameter.
pub(crate) fn time_indexes_param(params: &Value, name: &str) -> ParamResult<Vec<TimeIndex>> {
    required(params, name)?
        .as_array()
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} must be an array")))?
        .iter()
        .map(|v| {
            v.as_u64().ok_or_else(|| {
                RpcError::invalid_params(&format!("{name} entries must be non-negative integers"))
            })
        })
        .collect()
}

/// Unsigned 32-bit integer parameter.
pub(crate) fn u32_param(params: &Value, name: &str) -> ParamResult<u32> {
    required(params, name)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} must be a 32-bit unsigned integer")))
}

/// Amount as it goes on the wire.
pub(crate) fn amount_value(amount: Amount) -> Value {
    Value::String(amount.to_string())
}

/// Harvest receipt as it goes on the wire.
pub(crate) fn receipt_value(receipt: &HarvestReceipt) -> Value {
    let entries: Vec<Value> = receipt
        .entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "time_index": e.time_index,
                "dividend": amount_value(e.dividend),
                "premium": amount_value(e.premium),
            })
        })
        .collect();

    serde_json::json!({
        "account": receipt.account,
        "operator": receipt.operator,
        "entries": entries,
        "total": amount_value(receipt.total),
        "premium": amount_value(receipt.premium),
        "net": amount_value(receipt.net),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_param_forms() {
        let params = json!({
            "a": "340282366920938463463374607431768211455",
            "b": 7,
            "c": -1,
            "d": "1.5",
        });
        assert_eq!(amount_param(&params, "a").expect("a"), u128::MAX);
        assert_eq!(amount_param(&params, "b").expect("b"), 7);
        assert!(amount_param(&params, "c").is_err());
        assert!(amount_param(&params, "d").is_err());
        assert_eq!(
            amount_param(&params, "missing").expect_err("missing").code,
            -32602
        );
    }

    #[test]
    fn test_account_param() {
        let hex = AccountId::new([0xab; 32]).to_string();
        let params = json!({"ok": hex, "short": "abcd", "num": 5});
        assert_eq!(
            account_param(&params, "ok").expect("ok"),
            AccountId::new([0xab; 32])
        );
        assert!(account_param(&params, "short").is_err());
        assert!(account_param(&params, "num").is_err());
        assert_eq!(optional_account_param(&params, "absent").expect("absent"), None);
    }

    #[test]
    fn test_time_indexes_param() {
        let params = json!({"ok": [1, 2, 2], "bad": [1, -2], "scalar": 3});
        assert_eq!(time_indexes_param(&params, "ok").expect("ok"), vec![1, 2, 2]);
        assert!(time_indexes_param(&params, "bad").is_err());
        assert!(time_indexes_param(&params, "scalar").is_err());
    }

    #[test]
    fn test_u32_param() {
        let params = json!({"small": 255, "big": 5_000_000_000_u64});
        assert_eq!(u32_param(&params, "small").expect("small"), 255);
        assert!(u32_param(&params, "big").is_err());
    }
}
