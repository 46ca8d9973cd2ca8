use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::money::Money;

/// Statuses that mean the provider considers the payment settled.
const TERMINAL_STATUSES: [&str; 3] = ["confirmed", "finished", "success"];

/// Epoch values at or above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

pub fn is_terminal_status(status: &str) -> bool {
    let status = status.trim();
    TERMINAL_STATUSES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(status))
}

/// How the depositing user is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    /// A user key or an external payment-provider user id.
    Account(String),
    /// A provider payment id recorded when the payment was created.
    Payment(String),
}

impl UserRef {
    pub fn as_str(&self) -> &str {
        match self {
            UserRef::Account(s) | UserRef::Payment(s) => s,
        }
    }
}

/// A validated, settled deposit notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub transaction_id: String,
    pub status: String,
    pub amount: Money,
    pub coin: Option<String>,
    pub address: Option<String>,
    /// On-chain hash, when the provider sends one separately from the payment id.
    pub txid: Option<String>,
    pub user: UserRef,
    /// Unix seconds.
    pub timestamp: Option<i64>,
}

impl DepositEvent {
    /// Identifier recorded as the user's `lastDepositTx`.
    pub fn last_deposit_tx(&self) -> &str {
        self.txid.as_deref().unwrap_or(&self.transaction_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    /// Intermediate provider state; acknowledged without mutation.
    Pending { transaction_id: String, status: String },
    Settled(DepositEvent),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDepositEvent {
    #[serde(alias = "transaction_id", alias = "paymentId", alias = "payment_id")]
    transaction_id: Option<Value>,
    txid: Option<Value>,
    #[serde(alias = "payment_status")]
    status: Option<Value>,
    #[serde(alias = "paid_amount", alias = "paidAmount")]
    amount: Option<Value>,
    #[serde(alias = "currency", alias = "pay_currency")]
    coin: Option<Value>,
    #[serde(alias = "pay_address")]
    address: Option<Value>,
    #[serde(alias = "user_id")]
    user_id: Option<Value>,
    timestamp: Option<Value>,
}

fn identifier(value: Option<&Value>, field: &'static str) -> Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(Some(n.to_string())),
        Some(other) => Err(ValidationError::InvalidField {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn parse_amount(value: Option<&Value>) -> Result<Money, ValidationError> {
    let raw = match value {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("amount")),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field: "amount",
                reason: format!("expected a number, got {other}"),
            })
        }
    };

    let amount = Money::parse(&raw)?;
    if !amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount(raw));
    }
    Ok(amount)
}

fn epoch_to_secs(n: i64) -> i64 {
    if n.abs() >= EPOCH_MILLIS_THRESHOLD {
        n / 1000
    } else {
        n
    }
}

fn parse_timestamp(value: Option<&Value>) -> Result<Option<i64>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .map(|n| Some(epoch_to_secs(n)))
            .ok_or_else(|| ValidationError::InvalidTimestamp(n.to_string())),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(Some(dt.timestamp()));
            }
            s.parse::<i64>()
                .map(|n| Some(epoch_to_secs(n)))
                .map_err(|_| ValidationError::InvalidTimestamp(s.to_string()))
        }
        Some(other) => Err(ValidationError::InvalidTimestamp(other.to_string())),
    }
}

/// Validate a raw webhook payload.
///
/// The transaction id and status are checked first; amount, user and timestamp are
/// only required once the status is terminal.
pub fn parse_deposit_event(payload: &Value) -> Result<ParsedEvent, ValidationError> {
    if !payload.is_object() {
        return Err(ValidationError::NotAnObject);
    }

    let raw = RawDepositEvent::deserialize(payload)
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let txid = identifier(raw.txid.as_ref(), "txid")?;
    let transaction_id = identifier(raw.transaction_id.as_ref(), "transactionId")?
        .or_else(|| txid.clone())
        .ok_or(ValidationError::MissingField("transactionId"))?;

    let status = match raw.status {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(ValidationError::MissingField("status"))
        }
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field: "status",
                reason: format!("expected a string, got {other}"),
            })
        }
    };

    if !is_terminal_status(&status) {
        return Ok(ParsedEvent::Pending {
            transaction_id,
            status,
        });
    }

    let amount = parse_amount(raw.amount.as_ref())?;
    let user = match identifier(raw.user_id.as_ref(), "userId")? {
        Some(id) => UserRef::Account(id),
        None => UserRef::Payment(transaction_id.clone()),
    };

    Ok(ParsedEvent::Settled(DepositEvent {
        transaction_id,
        status,
        amount,
        coin: identifier(raw.coin.as_ref(), "coin")?,
        address: identifier(raw.address.as_ref(), "address")?,
        txid,
        user,
        timestamp: parse_timestamp(raw.timestamp.as_ref())?,
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn settled(payload: Value) -> DepositEvent {
        match parse_deposit_event(&payload).unwrap() {
            ParsedEvent::Settled(e) => e,
            other => panic!("expected settled event, got {other:?}"),
        }
    }

    #[test]
    fn parses_xaigate_shape() {
        let event = settled(json!({
            "transaction_id": "tx-1",
            "status": "confirmed",
            "coin": "USDT",
            "amount": "100.00",
            "address": "TQ123",
            "txid": "0xabc",
            "timestamp": "2025-05-01T10:00:00Z",
            "userId": "xai-77",
        }));

        assert_eq!(event.transaction_id, "tx-1");
        assert_eq!(event.amount, Money::from_cents(10_000));
        assert_eq!(event.user, UserRef::Account("xai-77".into()));
        assert_eq!(event.coin.as_deref(), Some("USDT"));
        assert_eq!(event.last_deposit_tx(), "0xabc");
        assert_eq!(event.timestamp, Some(1_746_093_600));
    }

    #[test]
    fn parses_nowpayments_shape_without_user() {
        let event = settled(json!({
            "payment_id": 5077125051u64,
            "payment_status": "finished",
            "pay_address": "0xdead",
            "paid_amount": 12.5,
            "pay_currency": "usdttrc20",
        }));

        assert_eq!(event.transaction_id, "5077125051");
        assert_eq!(event.user, UserRef::Payment("5077125051".into()));
        assert_eq!(event.amount, Money::from_cents(1_250));
        assert_eq!(event.last_deposit_tx(), "5077125051");
        assert_eq!(event.timestamp, None);
    }

    #[test]
    fn txid_is_fallback_idempotency_key() {
        let event = settled(json!({"txid": "0xfeed", "status": "SUCCESS", "amount": 3, "userId": "u1"}));
        assert_eq!(event.transaction_id, "0xfeed");
    }

    #[test]
    fn intermediate_status_skips_amount_validation() {
        let parsed = parse_deposit_event(&json!({
            "transactionId": "tx-2",
            "status": "waiting",
            "amount": 0,
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ParsedEvent::Pending {
                transaction_id: "tx-2".into(),
                status: "waiting".into()
            }
        );
    }

    #[test]
    fn rejects_missing_or_bad_fields() {
        assert_eq!(parse_deposit_event(&json!([1, 2])), Err(ValidationError::NotAnObject));
        assert_eq!(
            parse_deposit_event(&json!({"status": "confirmed", "amount": 1})),
            Err(ValidationError::MissingField("transactionId"))
        );
        assert_eq!(
            parse_deposit_event(&json!({"transactionId": "t", "amount": 1})),
            Err(ValidationError::MissingField("status"))
        );
        assert_eq!(
            parse_deposit_event(&json!({"transactionId": "t", "status": "confirmed"})),
            Err(ValidationError::MissingField("amount"))
        );
        assert!(matches!(
            parse_deposit_event(&json!({"transactionId": "t", "status": "confirmed", "amount": "-4"})),
            Err(ValidationError::NonPositiveAmount(_))
        ));
        assert!(matches!(
            parse_deposit_event(&json!({"transactionId": "t", "status": "confirmed", "amount": "ten"})),
            Err(ValidationError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_deposit_event(&json!({"transactionId": "t", "status": "confirmed", "amount": true})),
            Err(ValidationError::InvalidField { field: "amount", .. })
        ));
        assert!(matches!(
            parse_deposit_event(&json!({
                "transactionId": "t", "status": "confirmed", "amount": 1, "timestamp": "yesterday"
            })),
            Err(ValidationError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn epoch_timestamps_accept_seconds_and_millis() {
        let secs = settled(json!({"transactionId": "t", "status": "confirmed", "amount": 1, "userId": "u", "timestamp": 1_700_000_000}));
        let millis = settled(json!({"transactionId": "t", "status": "confirmed", "amount": 1, "userId": "u", "timestamp": 1_700_000_000_123i64}));
        let text = settled(json!({"transactionId": "t", "status": "confirmed", "amount": 1, "userId": "u", "timestamp": "1700000000"}));
        assert_eq!(secs.timestamp, Some(1_700_000_000));
        assert_eq!(millis.timestamp, Some(1_700_000_000));
        assert_eq!(text.timestamp, Some(1_700_000_000));
    }
}
