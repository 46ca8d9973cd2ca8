use thiserror::Error;

use crate::money::MoneyError;

/// Malformed inbound event. Nothing is mutated and nothing is marked processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(String),
    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A guarded write found the row changed since it was read.
    #[error("concurrent update conflict")]
    Conflict,
    /// The processing claim now belongs to another handler.
    #[error("processing claim for transaction `{0}` was lost")]
    ClaimLost(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Everything that can stop a deposit from being applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no user matches `{0}`")]
    UserNotFound(String),
    #[error("transaction `{0}` is being processed by another request")]
    InProgress(String),
    #[error("amount overflow while applying transaction `{0}`")]
    Overflow(String),
    #[error("persistence failure: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        ReconcileError::Persistence(e)
    }
}

impl ReconcileError {
    /// HTTP status returned to the webhook caller.
    pub fn status_code(&self) -> u16 {
        match self {
            ReconcileError::Validation(_) => 400,
            ReconcileError::UserNotFound(_) => 404,
            ReconcileError::InProgress(_) => 409,
            ReconcileError::Overflow(_) | ReconcileError::Persistence(_) => 500,
        }
    }

    /// Stable machine-readable code, also used as the error-log `kind`.
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Validation(_) => "invalid_event",
            ReconcileError::UserNotFound(_) => "user_not_found",
            ReconcileError::InProgress(_) => "deposit_in_progress",
            ReconcileError::Overflow(_) => "amount_overflow",
            ReconcileError::Persistence(_) => "persistence_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deposit notification failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid plan table: {0}")]
    InvalidPlans(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_response_contract() {
        assert_eq!(ReconcileError::from(ValidationError::MissingField("amount")).status_code(), 400);
        assert_eq!(ReconcileError::UserNotFound("u".into()).status_code(), 404);
        assert_eq!(ReconcileError::InProgress("tx".into()).status_code(), 409);
        assert_eq!(ReconcileError::from(StoreError::Conflict).status_code(), 500);
        assert_eq!(
            ReconcileError::from(StoreError::Backend("down".into())).code(),
            "persistence_failure"
        );
    }
}
