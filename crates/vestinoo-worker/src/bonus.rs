use serde::Deserialize;
use serde_json::Value;

use crate::config::ReconcilerConfig;
use crate::error::{StoreError, ValidationError};
use crate::event::UserRef;
use crate::money::Money;
use crate::referral::{referral_credits, resolve_referrers};
use crate::store::{BonusClaim, LedgerStore, ReferralCredit, ReferralLevel, TaskBonusCommit};

/// A request to move an accumulated referral bonus into the spendable balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusClaimRequest {
    pub user_id: String,
    pub level: ReferralLevel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBonusClaim {
    #[serde(alias = "userId")]
    uid: Option<String>,
    level: Option<u8>,
    // Older clients name the bonus field instead of sending a level; the amount is ignored.
    #[serde(alias = "referralBonusLeve1")]
    referral_bonus_level1: Option<Value>,
    #[serde(alias = "referralBonussLeve2")]
    referral_bonus_level2: Option<Value>,
}

impl BonusClaimRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let raw = RawBonusClaim::deserialize(payload).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let user_id = raw
            .uid
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("uid"))?;

        let level = match (raw.level, raw.referral_bonus_level1, raw.referral_bonus_level2) {
            (Some(n), _, _) => ReferralLevel::try_from(n).map_err(|n| ValidationError::InvalidField {
                field: "level",
                reason: format!("expected 1 or 2, got {n}"),
            })?,
            (None, Some(_), _) => ReferralLevel::Level1,
            (None, None, Some(_)) => ReferralLevel::Level2,
            (None, None, None) => return Err(ValidationError::MissingField("level")),
        };

        Ok(BonusClaimRequest { user_id, level })
    }
}

/// Move the stored bonus for `request.level` into the user's balance.
///
/// The amount always comes from the ledger, never from the request.
pub async fn claim_referral_bonus<S>(store: &S, request: &BonusClaimRequest) -> Result<BonusClaim, StoreError>
where
    S: LedgerStore + ?Sized,
{
    store.claim_referral_bonus(&request.user_id, request.level).await
}

/// A request to move the accumulated task bonus into the spendable balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBonusRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct RawTaskBonusClaim {
    #[serde(alias = "userId")]
    uid: Option<String>,
}

impl TaskBonusRequest {
    /// Any client-sent amount or referrer fields are ignored.
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let raw = RawTaskBonusClaim::deserialize(payload).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let user_id = raw
            .uid
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("uid"))?;
        Ok(TaskBonusRequest { user_id })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskBonusClaim {
    Claimed {
        amount: Money,
        balance: Money,
        referral_credits: Vec<ReferralCredit>,
        /// Referrers that could not be paid.
        warnings: Vec<String>,
    },
    NothingToClaim,
    UserNotFound,
}

/// Move the user's whole task bonus into their balance and pay the task
/// commission on it to both referrer levels.
///
/// Commission is computed from a snapshot and committed only if the task bonus
/// is unchanged; a concurrent postback or claim triggers a recompute, up to
/// `config.max_commit_attempts` times.
pub async fn claim_task_bonus<S>(
    store: &S,
    request: &TaskBonusRequest,
    config: &ReconcilerConfig,
    now: i64,
) -> Result<TaskBonusClaim, StoreError>
where
    S: LedgerStore + ?Sized,
{
    let user_ref = UserRef::Account(request.user_id.clone());
    let mut attempt = 0;
    loop {
        attempt += 1;

        let Some(user) = store.find_user(&user_ref).await? else {
            return Ok(TaskBonusClaim::UserNotFound);
        };
        let amount = user.task_bonus;
        if !amount.is_positive() {
            return Ok(TaskBonusClaim::NothingToClaim);
        }

        let mut warnings = Vec::new();
        let referrers = resolve_referrers(store, &user, &mut warnings).await?;
        let credits = referral_credits(&referrers, &config.task_rates, amount)
            .ok_or_else(|| StoreError::Backend("monetary overflow".to_string()))?;

        let commit = TaskBonusCommit {
            user_id: user.id,
            amount,
            referral_credits: credits,
            claimed_at: now,
        };
        match store.claim_task_bonus(&commit).await {
            Ok(balance) => {
                return Ok(TaskBonusClaim::Claimed {
                    amount,
                    balance,
                    referral_credits: commit.referral_credits,
                    warnings,
                })
            }
            Err(StoreError::Conflict) if attempt < config.max_commit_attempts => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_level_requests() {
        let req = BonusClaimRequest::from_json(&json!({"uid": "u1", "level": 2})).unwrap();
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.level, ReferralLevel::Level2);
    }

    #[test]
    fn accepts_legacy_field_names() {
        let l1 = BonusClaimRequest::from_json(&json!({"uid": "u1", "referralBonusLeve1": 12.5})).unwrap();
        let l2 = BonusClaimRequest::from_json(&json!({"uid": "u1", "referralBonussLeve2": 1})).unwrap();
        assert_eq!(l1.level, ReferralLevel::Level1);
        assert_eq!(l2.level, ReferralLevel::Level2);
    }

    #[test]
    fn task_bonus_request_needs_only_the_user() {
        let req = TaskBonusRequest::from_json(&json!({
            "userId": " u9 ",
            "taskBonus": 1_000_000,
            "referralBy": "SOMEONE",
        }))
        .unwrap();
        assert_eq!(req.user_id, "u9");
        assert_eq!(
            TaskBonusRequest::from_json(&json!({"email": "u9@example.com"})),
            Err(ValidationError::MissingField("uid"))
        );
    }

    #[test]
    fn rejects_incomplete_requests() {
        assert_eq!(
            BonusClaimRequest::from_json(&json!({"level": 1})),
            Err(ValidationError::MissingField("uid"))
        );
        assert_eq!(
            BonusClaimRequest::from_json(&json!({"uid": "u1"})),
            Err(ValidationError::MissingField("level"))
        );
        assert!(matches!(
            BonusClaimRequest::from_json(&json!({"uid": "u1", "level": 3})),
            Err(ValidationError::InvalidField { field: "level", .. })
        ));
    }
}
