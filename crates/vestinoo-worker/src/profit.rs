//! Daily profit claims.
//!
//! An active plan pays its `daily_profit` into the balance at most once per
//! [`CLAIM_INTERVAL_SECS`], from activation until the plan's duration runs out.
//! The amount always comes from the stored plan.

use serde::Deserialize;
use serde_json::Value;

use crate::config::ReconcilerConfig;
use crate::error::{StoreError, ValidationError};
use crate::event::UserRef;
use crate::money::Money;
use crate::plans::SECS_PER_DAY;
use crate::store::{LedgerStore, ProfitCommit, UserRecord};

pub const CLAIM_INTERVAL_SECS: i64 = SECS_PER_DAY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfitClaimRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct RawProfitClaim {
    #[serde(alias = "userId")]
    uid: Option<String>,
}

impl ProfitClaimRequest {
    /// A client-sent `dailyProfit` is ignored.
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let raw = RawProfitClaim::deserialize(payload).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let user_id = raw
            .uid
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("uid"))?;
        Ok(ProfitClaimRequest { user_id })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfitClaim {
    Claimed {
        amount: Money,
        balance: Money,
        next_claim_at: i64,
    },
    TooSoon {
        next_claim_at: i64,
    },
    NoActivePlan,
    PlanExpired {
        expired_at: i64,
    },
    UserNotFound,
}

/// End of the user's current plan.
///
/// Rows written before plan expiry was stored fall back to the configured tier
/// paying the same daily profit.
fn plan_end(user: &UserRecord, config: &ReconcilerConfig) -> Option<i64> {
    if !user.daily_profit.is_positive() {
        return None;
    }
    let activated_at = user.deposit_time?;
    user.plan_expires_at.or_else(|| {
        config
            .plans
            .tiers()
            .iter()
            .find(|tier| tier.daily_profit == user.daily_profit)
            .map(|tier| tier.ends_at(activated_at))
    })
}

/// Pay one day of plan profit into the user's balance.
pub async fn claim_daily_profit<S>(
    store: &S,
    request: &ProfitClaimRequest,
    config: &ReconcilerConfig,
    now: i64,
) -> Result<ProfitClaim, StoreError>
where
    S: LedgerStore + ?Sized,
{
    let user_ref = UserRef::Account(request.user_id.clone());
    let mut attempt = 0;
    loop {
        attempt += 1;

        let Some(user) = store.find_user(&user_ref).await? else {
            return Ok(ProfitClaim::UserNotFound);
        };
        let Some(expires_at) = plan_end(&user, config) else {
            return Ok(ProfitClaim::NoActivePlan);
        };
        if now >= expires_at {
            return Ok(ProfitClaim::PlanExpired {
                expired_at: expires_at,
            });
        }
        if let Some(last) = user.last_profit_claim {
            let next_claim_at = last.saturating_add(CLAIM_INTERVAL_SECS);
            if now < next_claim_at {
                return Ok(ProfitClaim::TooSoon { next_claim_at });
            }
        }

        let commit = ProfitCommit {
            user_id: user.id,
            expected_last_claim: user.last_profit_claim,
            amount: user.daily_profit,
            claimed_at: now,
        };
        match store.claim_daily_profit(&commit).await {
            Ok(balance) => {
                return Ok(ProfitClaim::Claimed {
                    amount: commit.amount,
                    balance,
                    next_claim_at: now.saturating_add(CLAIM_INTERVAL_SECS),
                })
            }
            // Another claim landed first; the next snapshot decides.
            Err(StoreError::Conflict) if attempt < config.max_commit_attempts => continue,
            Err(e) => return Err(e),
        }
    }
}
