use serde_json::Value;
use worker::{Env, Request, Response, Result};

use crate::bonus::{claim_task_bonus, TaskBonusClaim, TaskBonusRequest};
use crate::error::{StoreError, ValidationError};
use crate::profit::{claim_daily_profit, ProfitClaim, ProfitClaimRequest};
use crate::util::{now_ts, ts_to_rfc3339};
use crate::worker_wasm::db::ledger_store;
use crate::worker_wasm::env::reconciler_config;
use crate::worker_wasm::http::{error_response, internal_error_response, json_response};

use super::admin_auth::ensure_api_key;

async fn read_json(req: &mut Request) -> std::result::Result<Value, ValidationError> {
    req.json()
        .await
        .map_err(|_| ValidationError::Malformed("body must be JSON".to_string()))
}

/// `POST /api/tasks/claim`: move the task bonus into the balance and pay the
/// referrers their task commission.
pub async fn handle_task_bonus_claim(mut req: Request, env: &Env) -> Result<Response> {
    if let Some(resp) = ensure_api_key(&req, env)? {
        return Ok(resp);
    }

    let request = match read_json(&mut req).await.and_then(|v| TaskBonusRequest::from_json(&v)) {
        Ok(r) => r,
        Err(e) => return error_response(&req, 400, "invalid_request", &e.to_string()),
    };
    let config = match reconciler_config(env) {
        Ok(c) => c,
        Err(e) => return internal_error_response(&req, "Invalid reconciler configuration", &e),
    };
    let store = match ledger_store(env).await {
        Ok(store) => store,
        Err(e) => return internal_error_response(&req, "Failed to open libSQL connection", &e),
    };

    match claim_task_bonus(&store, &request, &config, now_ts()).await {
        Ok(TaskBonusClaim::Claimed {
            amount,
            balance,
            referral_credits,
            warnings,
        }) => {
            for warning in &warnings {
                worker::console_log!("task bonus {}: {warning}", request.user_id);
            }
            json_response(
                &req,
                200,
                &serde_json::json!({
                    "success": true,
                    "message": "Task bonus and referrals processed.",
                    "claimed": amount,
                    "userBalance": balance,
                    "referralCredits": referral_credits,
                }),
            )
        }
        Ok(TaskBonusClaim::NothingToClaim) => json_response(
            &req,
            200,
            &serde_json::json!({
                "success": true,
                "message": "No task bonus to transfer.",
                "claimed": "0.00",
            }),
        ),
        Ok(TaskBonusClaim::UserNotFound) => error_response(&req, 404, "user_not_found", "User not found"),
        Err(StoreError::Conflict) => error_response(
            &req,
            409,
            "bonus_changed",
            "Task bonus changed while claiming; retry",
        ),
        Err(e) => internal_error_response(&req, "Task bonus claim failed", &e),
    }
}

/// `POST /api/profit/claim`: pay one day of the active plan's profit.
pub async fn handle_daily_profit_claim(mut req: Request, env: &Env) -> Result<Response> {
    if let Some(resp) = ensure_api_key(&req, env)? {
        return Ok(resp);
    }

    let request = match read_json(&mut req).await.and_then(|v| ProfitClaimRequest::from_json(&v)) {
        Ok(r) => r,
        Err(e) => return error_response(&req, 400, "invalid_request", &e.to_string()),
    };
    let config = match reconciler_config(env) {
        Ok(c) => c,
        Err(e) => return internal_error_response(&req, "Invalid reconciler configuration", &e),
    };
    let store = match ledger_store(env).await {
        Ok(store) => store,
        Err(e) => return internal_error_response(&req, "Failed to open libSQL connection", &e),
    };

    match claim_daily_profit(&store, &request, &config, now_ts()).await {
        Ok(ProfitClaim::Claimed {
            amount,
            balance,
            next_claim_at,
        }) => json_response(
            &req,
            200,
            &serde_json::json!({
                "success": true,
                "message": "Daily profit claimed successfully",
                "claimed": amount,
                "newBalance": balance,
                "nextClaimAt": ts_to_rfc3339(next_claim_at),
            }),
        ),
        Ok(ProfitClaim::TooSoon { next_claim_at }) => error_response(
            &req,
            429,
            "already_claimed",
            &format!("Next claim opens at {}", ts_to_rfc3339(next_claim_at)),
        ),
        Ok(ProfitClaim::NoActivePlan) => error_response(&req, 409, "no_active_plan", "No active plan"),
        Ok(ProfitClaim::PlanExpired { expired_at }) => error_response(
            &req,
            409,
            "plan_expired",
            &format!("Plan ended at {}", ts_to_rfc3339(expired_at)),
        ),
        Ok(ProfitClaim::UserNotFound) => error_response(&req, 404, "user_not_found", "User not found"),
        Err(e) => internal_error_response(&req, "Daily profit claim failed", &e),
    }
}
