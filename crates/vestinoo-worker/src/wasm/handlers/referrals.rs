use serde_json::Value;
use worker::{Env, Request, Response, Result};

use crate::bonus::{claim_referral_bonus, BonusClaimRequest};
use crate::error::StoreError;
use crate::store::BonusClaim;
use crate::worker_wasm::db::ledger_store;
use crate::worker_wasm::http::{error_response, internal_error_response, json_response};

use super::admin_auth::ensure_api_key;

/// `POST /api/referrals/claim`: move a referral bonus into the user's balance.
pub async fn handle_referral_claim(mut req: Request, env: &Env) -> Result<Response> {
    if let Some(resp) = ensure_api_key(&req, env)? {
        return Ok(resp);
    }

    let payload: Value = match req.json().await {
        Ok(v) => v,
        Err(_) => return error_response(&req, 400, "invalid_request", "Body must be JSON"),
    };
    let request = match BonusClaimRequest::from_json(&payload) {
        Ok(r) => r,
        Err(e) => return error_response(&req, 400, "invalid_request", &e.to_string()),
    };

    let store = match ledger_store(env).await {
        Ok(store) => store,
        Err(e) => return internal_error_response(&req, "Failed to open libSQL connection", &e),
    };

    let level = u8::from(request.level);
    match claim_referral_bonus(&store, &request).await {
        Ok(BonusClaim::Claimed { amount, balance }) => json_response(
            &req,
            200,
            &serde_json::json!({
                "success": true,
                "message": format!("Level {level} bonus transferred successfully."),
                "claimed": amount,
                "userBalance": balance,
            }),
        ),
        Ok(BonusClaim::NothingToClaim) => json_response(
            &req,
            200,
            &serde_json::json!({
                "success": true,
                "message": format!("No level {level} bonus to transfer."),
                "claimed": "0.00",
            }),
        ),
        Ok(BonusClaim::UserNotFound) => error_response(&req, 404, "user_not_found", "User not found"),
        Err(StoreError::Conflict) => error_response(
            &req,
            409,
            "bonus_changed",
            "Bonus changed while claiming; retry",
        ),
        Err(e) => internal_error_response(&req, "Referral bonus claim failed", &e),
    }
}
