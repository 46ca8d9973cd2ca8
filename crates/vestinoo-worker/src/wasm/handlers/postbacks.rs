use worker::{Env, Request, Response, Result};

use crate::postback::{credit_adgem_postback, verify_adgem_postback};
use crate::store::{ErrorLogEntry, LedgerStore, PostbackOutcome};
use crate::util::{now_ts, uuid_v4};
use crate::worker_wasm::db::ledger_store;
use crate::worker_wasm::env::require_env;
use crate::worker_wasm::http::{error_response, internal_error_response, json_response};

/// `GET /api/postbacks/adgem`: credit a signed AdGem offer completion.
pub async fn handle_adgem_postback(req: &Request, env: &Env) -> Result<Response> {
    let key = match require_env(env, "ADGEM_POSTBACK_KEY") {
        Ok(k) => k,
        Err(e) => return internal_error_response(req, "AdGem postbacks are not configured", &e),
    };

    let url = req.url()?;
    let postback = match verify_adgem_postback(url.as_str(), key.as_bytes()) {
        Ok(p) => p,
        Err(e) => return error_response(req, e.status_code(), e.code(), &e.to_string()),
    };

    let store = match ledger_store(env).await {
        Ok(store) => store,
        Err(e) => return internal_error_response(req, "Failed to open libSQL connection", &e),
    };
    let now = now_ts();

    match credit_adgem_postback(&store, &postback, now).await {
        Ok(PostbackOutcome::Credited { task_bonus }) => json_response(
            req,
            200,
            &serde_json::json!({
                "success": true,
                "result": "credited",
                "transaction": postback.transaction_id,
                "taskBonus": task_bonus,
            }),
        ),
        Ok(PostbackOutcome::AlreadyProcessed) => json_response(
            req,
            200,
            &serde_json::json!({
                "success": true,
                "result": "already_processed",
                "transaction": postback.transaction_id,
            }),
        ),
        Ok(PostbackOutcome::UserNotFound) => error_response(req, 404, "user_not_found", "User not found"),
        Err(e) => {
            let entry = ErrorLogEntry {
                id: uuid_v4(),
                kind: "postback".to_string(),
                transaction_id: Some(postback.transaction_id.clone()),
                message: e.to_string(),
                payload: url.to_string(),
                created_at: now,
            };
            if let Err(log_err) = store.append_error(&entry).await {
                worker::console_log!("Failed to record postback error: {log_err}");
            }
            internal_error_response(req, "AdGem postback failed", &e)
        }
    }
}
