use serde_json::Value;
use worker::{Context, Env, Request, Response, Result};

use crate::error::{ReconcileError, ValidationError};
use crate::reconcile::{DepositOutcome, Reconciler};
use crate::signature::verify_hex;
use crate::util::now_ts;
use crate::worker_wasm::db::ledger_store;
use crate::worker_wasm::env::{env_string, reconciler_config};
use crate::worker_wasm::http::{error_response, internal_error_response, json_response};
use crate::worker_wasm::sweep::SweepNotifier;

const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// `POST /api/webhook`: apply one deposit notification from the payment provider.
///
/// The sweep notification for an applied deposit runs after the response, on `ctx`.
pub async fn handle_deposit_webhook(mut req: Request, env: &Env, ctx: &Context) -> Result<Response> {
    let body = req.text().await?;

    if let Some(secret) = env_string(env, "DEPOSIT_WEBHOOK_SECRET") {
        let signature = req.headers().get(SIGNATURE_HEADER)?.unwrap_or_default();
        if !verify_hex(secret.as_bytes(), body.as_bytes(), &signature) {
            return error_response(&req, 401, "invalid_signature", "Invalid webhook signature");
        }
    }

    let config = match reconciler_config(env) {
        Ok(c) => c,
        Err(e) => return internal_error_response(&req, "Invalid reconciler configuration", &e),
    };
    let store = match ledger_store(env).await {
        Ok(store) => store,
        Err(e) => return internal_error_response(&req, "Failed to open libSQL connection", &e),
    };
    let reconciler = Reconciler::new(store, SweepNotifier::from_env(env), config);
    let now = now_ts();

    let payload: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            let err = ReconcileError::Validation(ValidationError::Malformed(e.to_string()));
            reconciler.record_failure(&err, None, &body, now).await;
            return error_response(&req, err.status_code(), err.code(), &err.to_string());
        }
    };

    let result = reconciler.process(&payload, now).await;
    match result {
        Ok(outcome) => {
            let resp = json_response(&req, 200, &outcome.to_json());
            if let DepositOutcome::Applied(applied) = outcome {
                for warning in &applied.warnings {
                    worker::console_log!("deposit {}: {warning}", applied.transaction_id);
                }
                ctx.wait_until(async move {
                    if let Err(e) = reconciler.notify(&applied, &body, now).await {
                        worker::console_log!("deposit {}: {e}", applied.transaction_id);
                    }
                });
            }
            resp
        }
        Err(err) if err.status_code() >= 500 => {
            internal_error_response(&req, "Deposit reconciliation failed", &err)
        }
        Err(err) => error_response(&req, err.status_code(), err.code(), &err.to_string()),
    }
}
