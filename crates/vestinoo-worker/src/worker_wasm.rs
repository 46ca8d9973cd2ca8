use worker::*;

#[path = "wasm/db/mod.rs"]
pub mod db;
#[path = "wasm/env.rs"]
pub mod env;
#[path = "wasm/handlers/mod.rs"]
pub mod handlers;
#[path = "wasm/http.rs"]
pub mod http;
#[path = "wasm/sweep.rs"]
pub mod sweep;

use http::{json_with_cors, not_found};

use crate::util::{now_ts, ts_to_rfc3339};

#[event(fetch)]
pub async fn fetch(req: Request, env: Env, ctx: Context) -> Result<Response> {
    console_error_panic_hook::set_once();

    if req.method() == Method::Options {
        let resp = Response::empty()?.with_status(204);
        return json_with_cors(&req, resp);
    }

    let url = req.url()?;
    let path = url.path();

    if req.method() == Method::Get && path == "/health" {
        let body = serde_json::json!({
            "ok": true,
            "service": "vestinoo",
            "time": ts_to_rfc3339(now_ts()),
        });
        let resp = Response::from_json(&body)?;
        return json_with_cors(&req, resp);
    }

    // Deposit webhook. The XaiGate path is kept for provider dashboards configured before the rename.
    if req.method() == Method::Post && (path == "/api/webhook" || path == "/api/xai-webhook") {
        return handlers::deposits::handle_deposit_webhook(req, &env, &ctx).await;
    }

    if req.method() == Method::Post && path == "/api/referrals/claim" {
        return handlers::referrals::handle_referral_claim(req, &env).await;
    }

    if req.method() == Method::Post && path == "/api/tasks/claim" {
        return handlers::claims::handle_task_bonus_claim(req, &env).await;
    }

    if req.method() == Method::Post && path == "/api/profit/claim" {
        return handlers::claims::handle_daily_profit_claim(req, &env).await;
    }

    if req.method() == Method::Get && path == "/api/postbacks/adgem" {
        return handlers::postbacks::handle_adgem_postback(&req, &env).await;
    }

    if req.method() == Method::Post && path == "/v1/admin/migrations/up" {
        return handlers::admin::handle_migrations_up(&req, &env).await;
    }

    if req.method() == Method::Get && path == "/v1/admin/db/ping" {
        return handlers::admin::handle_ledger_status(&req, &env).await;
    }

    not_found(&req)
}
