//! Operator endpoints, guarded by `MIGRATIONS_TOKEN`.

use migration::{Migrator, MigratorTrait};
use worker::{Env, Request, Response, Result};

use crate::util::now_ts;
use crate::worker_wasm::db::ledger_store;
use crate::worker_wasm::env::reconciler_config;
use crate::worker_wasm::http::{internal_error_response, json_response};

use super::admin_auth::ensure_admin_authorized;

/// `?steps=N`, default 1.
///
/// Each libSQL statement is a Worker subrequest and subrequests are capped per
/// invocation, so large schema changes are applied over several calls.
fn requested_steps(req: &Request) -> u32 {
    req.url()
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "steps")
                .and_then(|(_, v)| v.parse::<u32>().ok())
        })
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// `GET /v1/admin/db/ping`: connectivity, schema state and deposit ledger backlog.
pub async fn handle_ledger_status(req: &Request, env: &Env) -> Result<Response> {
    if let Some(resp) = ensure_admin_authorized(req, env)? {
        return Ok(resp);
    }

    let config = match reconciler_config(env) {
        Ok(c) => c,
        Err(e) => return internal_error_response(req, "Invalid reconciler configuration", &e),
    };
    let store = match ledger_store(env).await {
        Ok(store) => store,
        Err(e) => return internal_error_response(req, "Failed to open libSQL connection", &e),
    };
    if let Err(e) = store.connection().ping().await {
        return internal_error_response(req, "libSQL ping failed", &e);
    }

    let pending = match Migrator::get_pending_migrations(store.connection()).await {
        Ok(p) => p,
        Err(e) => return internal_error_response(req, "Failed to read pending migrations", &e),
    };
    // The ledger tables may not exist before the first migration run.
    let ledger = if pending.is_empty() {
        match store.health(now_ts(), config.claim_lease_secs).await {
            Ok(h) => serde_json::json!({
                "staleClaims": h.stale_claims,
                "failedDeposits": h.failed_deposits,
                "errorsLastDay": h.errors_last_day,
            }),
            Err(e) => return internal_error_response(req, "Failed to read ledger state", &e),
        }
    } else {
        serde_json::Value::Null
    };

    json_response(
        req,
        200,
        &serde_json::json!({
            "success": true,
            "db": { "ok": true },
            "migrations": {
                "pending": pending.len(),
                "next": pending.first().map(|m| m.name()),
            },
            "ledger": ledger,
        }),
    )
}

/// `POST /v1/admin/migrations/up?steps=N`: apply up to N pending migrations.
pub async fn handle_migrations_up(req: &Request, env: &Env) -> Result<Response> {
    if let Some(resp) = ensure_admin_authorized(req, env)? {
        return Ok(resp);
    }

    let store = match ledger_store(env).await {
        Ok(store) => store,
        Err(e) => return internal_error_response(req, "Failed to open libSQL connection", &e),
    };
    let db = store.connection();
    let steps = requested_steps(req);

    let before = match Migrator::get_pending_migrations(db).await {
        Ok(p) => p.len(),
        Err(e) => return internal_error_response(req, "Failed to read pending migrations", &e),
    };
    let to_apply = steps.min(u32::try_from(before).unwrap_or(u32::MAX));
    if to_apply > 0 {
        if let Err(e) = Migrator::up(db, Some(to_apply)).await {
            return internal_error_response(req, "Failed to apply migrations", &e);
        }
    }

    let after = match Migrator::get_pending_migrations(db).await {
        Ok(p) => p,
        Err(e) => return internal_error_response(req, "Failed to read pending migrations", &e),
    };

    json_response(
        req,
        200,
        &serde_json::json!({
            "success": true,
            "migrations": {
                "requested_steps": steps,
                "applied_now": before.saturating_sub(after.len()),
                "pending": after.len(),
                "done": after.is_empty(),
                "next": after.first().map(|m| m.name()),
            }
        }),
    )
}
