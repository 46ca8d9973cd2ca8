use worker::{Env, Request, Response, Result};

use crate::worker_wasm::env::env_string;
use crate::worker_wasm::http::error_response;

pub fn extract_bearer_token(req: &Request) -> Result<Option<String>> {
    let Some(raw) = req.headers().get("Authorization")? else {
        return Ok(None);
    };

    let raw = raw.trim();
    let Some((scheme, rest)) = raw.split_once(' ') else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Ok(None);
    }

    let token = rest.trim();
    if token.is_empty() {
        return Ok(None);
    }

    Ok(Some(token.to_string()))
}

/// Shared authorization logic for admin endpoints: the bearer token must equal
/// `MIGRATIONS_TOKEN`. Admin endpoints are disabled while it is unset.
///
/// Returns `Ok(None)` when authorized; otherwise returns an error response.
pub fn ensure_admin_authorized(req: &Request, env: &Env) -> Result<Option<Response>> {
    let Some(required) = env_string(env, "MIGRATIONS_TOKEN") else {
        return Ok(Some(error_response(
            req,
            403,
            "admin_disabled",
            "MIGRATIONS_TOKEN is not configured",
        )?));
    };

    let Some(token) = extract_bearer_token(req)? else {
        return Ok(Some(error_response(
            req,
            401,
            "missing_token",
            "Missing Authorization Bearer token",
        )?));
    };

    if token != required {
        return Ok(Some(error_response(
            req,
            401,
            "unauthorized",
            "Invalid migrations token",
        )?));
    }

    Ok(None)
}

/// `x-api-key` check for endpoints called by the Vestinoo frontend.
pub fn ensure_api_key(req: &Request, env: &Env) -> Result<Option<Response>> {
    let presented = req.headers().get("x-api-key")?;
    let authorized = match (presented, env_string(env, "API_AUTH_KEY")) {
        (Some(key), Some(required)) => key.trim() == required,
        _ => false,
    };

    if !authorized {
        return Ok(Some(error_response(
            req,
            401,
            "unauthorized",
            "Unauthorized request",
        )?));
    }

    Ok(None)
}
