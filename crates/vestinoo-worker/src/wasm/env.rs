use worker::{Env, Error, Result};

use crate::config::ReconcilerConfig;

pub fn normalize_env_value(raw: String) -> String {
    let trimmed = raw.trim();

    if let Some(inner) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return inner.trim().to_string();
    }

    trimmed.to_string()
}

/// Reads a plain var or a secret; secrets are how keys and tokens are deployed.
pub fn env_string(env: &Env, key: &str) -> Option<String> {
    env.var(key)
        .map(|v| v.to_string())
        .or_else(|_| env.secret(key).map(|v| v.to_string()))
        .ok()
        .map(normalize_env_value)
        .filter(|s| !s.is_empty())
}

pub fn require_env(env: &Env, key: &str) -> Result<String> {
    env_string(env, key).ok_or_else(|| Error::RustError(format!("{key} is required")))
}

pub fn reconciler_config(env: &Env) -> Result<ReconcilerConfig> {
    ReconcilerConfig::from_lookup(|key| env_string(env, key)).map_err(|e| Error::RustError(e.to_string()))
}
