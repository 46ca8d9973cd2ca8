use std::time::Duration;

use sea_orm::{ConnectOptions, Database};
use worker::{Env, Error, Result};

use super::env::{env_string, require_env};

pub mod store;

pub use store::{LedgerHealth, SeaOrmStore};

/// libSQL over HTTP from a Worker: a single connection per invocation, short timeouts.
fn connect_options(env: &Env) -> Result<ConnectOptions> {
    let mut options = ConnectOptions::new(require_env(env, "LIBSQL_URL")?);
    if let Some(token) = env_string(env, "LIBSQL_AUTH_TOKEN") {
        options.libsql_auth_token(token);
    }
    options
        .max_connections(1)
        .min_connections(0)
        .connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(30))
        .sqlx_logging(false);
    Ok(options)
}

pub async fn ledger_store(env: &Env) -> Result<SeaOrmStore> {
    let db = Database::connect(connect_options(env)?)
        .await
        .map_err(|e| Error::RustError(format!("libSQL connect failed: {e}")))?;
    Ok(SeaOrmStore::new(db))
}
