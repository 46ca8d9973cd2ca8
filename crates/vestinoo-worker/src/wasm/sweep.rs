use async_trait::async_trait;
use worker::{Env, Headers, Method, Request, RequestInit};

use crate::error::NotifyError;
use crate::notify::DepositNotifier;
use crate::reconcile::AppliedDeposit;
use crate::worker_wasm::env::env_string;

fn is_success_status(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// Posts each applied deposit to the wallet sweep / gas top-up service.
///
/// Without `SWEEP_NOTIFY_URL` it does nothing.
pub struct SweepNotifier {
    url: Option<String>,
}

impl SweepNotifier {
    pub fn from_env(env: &Env) -> Self {
        SweepNotifier {
            url: env_string(env, "SWEEP_NOTIFY_URL"),
        }
    }

    async fn post(&self, url: &str, deposit: &AppliedDeposit) -> worker::Result<()> {
        let json = serde_json::to_string(deposit)
            .map_err(|e| worker::Error::RustError(format!("Failed to serialize sweep payload: {e}")))?;

        let headers = Headers::new();
        headers.set("Content-Type", "application/json")?;
        headers.set("Accept", "application/json")?;
        headers.set("User-Agent", "Vestinoo/0.1 (Cloudflare Worker)")?;

        let mut init = RequestInit::new();
        init.with_method(Method::Post);
        init.with_headers(headers);
        init.with_body(Some(json.into()));

        let req = Request::new_with_init(url, &init)?;

        let mut resp = worker::Fetch::Request(req).send().await?;
        let status = resp.status_code();
        if is_success_status(status) {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(worker::Error::RustError(format!(
            "Sweep notify failed (status={status}): {body}"
        )))
    }
}

#[async_trait(?Send)]
impl DepositNotifier for SweepNotifier {
    async fn deposit_applied(&self, deposit: &AppliedDeposit) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };
        self.post(url, deposit)
            .await
            .map_err(|e| NotifyError(e.to_string()))
    }
}
