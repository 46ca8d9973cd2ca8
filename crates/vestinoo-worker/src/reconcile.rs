//! Deposit webhook reconciliation.
//!
//! One settled payment event is applied to exactly one user, exactly once:
//!
//! 1. validate and status-gate the payload,
//! 2. claim the transaction id (atomic create-if-absent),
//! 3. resolve the user and compute the new total, plan and referral credits,
//! 4. commit everything plus the `Applied` marker as one guarded store write,
//!    recomputing from a fresh snapshot if a concurrent deposit got there first.
//!
//! Any failure after the claim releases it as `Failed` and is written to the
//! error log, so the provider's retry can start over cleanly. Downstream
//! notification is a separate step ([`Reconciler::notify`]) that callers may run
//! after responding.

use serde::Serialize;
use serde_json::Value;

use crate::config::ReconcilerConfig;
use crate::error::{NotifyError, ReconcileError, StoreError};
use crate::event::{parse_deposit_event, DepositEvent, ParsedEvent};
use crate::money::Money;
use crate::notify::DepositNotifier;
use crate::plans::PlanTier;
use crate::referral::{referral_credits, resolve_referrers};
use crate::store::{ActivePlan, ClaimOutcome, DepositCommit, ErrorLogEntry, LedgerStore, ReferralCredit, UserRecord};
use crate::util::uuid_v4;

/// Error-log kind for downstream notification failures.
pub const NOTIFY_FAILURE_KIND: &str = "notify";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDeposit {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: Money,
    /// Cumulative deposit after this event.
    pub deposit: Money,
    pub plan: Option<PlanTier>,
    pub first_deposit: bool,
    pub referral_credits: Vec<ReferralCredit>,
    pub coin: Option<String>,
    pub address: Option<String>,
    /// Non-fatal data problems met while applying (missing or duplicate referrers).
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepositOutcome {
    Ignored { transaction_id: String, status: String },
    AlreadyProcessed { transaction_id: String },
    Applied(AppliedDeposit),
}

impl DepositOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            DepositOutcome::Ignored {
                transaction_id,
                status,
            } => serde_json::json!({
                "success": true,
                "result": "ignored",
                "transactionId": transaction_id,
                "status": status,
            }),
            DepositOutcome::AlreadyProcessed { transaction_id } => serde_json::json!({
                "success": true,
                "result": "already_processed",
                "transactionId": transaction_id,
            }),
            DepositOutcome::Applied(applied) => serde_json::json!({
                "success": true,
                "result": "applied",
                "deposit": applied,
            }),
        }
    }
}

/// Best-effort transaction id for logging payloads that failed validation.
fn transaction_id_hint(payload: &Value) -> Option<String> {
    ["transactionId", "transaction_id", "paymentId", "payment_id", "txid"]
        .iter()
        .find_map(|key| match payload.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

pub struct Reconciler<S, N> {
    store: S,
    notifier: N,
    config: ReconcilerConfig,
}

impl<S, N> Reconciler<S, N>
where
    S: LedgerStore,
    N: DepositNotifier,
{
    pub fn new(store: S, notifier: N, config: ReconcilerConfig) -> Self {
        Reconciler {
            store,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Apply one webhook payload. `now` is the receipt time in Unix seconds.
    ///
    /// The notifier is not called here; see [`Reconciler::notify`].
    pub async fn process(&self, payload: &Value, now: i64) -> Result<DepositOutcome, ReconcileError> {
        let raw = payload.to_string();

        let event = match parse_deposit_event(payload) {
            Ok(ParsedEvent::Settled(event)) => event,
            Ok(ParsedEvent::Pending {
                transaction_id,
                status,
            }) => {
                return Ok(DepositOutcome::Ignored {
                    transaction_id,
                    status,
                })
            }
            Err(e) => {
                let err = ReconcileError::from(e);
                self.record_failure(&err, transaction_id_hint(payload), &raw, now).await;
                return Err(err);
            }
        };

        let claim_token = uuid_v4();
        let claim = self
            .store
            .claim_transaction(
                &event.transaction_id,
                &claim_token,
                now,
                self.config.claim_lease_secs,
            )
            .await;
        match claim {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::AlreadyApplied) => {
                return Ok(DepositOutcome::AlreadyProcessed {
                    transaction_id: event.transaction_id,
                })
            }
            Ok(ClaimOutcome::InProgress) => return Err(ReconcileError::InProgress(event.transaction_id)),
            Err(e) => {
                let err = ReconcileError::from(e);
                self.record_failure(&err, Some(event.transaction_id.clone()), &raw, now)
                    .await;
                return Err(err);
            }
        }

        match self.apply(&event, &claim_token, &raw, now).await {
            Ok(applied) => Ok(DepositOutcome::Applied(applied)),
            Err(err) => {
                let mut message = err.to_string();
                if let Err(e) = self
                    .store
                    .release_transaction(&event.transaction_id, &claim_token)
                    .await
                {
                    // The claim stays `Processing` until the lease runs out.
                    message = format!("{message}; claim release failed: {e}");
                }
                self.log_error(err.code(), message, Some(event.transaction_id.clone()), &raw, now)
                    .await;
                Err(err)
            }
        }
    }

    /// Tell the notifier about an applied deposit.
    ///
    /// Runs after the commit, so a failure never touches the ledger: it is written
    /// to the error log under [`NOTIFY_FAILURE_KIND`] and handed back for logging.
    pub async fn notify(&self, applied: &AppliedDeposit, payload: &str, now: i64) -> Result<(), NotifyError> {
        let Err(e) = self.notifier.deposit_applied(applied).await else {
            return Ok(());
        };
        self.log_error(
            NOTIFY_FAILURE_KIND,
            e.to_string(),
            Some(applied.transaction_id.clone()),
            payload,
            now,
        )
        .await;
        Err(e)
    }

    /// Write an error-log entry for a failed event.
    ///
    /// Best effort: the caller still reports the original error if this write fails.
    pub async fn record_failure(
        &self,
        err: &ReconcileError,
        transaction_id: Option<String>,
        payload: &str,
        now: i64,
    ) {
        self.log_error(err.code(), err.to_string(), transaction_id, payload, now)
            .await;
    }

    async fn log_error(
        &self,
        kind: &str,
        message: String,
        transaction_id: Option<String>,
        payload: &str,
        now: i64,
    ) {
        let entry = ErrorLogEntry {
            id: uuid_v4(),
            kind: kind.to_string(),
            transaction_id,
            message,
            payload: payload.to_string(),
            created_at: now,
        };
        let _ = self.store.append_error(&entry).await;
    }

    async fn apply(
        &self,
        event: &DepositEvent,
        claim_token: &str,
        payload: &str,
        now: i64,
    ) -> Result<AppliedDeposit, ReconcileError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let user = self
                .store
                .find_user(&event.user)
                .await?
                .ok_or_else(|| ReconcileError::UserNotFound(event.user.as_str().to_string()))?;

            let (commit, applied) = self.prepare(event, claim_token, &user, payload, now).await?;

            match self.store.commit_deposit(&commit).await {
                Ok(()) => return Ok(applied),
                Err(StoreError::Conflict) if attempt < self.config.max_commit_attempts => continue,
                Err(StoreError::ClaimLost(tx)) => return Err(ReconcileError::InProgress(tx)),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Compute the full mutation for `event` against the `user` snapshot.
    async fn prepare(
        &self,
        event: &DepositEvent,
        claim_token: &str,
        user: &UserRecord,
        payload: &str,
        now: i64,
    ) -> Result<(DepositCommit, AppliedDeposit), ReconcileError> {
        let overflow = || ReconcileError::Overflow(event.transaction_id.clone());

        let total = user.deposit.checked_add(event.amount).ok_or_else(overflow)?;
        let plan = self.config.plans.select(total).copied();
        let active_plan = plan.map(|p| {
            let activated_at = event.timestamp.unwrap_or(now);
            ActivePlan {
                daily_profit: p.daily_profit,
                activated_at,
                expires_at: p.ends_at(activated_at),
            }
        });

        let first_deposit = !user.is_returning_depositor;
        let mut warnings = Vec::new();
        let credits = if first_deposit {
            let referrers = resolve_referrers(&self.store, user, &mut warnings).await?;
            referral_credits(&referrers, &self.config.rates, event.amount).ok_or_else(overflow)?
        } else {
            Vec::new()
        };

        let commit = DepositCommit {
            transaction_id: event.transaction_id.clone(),
            claim_token: claim_token.to_string(),
            user_id: user.id.clone(),
            expected_deposit: user.deposit,
            expected_returning: user.is_returning_depositor,
            amount: event.amount,
            plan: active_plan,
            mark_returning: first_deposit,
            last_deposit_tx: event.last_deposit_tx().to_string(),
            referral_credits: credits.clone(),
            payload: payload.to_string(),
            applied_at: now,
        };

        let applied = AppliedDeposit {
            transaction_id: event.transaction_id.clone(),
            user_id: user.id.clone(),
            amount: event.amount,
            deposit: total,
            plan,
            first_deposit,
            referral_credits: credits,
            coin: event.coin.clone(),
            address: event.address.clone(),
            warnings,
        };

        Ok((commit, applied))
    }
}
