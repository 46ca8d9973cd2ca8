//! Storage seam for the ledger.
//!
//! The reconciler never talks to a database directly: it reads snapshots through
//! [`LedgerStore`] and hands back a fully computed [`DepositCommit`] that the store
//! applies atomically. Production uses SeaORM on libSQL, tests use
//! [`crate::memory::InMemoryStore`].

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::event::UserRef;
use crate::money::Money;

/// Snapshot of the ledger-relevant columns of a user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub provider_user_id: Option<String>,
    pub referral_code: String,
    pub referral_by: Option<String>,
    pub level2_referral_by: Option<String>,
    pub deposit: Money,
    pub daily_profit: Money,
    /// Unix seconds.
    pub deposit_time: Option<i64>,
    /// Unix seconds; daily profit stops accruing here.
    pub plan_expires_at: Option<i64>,
    pub last_profit_claim: Option<i64>,
    pub referral_bonus_level1: Money,
    pub referral_bonus_level2: Money,
    pub level1: i64,
    pub level2: i64,
    pub is_returning_depositor: bool,
    pub last_deposit_tx: Option<String>,
    pub user_balance: Money,
    pub task_bonus: Money,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u8")]
pub enum ReferralLevel {
    Level1,
    Level2,
}

impl From<ReferralLevel> for u8 {
    fn from(level: ReferralLevel) -> u8 {
        match level {
            ReferralLevel::Level1 => 1,
            ReferralLevel::Level2 => 2,
        }
    }
}

impl TryFrom<u8> for ReferralLevel {
    type Error = u8;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(ReferralLevel::Level1),
            2 => Ok(ReferralLevel::Level2),
            other => Err(other),
        }
    }
}

/// Commission owed to one referrer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCredit {
    pub referrer_id: String,
    pub level: ReferralLevel,
    pub amount: Money,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivePlan {
    pub daily_profit: Money,
    /// Unix seconds.
    pub activated_at: i64,
    pub expires_at: i64,
}

/// Everything one settled deposit changes, computed from a user snapshot.
///
/// The store must apply it all-or-nothing and only if the user's `deposit` and
/// `is_returning_depositor` still equal the `expected_*` values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositCommit {
    pub transaction_id: String,
    pub claim_token: String,
    pub user_id: String,
    pub expected_deposit: Money,
    pub expected_returning: bool,
    pub amount: Money,
    pub plan: Option<ActivePlan>,
    pub mark_returning: bool,
    pub last_deposit_tx: String,
    /// Applied in order: level 1, then level 2.
    pub referral_credits: Vec<ReferralCredit>,
    /// Original webhook payload, kept on the processed-transaction entry.
    pub payload: String,
    pub applied_at: i64,
}

/// Move a user's whole task bonus into their balance and pay commission on it.
///
/// Applied only if the stored task bonus still equals `amount`. Commission goes
/// to the referrers' bonus columns; referral counts are left alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskBonusCommit {
    pub user_id: String,
    pub amount: Money,
    pub referral_credits: Vec<ReferralCredit>,
    pub claimed_at: i64,
}

/// Credit one day of plan profit, guarded by the previous claim time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfitCommit {
    pub user_id: String,
    pub expected_last_claim: Option<i64>,
    pub amount: Money,
    pub claimed_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Processing,
    Applied,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Processing => "processing",
            TransactionStatus::Applied => "applied",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(TransactionStatus::Processing),
            "applied" => Some(TransactionStatus::Applied),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns processing of the transaction.
    Claimed,
    AlreadyApplied,
    /// Another handler holds a live claim.
    InProgress,
}

/// Append-only failure record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorLogEntry {
    pub id: String,
    pub kind: String,
    pub transaction_id: Option<String>,
    pub message: String,
    pub payload: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BonusClaim {
    Claimed { amount: Money, balance: Money },
    NothingToClaim,
    UserNotFound,
}

/// A verified offer-wall postback credit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostbackCredit {
    pub transaction_id: String,
    pub user_id: String,
    pub offer: String,
    pub payout: Money,
    pub credit: Money,
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostbackOutcome {
    Credited { task_bonus: Money },
    AlreadyProcessed,
    UserNotFound,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait LedgerStore {
    /// Atomically create the processed-transaction entry in `Processing` state owned
    /// by `claim_token`, or take over a `Failed` entry or one whose claim is older
    /// than `lease_secs`.
    async fn claim_transaction(
        &self,
        transaction_id: &str,
        claim_token: &str,
        now: i64,
        lease_secs: i64,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Mark a claimed transaction `Failed` so a retry can take it over.
    async fn release_transaction(&self, transaction_id: &str, claim_token: &str) -> Result<(), StoreError>;

    async fn find_user(&self, user: &UserRef) -> Result<Option<UserRecord>, StoreError>;

    /// Users whose `referral_code` equals `code`, ordered by user id.
    async fn find_users_by_referral_code(&self, code: &str) -> Result<Vec<UserRecord>, StoreError>;

    /// Apply a deposit and mark its transaction `Applied` in one atomic step.
    ///
    /// Fails with [`StoreError::Conflict`] if the user snapshot is stale and
    /// [`StoreError::ClaimLost`] if the claim token no longer owns the transaction.
    async fn commit_deposit(&self, commit: &DepositCommit) -> Result<(), StoreError>;

    async fn append_error(&self, entry: &ErrorLogEntry) -> Result<(), StoreError>;

    /// Move the whole accumulated bonus of `level` into the user's balance.
    async fn claim_referral_bonus(&self, user_id: &str, level: ReferralLevel) -> Result<BonusClaim, StoreError>;

    /// Record the postback and credit the user's task bonus, once per transaction.
    async fn credit_postback(&self, credit: &PostbackCredit) -> Result<PostbackOutcome, StoreError>;

    /// Apply a task bonus claim atomically and return the new balance.
    ///
    /// [`StoreError::Conflict`] if the task bonus changed or a referrer is gone.
    async fn claim_task_bonus(&self, claim: &TaskBonusCommit) -> Result<Money, StoreError>;

    /// Credit daily profit and stamp the claim time; returns the new balance.
    ///
    /// [`StoreError::Conflict`] if the last claim time is no longer `expected_last_claim`.
    async fn claim_daily_profit(&self, claim: &ProfitCommit) -> Result<Money, StoreError>;
}
