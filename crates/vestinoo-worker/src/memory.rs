use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::event::UserRef;
use crate::money::Money;
use crate::store::{
    BonusClaim, ClaimOutcome, DepositCommit, ErrorLogEntry, LedgerStore, PostbackCredit, PostbackOutcome,
    ProfitCommit, ReferralLevel, TaskBonusCommit, TransactionStatus, UserRecord,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionEntry {
    pub status: TransactionStatus,
    pub claim_token: String,
    pub claimed_at: i64,
    pub attempts: u32,
    pub payload: Option<String>,
    pub applied_at: Option<i64>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<String, UserRecord>,
    payments: HashMap<String, String>,
    transactions: HashMap<String, TransactionEntry>,
    errors: Vec<ErrorLogEntry>,
    postbacks: HashMap<String, PostbackCredit>,
}

/// Mutex-backed [`LedgerStore`]. Every trait call is atomic with respect to the others.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

fn overflow() -> StoreError {
    StoreError::Backend("monetary overflow".to_string())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store poisoned".to_string()))
    }

    fn inspect(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.inspect().users.insert(user.id.clone(), user);
    }

    pub fn insert_payment(&self, payment_id: &str, user_id: &str) {
        self.inspect()
            .payments
            .insert(payment_id.to_string(), user_id.to_string());
    }

    pub fn user(&self, id: &str) -> Option<UserRecord> {
        self.inspect().users.get(id).cloned()
    }

    pub fn transaction(&self, id: &str) -> Option<TransactionEntry> {
        self.inspect().transactions.get(id).cloned()
    }

    pub fn applied_transactions(&self) -> usize {
        self.inspect()
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Applied)
            .count()
    }

    pub fn errors(&self) -> Vec<ErrorLogEntry> {
        self.inspect().errors.clone()
    }

    pub fn postback(&self, transaction_id: &str) -> Option<PostbackCredit> {
        self.inspect().postbacks.get(transaction_id).cloned()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl LedgerStore for InMemoryStore {
    async fn claim_transaction(
        &self,
        transaction_id: &str,
        claim_token: &str,
        now: i64,
        lease_secs: i64,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut state = self.lock()?;

        let Some(entry) = state.transactions.get_mut(transaction_id) else {
            state.transactions.insert(
                transaction_id.to_string(),
                TransactionEntry {
                    status: TransactionStatus::Processing,
                    claim_token: claim_token.to_string(),
                    claimed_at: now,
                    attempts: 1,
                    payload: None,
                    applied_at: None,
                },
            );
            return Ok(ClaimOutcome::Claimed);
        };

        let takeover = match entry.status {
            TransactionStatus::Applied => return Ok(ClaimOutcome::AlreadyApplied),
            TransactionStatus::Failed => true,
            TransactionStatus::Processing => now - entry.claimed_at >= lease_secs,
        };
        if !takeover {
            return Ok(ClaimOutcome::InProgress);
        }

        entry.status = TransactionStatus::Processing;
        entry.claim_token = claim_token.to_string();
        entry.claimed_at = now;
        entry.attempts += 1;
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_transaction(&self, transaction_id: &str, claim_token: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(entry) = state.transactions.get_mut(transaction_id) {
            if entry.status == TransactionStatus::Processing && entry.claim_token == claim_token {
                entry.status = TransactionStatus::Failed;
            }
        }
        Ok(())
    }

    async fn find_user(&self, user: &UserRef) -> Result<Option<UserRecord>, StoreError> {
        let state = self.lock()?;
        let found = match user {
            UserRef::Account(key) => state.users.get(key).or_else(|| {
                state
                    .users
                    .values()
                    .find(|u| u.provider_user_id.as_deref() == Some(key.as_str()))
            }),
            UserRef::Payment(payment_id) => state
                .payments
                .get(payment_id)
                .and_then(|user_id| state.users.get(user_id)),
        };
        Ok(found.cloned())
    }

    async fn find_users_by_referral_code(&self, code: &str) -> Result<Vec<UserRecord>, StoreError> {
        if code.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.lock()?;
        Ok(state
            .users
            .values()
            .filter(|u| u.referral_code == code)
            .cloned()
            .collect())
    }

    async fn commit_deposit(&self, commit: &DepositCommit) -> Result<(), StoreError> {
        let mut state = self.lock()?;

        let owns_claim = state.transactions.get(&commit.transaction_id).is_some_and(|t| {
            t.status == TransactionStatus::Processing && t.claim_token == commit.claim_token
        });
        if !owns_claim {
            return Err(StoreError::ClaimLost(commit.transaction_id.clone()));
        }

        // Stage every touched row, then write back only if all of them succeed.
        let mut staged: BTreeMap<String, UserRecord> = BTreeMap::new();

        let mut user = state.users.get(&commit.user_id).cloned().ok_or(StoreError::Conflict)?;
        if user.deposit != commit.expected_deposit
            || user.is_returning_depositor != commit.expected_returning
        {
            return Err(StoreError::Conflict);
        }
        user.deposit = user.deposit.checked_add(commit.amount).ok_or_else(overflow)?;
        if let Some(plan) = commit.plan {
            user.daily_profit = plan.daily_profit;
            user.deposit_time = Some(plan.activated_at);
            user.plan_expires_at = Some(plan.expires_at);
        }
        if commit.mark_returning {
            user.is_returning_depositor = true;
        }
        user.last_deposit_tx = Some(commit.last_deposit_tx.clone());
        staged.insert(user.id.clone(), user);

        for credit in &commit.referral_credits {
            let mut referrer = match staged.remove(&credit.referrer_id) {
                Some(r) => r,
                None => state
                    .users
                    .get(&credit.referrer_id)
                    .cloned()
                    .ok_or(StoreError::Conflict)?,
            };
            match credit.level {
                ReferralLevel::Level1 => {
                    referrer.referral_bonus_level1 = referrer
                        .referral_bonus_level1
                        .checked_add(credit.amount)
                        .ok_or_else(overflow)?;
                    referrer.level1 += 1;
                }
                ReferralLevel::Level2 => {
                    referrer.referral_bonus_level2 = referrer
                        .referral_bonus_level2
                        .checked_add(credit.amount)
                        .ok_or_else(overflow)?;
                    referrer.level2 += 1;
                }
            }
            staged.insert(referrer.id.clone(), referrer);
        }

        state.users.extend(staged);
        if let Some(entry) = state.transactions.get_mut(&commit.transaction_id) {
            entry.status = TransactionStatus::Applied;
            entry.payload = Some(commit.payload.clone());
            entry.applied_at = Some(commit.applied_at);
        }
        Ok(())
    }

    async fn append_error(&self, entry: &ErrorLogEntry) -> Result<(), StoreError> {
        self.lock()?.errors.push(entry.clone());
        Ok(())
    }

    async fn claim_referral_bonus(&self, user_id: &str, level: ReferralLevel) -> Result<BonusClaim, StoreError> {
        let mut state = self.lock()?;
        let Some(user) = state.users.get_mut(user_id) else {
            return Ok(BonusClaim::UserNotFound);
        };

        let bonus = match level {
            ReferralLevel::Level1 => &mut user.referral_bonus_level1,
            ReferralLevel::Level2 => &mut user.referral_bonus_level2,
        };
        let amount = *bonus;
        if !amount.is_positive() {
            return Ok(BonusClaim::NothingToClaim);
        }

        let balance = user.user_balance.checked_add(amount).ok_or_else(overflow)?;
        *bonus = Money::ZERO;
        user.user_balance = balance;
        Ok(BonusClaim::Claimed { amount, balance })
    }

    async fn credit_postback(&self, credit: &PostbackCredit) -> Result<PostbackOutcome, StoreError> {
        let mut state = self.lock()?;
        if state.postbacks.contains_key(&credit.transaction_id) {
            return Ok(PostbackOutcome::AlreadyProcessed);
        }
        let Some(user) = state.users.get_mut(&credit.user_id) else {
            return Ok(PostbackOutcome::UserNotFound);
        };

        let task_bonus = user.task_bonus.checked_add(credit.credit).ok_or_else(overflow)?;
        user.task_bonus = task_bonus;
        state
            .postbacks
            .insert(credit.transaction_id.clone(), credit.clone());
        Ok(PostbackOutcome::Credited { task_bonus })
    }

    async fn claim_task_bonus(&self, claim: &TaskBonusCommit) -> Result<Money, StoreError> {
        let mut state = self.lock()?;

        let mut staged: BTreeMap<String, UserRecord> = BTreeMap::new();
        let mut user = state.users.get(&claim.user_id).cloned().ok_or(StoreError::Conflict)?;
        if user.task_bonus != claim.amount {
            return Err(StoreError::Conflict);
        }
        user.user_balance = user.user_balance.checked_add(claim.amount).ok_or_else(overflow)?;
        user.task_bonus = Money::ZERO;
        let balance = user.user_balance;
        staged.insert(user.id.clone(), user);

        for credit in &claim.referral_credits {
            let mut referrer = match staged.remove(&credit.referrer_id) {
                Some(r) => r,
                None => state
                    .users
                    .get(&credit.referrer_id)
                    .cloned()
                    .ok_or(StoreError::Conflict)?,
            };
            let bonus = match credit.level {
                ReferralLevel::Level1 => &mut referrer.referral_bonus_level1,
                ReferralLevel::Level2 => &mut referrer.referral_bonus_level2,
            };
            *bonus = bonus.checked_add(credit.amount).ok_or_else(overflow)?;
            staged.insert(referrer.id.clone(), referrer);
        }

        state.users.extend(staged);
        Ok(balance)
    }

    async fn claim_daily_profit(&self, claim: &ProfitCommit) -> Result<Money, StoreError> {
        let mut state = self.lock()?;
        let user = state.users.get_mut(&claim.user_id).ok_or(StoreError::Conflict)?;
        if user.last_profit_claim != claim.expected_last_claim {
            return Err(StoreError::Conflict);
        }

        let balance = user.user_balance.checked_add(claim.amount).ok_or_else(overflow)?;
        user.user_balance = balance;
        user.last_profit_claim = Some(claim.claimed_at);
        Ok(balance)
    }
}
