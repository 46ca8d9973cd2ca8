use async_trait::async_trait;
use sea_orm::sea_query::{Condition, Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};

use entity::{deposit_error, deposit_log, payment, postback_log, user};

use crate::error::StoreError;
use crate::event::UserRef;
use crate::money::Money;
use crate::store::{
    BonusClaim, ClaimOutcome, DepositCommit, ErrorLogEntry, LedgerStore, PostbackCredit, PostbackOutcome,
    ProfitCommit, ReferralLevel, TaskBonusCommit, TransactionStatus, UserRecord,
};

fn backend(e: sea_orm::DbErr) -> StoreError {
    StoreError::Backend(e.to_string())
}

async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        worker::console_log!("libSQL rollback failed: {e}");
    }
}

/// `column = column + ?`, so concurrent credits commute.
fn increment(column: &str, by: i64) -> sea_orm::sea_query::SimpleExpr {
    Expr::cust_with_values(format!("{column} + ?"), [by])
}

fn user_record(m: user::Model) -> UserRecord {
    UserRecord {
        id: m.id,
        provider_user_id: m.provider_user_id,
        referral_code: m.referral_code,
        referral_by: m.referral_by,
        level2_referral_by: m.level2_referral_by,
        deposit: Money::from_cents(m.deposit),
        daily_profit: Money::from_cents(m.daily_profit),
        deposit_time: m.deposit_time,
        plan_expires_at: m.plan_expires_at,
        last_profit_claim: m.last_profit_claim,
        referral_bonus_level1: Money::from_cents(m.referral_bonus_level1),
        referral_bonus_level2: Money::from_cents(m.referral_bonus_level2),
        level1: m.level1,
        level2: m.level2,
        is_returning_depositor: m.is_returning_depositor,
        last_deposit_tx: m.last_deposit_tx,
        user_balance: Money::from_cents(m.user_balance),
        task_bonus: Money::from_cents(m.task_bonus),
    }
}

/// Counters for the admin status endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerHealth {
    /// `Processing` claims past their lease, left by handlers that died mid-event.
    pub stale_claims: u64,
    /// Deposits whose last attempt failed and that await a provider retry.
    pub failed_deposits: u64,
    pub errors_last_day: u64,
}

/// [`LedgerStore`] over libSQL.
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        SeaOrmStore { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn health(&self, now: i64, lease_secs: i64) -> Result<LedgerHealth, StoreError> {
        let stale_claims = deposit_log::Entity::find()
            .filter(deposit_log::Column::Status.eq(TransactionStatus::Processing.as_str()))
            .filter(deposit_log::Column::ClaimedAt.lte(now - lease_secs))
            .count(&self.db)
            .await
            .map_err(backend)?;
        let failed_deposits = deposit_log::Entity::find()
            .filter(deposit_log::Column::Status.eq(TransactionStatus::Failed.as_str()))
            .count(&self.db)
            .await
            .map_err(backend)?;
        let errors_last_day = deposit_error::Entity::find()
            .filter(deposit_error::Column::CreatedAt.gte(now - 86_400))
            .count(&self.db)
            .await
            .map_err(backend)?;

        Ok(LedgerHealth {
            stale_claims,
            failed_deposits,
            errors_last_day,
        })
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<user::Model>, StoreError> {
        user::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(backend)
    }
}

#[async_trait(?Send)]
impl LedgerStore for SeaOrmStore {
    async fn claim_transaction(
        &self,
        transaction_id: &str,
        claim_token: &str,
        now: i64,
        lease_secs: i64,
    ) -> Result<ClaimOutcome, StoreError> {
        let row = deposit_log::ActiveModel {
            transaction_id: Set(transaction_id.to_string()),
            status: Set(TransactionStatus::Processing.as_str().to_string()),
            claim_token: Set(claim_token.to_string()),
            claimed_at: Set(now),
            attempts: Set(1),
            payload: Set(None),
            applied_at: Set(None),
        };

        let inserted = deposit_log::Entity::insert(row)
            .on_conflict(
                OnConflict::column(deposit_log::Column::TransactionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(backend)?;
        if inserted == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        // Take over a failed attempt or an expired claim.
        let stale = Condition::any()
            .add(deposit_log::Column::Status.eq(TransactionStatus::Failed.as_str()))
            .add(
                Condition::all()
                    .add(deposit_log::Column::Status.eq(TransactionStatus::Processing.as_str()))
                    .add(deposit_log::Column::ClaimedAt.lte(now - lease_secs)),
            );
        let res = deposit_log::Entity::update_many()
            .col_expr(
                deposit_log::Column::Status,
                Expr::value(TransactionStatus::Processing.as_str()),
            )
            .col_expr(deposit_log::Column::ClaimToken, Expr::value(claim_token))
            .col_expr(deposit_log::Column::ClaimedAt, Expr::value(now))
            .col_expr(deposit_log::Column::Attempts, increment("attempts", 1))
            .filter(deposit_log::Column::TransactionId.eq(transaction_id))
            .filter(stale)
            .exec(&self.db)
            .await
            .map_err(backend)?;
        if res.rows_affected == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        let existing = deposit_log::Entity::find_by_id(transaction_id.to_string())
            .one(&self.db)
            .await
            .map_err(backend)?;
        match existing.and_then(|row| TransactionStatus::parse(&row.status)) {
            Some(TransactionStatus::Applied) => Ok(ClaimOutcome::AlreadyApplied),
            _ => Ok(ClaimOutcome::InProgress),
        }
    }

    async fn release_transaction(&self, transaction_id: &str, claim_token: &str) -> Result<(), StoreError> {
        deposit_log::Entity::update_many()
            .col_expr(
                deposit_log::Column::Status,
                Expr::value(TransactionStatus::Failed.as_str()),
            )
            .filter(deposit_log::Column::TransactionId.eq(transaction_id))
            .filter(deposit_log::Column::Status.eq(TransactionStatus::Processing.as_str()))
            .filter(deposit_log::Column::ClaimToken.eq(claim_token))
            .exec(&self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn find_user(&self, user_ref: &UserRef) -> Result<Option<UserRecord>, StoreError> {
        let found = match user_ref {
            UserRef::Account(key) => match self.user_by_id(key).await? {
                Some(m) => Some(m),
                None => user::Entity::find()
                    .filter(user::Column::ProviderUserId.eq(key.as_str()))
                    .one(&self.db)
                    .await
                    .map_err(backend)?,
            },
            UserRef::Payment(payment_id) => {
                let mapping = payment::Entity::find_by_id(payment_id.to_string())
                    .one(&self.db)
                    .await
                    .map_err(backend)?;
                match mapping {
                    Some(p) => self.user_by_id(&p.user_id).await?,
                    None => None,
                }
            }
        };
        Ok(found.map(user_record))
    }

    async fn find_users_by_referral_code(&self, code: &str) -> Result<Vec<UserRecord>, StoreError> {
        if code.is_empty() {
            return Ok(Vec::new());
        }
        let users = user::Entity::find()
            .filter(user::Column::ReferralCode.eq(code))
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await
            .map_err(backend)?;
        Ok(users.into_iter().map(user_record).collect())
    }

    async fn commit_deposit(&self, commit: &DepositCommit) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(backend)?;

        let marked = deposit_log::Entity::update_many()
            .col_expr(
                deposit_log::Column::Status,
                Expr::value(TransactionStatus::Applied.as_str()),
            )
            .col_expr(deposit_log::Column::Payload, Expr::value(Some(commit.payload.clone())))
            .col_expr(deposit_log::Column::AppliedAt, Expr::value(Some(commit.applied_at)))
            .filter(deposit_log::Column::TransactionId.eq(commit.transaction_id.as_str()))
            .filter(deposit_log::Column::Status.eq(TransactionStatus::Processing.as_str()))
            .filter(deposit_log::Column::ClaimToken.eq(commit.claim_token.as_str()))
            .exec(&txn)
            .await;
        match marked {
            Ok(res) if res.rows_affected == 1 => {}
            Ok(_) => {
                rollback(txn).await;
                return Err(StoreError::ClaimLost(commit.transaction_id.clone()));
            }
            Err(e) => {
                rollback(txn).await;
                return Err(backend(e));
            }
        }

        let mut update = user::Entity::update_many()
            .col_expr(user::Column::Deposit, increment("deposit", commit.amount.cents()))
            .col_expr(
                user::Column::LastDepositTx,
                Expr::value(Some(commit.last_deposit_tx.clone())),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(commit.applied_at));
        if let Some(plan) = commit.plan {
            update = update
                .col_expr(user::Column::DailyProfit, Expr::value(plan.daily_profit.cents()))
                .col_expr(user::Column::DepositTime, Expr::value(Some(plan.activated_at)))
                .col_expr(user::Column::PlanExpiresAt, Expr::value(Some(plan.expires_at)));
        }
        if commit.mark_returning {
            update = update.col_expr(user::Column::IsReturningDepositor, Expr::value(true));
        }
        let updated = update
            .filter(user::Column::Id.eq(commit.user_id.as_str()))
            .filter(user::Column::Deposit.eq(commit.expected_deposit.cents()))
            .filter(user::Column::IsReturningDepositor.eq(commit.expected_returning))
            .exec(&txn)
            .await;
        match updated {
            Ok(res) if res.rows_affected == 1 => {}
            Ok(_) => {
                rollback(txn).await;
                return Err(StoreError::Conflict);
            }
            Err(e) => {
                rollback(txn).await;
                return Err(backend(e));
            }
        }

        for credit in &commit.referral_credits {
            let (bonus_col, bonus_name, count_col, count_name) = match credit.level {
                ReferralLevel::Level1 => (
                    user::Column::ReferralBonusLevel1,
                    "referral_bonus_level1",
                    user::Column::Level1,
                    "level1",
                ),
                ReferralLevel::Level2 => (
                    user::Column::ReferralBonusLevel2,
                    "referral_bonus_level2",
                    user::Column::Level2,
                    "level2",
                ),
            };
            let credited = user::Entity::update_many()
                .col_expr(bonus_col, increment(bonus_name, credit.amount.cents()))
                .col_expr(count_col, increment(count_name, 1))
                .col_expr(user::Column::UpdatedAt, Expr::value(commit.applied_at))
                .filter(user::Column::Id.eq(credit.referrer_id.as_str()))
                .exec(&txn)
                .await;
            match credited {
                Ok(res) if res.rows_affected == 1 => {}
                // Referrer vanished since the snapshot; recompute.
                Ok(_) => {
                    rollback(txn).await;
                    return Err(StoreError::Conflict);
                }
                Err(e) => {
                    rollback(txn).await;
                    return Err(backend(e));
                }
            }
        }

        txn.commit().await.map_err(backend)
    }

    async fn append_error(&self, entry: &ErrorLogEntry) -> Result<(), StoreError> {
        let row = deposit_error::ActiveModel {
            id: Set(entry.id.clone()),
            kind: Set(entry.kind.clone()),
            transaction_id: Set(entry.transaction_id.clone()),
            message: Set(entry.message.clone()),
            payload: Set(entry.payload.clone()),
            created_at: Set(entry.created_at),
        };
        deposit_error::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn claim_referral_bonus(&self, user_id: &str, level: ReferralLevel) -> Result<BonusClaim, StoreError> {
        let Some(current) = self.user_by_id(user_id).await? else {
            return Ok(BonusClaim::UserNotFound);
        };

        let (bonus_col, amount) = match level {
            ReferralLevel::Level1 => (user::Column::ReferralBonusLevel1, current.referral_bonus_level1),
            ReferralLevel::Level2 => (user::Column::ReferralBonusLevel2, current.referral_bonus_level2),
        };
        if amount <= 0 {
            return Ok(BonusClaim::NothingToClaim);
        }

        // Only moves the amount that was read; a concurrent credit makes this a conflict.
        let res = user::Entity::update_many()
            .col_expr(bonus_col, Expr::value(0i64))
            .col_expr(user::Column::UserBalance, increment("user_balance", amount))
            .filter(user::Column::Id.eq(user_id))
            .filter(bonus_col.eq(amount))
            .exec(&self.db)
            .await
            .map_err(backend)?;
        if res.rows_affected != 1 {
            return Err(StoreError::Conflict);
        }

        let balance = self
            .user_by_id(user_id)
            .await?
            .map(|m| m.user_balance)
            .ok_or(StoreError::Conflict)?;
        Ok(BonusClaim::Claimed {
            amount: Money::from_cents(amount),
            balance: Money::from_cents(balance),
        })
    }

    async fn credit_postback(&self, credit: &PostbackCredit) -> Result<PostbackOutcome, StoreError> {
        if self.user_by_id(&credit.user_id).await?.is_none() {
            return Ok(PostbackOutcome::UserNotFound);
        }

        let txn = self.db.begin().await.map_err(backend)?;

        let row = postback_log::ActiveModel {
            transaction_id: Set(credit.transaction_id.clone()),
            user_id: Set(credit.user_id.clone()),
            offer: Set(credit.offer.clone()),
            payout: Set(credit.payout.cents()),
            credit: Set(credit.credit.cents()),
            created_at: Set(credit.created_at),
        };
        let inserted = postback_log::Entity::insert(row)
            .on_conflict(
                OnConflict::column(postback_log::Column::TransactionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await;
        match inserted {
            Ok(1) => {}
            Ok(_) => {
                rollback(txn).await;
                return Ok(PostbackOutcome::AlreadyProcessed);
            }
            Err(e) => {
                rollback(txn).await;
                return Err(backend(e));
            }
        }

        let credited = user::Entity::update_many()
            .col_expr(user::Column::TaskBonus, increment("task_bonus", credit.credit.cents()))
            .col_expr(user::Column::UpdatedAt, Expr::value(credit.created_at))
            .filter(user::Column::Id.eq(credit.user_id.as_str()))
            .exec(&txn)
            .await;
        match credited {
            Ok(res) if res.rows_affected == 1 => {}
            Ok(_) => {
                rollback(txn).await;
                return Ok(PostbackOutcome::UserNotFound);
            }
            Err(e) => {
                rollback(txn).await;
                return Err(backend(e));
            }
        }

        let task_bonus = user::Entity::find_by_id(credit.user_id.clone())
            .one(&txn)
            .await;
        let task_bonus = match task_bonus {
            Ok(Some(m)) => m.task_bonus,
            Ok(None) => {
                rollback(txn).await;
                return Err(StoreError::Conflict);
            }
            Err(e) => {
                rollback(txn).await;
                return Err(backend(e));
            }
        };

        txn.commit().await.map_err(backend)?;
        Ok(PostbackOutcome::Credited {
            task_bonus: Money::from_cents(task_bonus),
        })
    }

    async fn claim_task_bonus(&self, claim: &TaskBonusCommit) -> Result<Money, StoreError> {
        let txn = self.db.begin().await.map_err(backend)?;

        let moved = user::Entity::update_many()
            .col_expr(user::Column::TaskBonus, Expr::value(0i64))
            .col_expr(user::Column::UserBalance, increment("user_balance", claim.amount.cents()))
            .col_expr(user::Column::UpdatedAt, Expr::value(claim.claimed_at))
            .filter(user::Column::Id.eq(claim.user_id.as_str()))
            .filter(user::Column::TaskBonus.eq(claim.amount.cents()))
            .exec(&txn)
            .await;
        match moved {
            Ok(res) if res.rows_affected == 1 => {}
            Ok(_) => {
                rollback(txn).await;
                return Err(StoreError::Conflict);
            }
            Err(e) => {
                rollback(txn).await;
                return Err(backend(e));
            }
        }

        for credit in &claim.referral_credits {
            let (bonus_col, bonus_name) = match credit.level {
                ReferralLevel::Level1 => (user::Column::ReferralBonusLevel1, "referral_bonus_level1"),
                ReferralLevel::Level2 => (user::Column::ReferralBonusLevel2, "referral_bonus_level2"),
            };
            let credited = user::Entity::update_many()
                .col_expr(bonus_col, increment(bonus_name, credit.amount.cents()))
                .col_expr(user::Column::UpdatedAt, Expr::value(claim.claimed_at))
                .filter(user::Column::Id.eq(credit.referrer_id.as_str()))
                .exec(&txn)
                .await;
            match credited {
                Ok(res) if res.rows_affected == 1 => {}
                Ok(_) => {
                    rollback(txn).await;
                    return Err(StoreError::Conflict);
                }
                Err(e) => {
                    rollback(txn).await;
                    return Err(backend(e));
                }
            }
        }

        let balance = match user::Entity::find_by_id(claim.user_id.clone()).one(&txn).await {
            Ok(Some(m)) => m.user_balance,
            Ok(None) => {
                rollback(txn).await;
                return Err(StoreError::Conflict);
            }
            Err(e) => {
                rollback(txn).await;
                return Err(backend(e));
            }
        };

        txn.commit().await.map_err(backend)?;
        Ok(Money::from_cents(balance))
    }

    async fn claim_daily_profit(&self, claim: &ProfitCommit) -> Result<Money, StoreError> {
        let last_claim = match claim.expected_last_claim {
            Some(at) => user::Column::LastProfitClaim.eq(at),
            None => user::Column::LastProfitClaim.is_null(),
        };
        let res = user::Entity::update_many()
            .col_expr(user::Column::UserBalance, increment("user_balance", claim.amount.cents()))
            .col_expr(user::Column::LastProfitClaim, Expr::value(Some(claim.claimed_at)))
            .col_expr(user::Column::UpdatedAt, Expr::value(claim.claimed_at))
            .filter(user::Column::Id.eq(claim.user_id.as_str()))
            .filter(last_claim)
            .exec(&self.db)
            .await
            .map_err(backend)?;
        if res.rows_affected != 1 {
            return Err(StoreError::Conflict);
        }

        let balance = self
            .user_by_id(&claim.user_id)
            .await?
            .map(|m| m.user_balance)
            .ok_or(StoreError::Conflict)?;
        Ok(Money::from_cents(balance))
    }
}
