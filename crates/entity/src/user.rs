use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Vestinoo user row. Users are registered elsewhere; the ledger only reads and
/// increments the columns below.
///
/// Monetary columns hold integer cents.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub email: Option<String>,

    /// User id known to the payment provider (XaiGate).
    #[sea_orm(unique)]
    pub provider_user_id: Option<String>,

    pub referral_code: String,
    pub referral_by: Option<String>,
    pub level2_referral_by: Option<String>,

    pub deposit: i64,
    pub daily_profit: i64,

    /// Unix timestamp (seconds) when the current plan became active.
    pub deposit_time: Option<i64>,

    /// Unix timestamp (seconds) after which the current plan pays no more daily profit.
    pub plan_expires_at: Option<i64>,

    /// Unix timestamp (seconds) of the last daily profit claim.
    pub last_profit_claim: Option<i64>,

    pub referral_bonus_level1: i64,
    pub referral_bonus_level2: i64,
    pub level1: i64,
    pub level2: i64,

    pub is_returning_depositor: bool,
    pub last_deposit_tx: Option<String>,

    pub user_balance: i64,
    pub task_bonus: i64,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
