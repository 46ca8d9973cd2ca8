use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per provider transaction id; the primary key is the idempotency guard.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "deposit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub transaction_id: String,

    /// `processing`, `applied` or `failed`.
    pub status: String,

    pub claim_token: String,

    /// Unix timestamp (seconds) of the current claim.
    pub claimed_at: i64,

    pub attempts: i32,

    /// Raw webhook body, set once applied.
    pub payload: Option<String>,

    /// Unix timestamp (seconds).
    pub applied_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
