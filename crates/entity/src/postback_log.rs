use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Credited offer-wall postbacks, keyed by the offer wall's transaction id.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "postback_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub transaction_id: String,

    pub user_id: String,
    pub offer: String,

    /// Cents.
    pub payout: i64,
    pub credit: i64,

    /// Unix timestamp (seconds).
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
