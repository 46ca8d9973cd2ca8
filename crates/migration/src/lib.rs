pub use sea_orm_migration::prelude::*;

mod m20260301_000001_users_and_payments;
mod m20260301_000002_deposit_ledger;
mod m20260301_000003_postbacks;
mod m20260310_000004_profit_claims;

pub struct Migrator;

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_users_and_payments::Migration),
            Box::new(m20260301_000002_deposit_ledger::Migration),
            Box::new(m20260301_000003_postbacks::Migration),
            Box::new(m20260310_000004_profit_claims::Migration),
        ]
    }
}
