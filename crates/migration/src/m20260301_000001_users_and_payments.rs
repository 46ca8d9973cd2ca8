use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Money columns are integer cents.
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Users::Email).string())
                    .col(ColumnDef::new(Users::ProviderUserId).string().unique_key())
                    .col(ColumnDef::new(Users::ReferralCode).string().not_null())
                    .col(ColumnDef::new(Users::ReferralBy).string())
                    .col(ColumnDef::new(Users::Level2ReferralBy).string())
                    .col(ColumnDef::new(Users::Deposit).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Users::DailyProfit).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Users::DepositTime).big_integer())
                    .col(
                        ColumnDef::new(Users::ReferralBonusLevel1)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Users::ReferralBonusLevel2)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Users::Level1).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Users::Level2).big_integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Users::IsReturningDepositor)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Users::LastDepositTx).string())
                    .col(ColumnDef::new(Users::UserBalance).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Users::TaskBonus).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Users::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Users::UpdatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // Referral codes are looked up on every first deposit; duplicates are tolerated.
        manager
            .create_index(
                Index::create()
                    .name("idx_users_referral_code")
                    .table(Users::Table)
                    .col(Users::ReferralCode)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payments::PaymentId).string().not_null().primary_key())
                    .col(ColumnDef::new(Payments::UserId).string().not_null())
                    .col(ColumnDef::new(Payments::Email).string())
                    .col(ColumnDef::new(Payments::CreatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_user_id")
                            .from(Payments::Table, Payments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payments_user_id")
                    .table(Payments::Table)
                    .col(Payments::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    ProviderUserId,
    ReferralCode,
    ReferralBy,
    Level2ReferralBy,
    Deposit,
    DailyProfit,
    DepositTime,
    ReferralBonusLevel1,
    ReferralBonusLevel2,
    Level1,
    Level2,
    IsReturningDepositor,
    LastDepositTx,
    UserBalance,
    TaskBonus,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Payments {
    Table,
    PaymentId,
    UserId,
    Email,
    CreatedAt,
}
