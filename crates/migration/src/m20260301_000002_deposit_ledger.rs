use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The primary key on transaction_id is what makes webhook claims atomic.
        manager
            .create_table(
                Table::create()
                    .table(DepositLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DepositLogs::TransactionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DepositLogs::Status).string().not_null())
                    .col(ColumnDef::new(DepositLogs::ClaimToken).string().not_null())
                    .col(ColumnDef::new(DepositLogs::ClaimedAt).big_integer().not_null())
                    .col(ColumnDef::new(DepositLogs::Attempts).integer().not_null().default(1))
                    .col(ColumnDef::new(DepositLogs::Payload).text())
                    .col(ColumnDef::new(DepositLogs::AppliedAt).big_integer())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DepositErrors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DepositErrors::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(DepositErrors::Kind).string().not_null())
                    .col(ColumnDef::new(DepositErrors::TransactionId).string())
                    .col(ColumnDef::new(DepositErrors::Message).text().not_null())
                    .col(ColumnDef::new(DepositErrors::Payload).text().not_null())
                    .col(ColumnDef::new(DepositErrors::CreatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deposit_errors_transaction_id")
                    .table(DepositErrors::Table)
                    .col(DepositErrors::TransactionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DepositErrors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DepositLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DepositLogs {
    Table,
    TransactionId,
    Status,
    ClaimToken,
    ClaimedAt,
    Attempts,
    Payload,
    AppliedAt,
}

#[derive(DeriveIden)]
enum DepositErrors {
    Table,
    Id,
    Kind,
    TransactionId,
    Message,
    Payload,
    CreatedAt,
}
