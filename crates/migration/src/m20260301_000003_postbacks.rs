use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PostbackLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PostbackLogs::TransactionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PostbackLogs::UserId).string().not_null())
                    .col(ColumnDef::new(PostbackLogs::Offer).string().not_null())
                    .col(ColumnDef::new(PostbackLogs::Payout).big_integer().not_null())
                    .col(ColumnDef::new(PostbackLogs::Credit).big_integer().not_null())
                    .col(ColumnDef::new(PostbackLogs::CreatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_postback_logs_user_id")
                            .from(PostbackLogs::Table, PostbackLogs::UserId)
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
                    .name("idx_postback_logs_user_id")
                    .table(PostbackLogs::Table)
                    .col(PostbackLogs::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PostbackLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PostbackLogs {
    Table,
    TransactionId,
    UserId,
    Offer,
    Payout,
    Credit,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
