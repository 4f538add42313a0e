//! Create karma history table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KarmaHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KarmaHistory::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KarmaHistory::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(KarmaHistory::Points).integer().not_null())
                    .col(ColumnDef::new(KarmaHistory::Reason).string_len(128).not_null())
                    .col(ColumnDef::new(KarmaHistory::EventKey).string_len(96).not_null())
                    .col(
                        ColumnDef::new(KarmaHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_karma_history_user")
                            .from(KarmaHistory::Table, KarmaHistory::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: event_key - one award per logical event
        manager
            .create_index(
                Index::create()
                    .name("idx_karma_history_event_key")
                    .table(KarmaHistory::Table)
                    .col(KarmaHistory::EventKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_karma_history_user_id")
                    .table(KarmaHistory::Table)
                    .col(KarmaHistory::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KarmaHistory::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum KarmaHistory {
    Table,
    Id,
    UserId,
    Points,
    Reason,
    EventKey,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
