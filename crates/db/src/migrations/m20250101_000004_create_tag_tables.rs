//! Create tag and question_tag tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tag::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tag::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tag::Name).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Tag::QuestionCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Tag::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tag_name")
                    .table(Tag::Table)
                    .col(Tag::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(QuestionTag::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuestionTag::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(QuestionTag::QuestionId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(QuestionTag::TagName).string_len(32).not_null())
                    .col(ColumnDef::new(QuestionTag::Position).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_question_tag_question")
                            .from(QuestionTag::Table, QuestionTag::QuestionId)
                            .to(Question::Table, Question::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (question_id, tag_name) - a tag appears once per question
        manager
            .create_index(
                Index::create()
                    .name("idx_question_tag_question_tag")
                    .table(QuestionTag::Table)
                    .col(QuestionTag::QuestionId)
                    .col(QuestionTag::TagName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_question_tag_tag_name")
                    .table(QuestionTag::Table)
                    .col(QuestionTag::TagName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QuestionTag::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tag::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Tag {
    Table,
    Id,
    Name,
    QuestionCount,
    CreatedAt,
}

#[derive(Iden)]
enum QuestionTag {
    Table,
    Id,
    QuestionId,
    TagName,
    Position,
}

#[derive(Iden)]
enum Question {
    Table,
    Id,
}
