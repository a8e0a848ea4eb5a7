use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Executions::Table)
                    .col(
                        ColumnDef::new(Executions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Executions::ApiId).big_integer())
                    .col(ColumnDef::new(Executions::UserId).big_integer())
                    .col(ColumnDef::new(Executions::StatusCode).integer().not_null())
                    .col(ColumnDef::new(Executions::ExitCode).big_integer())
                    .col(ColumnDef::new(Executions::DurationMs).big_integer().not_null())
                    .col(ColumnDef::new(Executions::RequestSize).big_integer().not_null())
                    .col(ColumnDef::new(Executions::ResponseSize).big_integer().not_null())
                    .col(ColumnDef::new(Executions::Error).text())
                    .col(
                        ColumnDef::new(Executions::CreatedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Executions::Table, Executions::ApiId)
                            .to(crate::ApiResources::Table, crate::ApiResources::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Executions::Table, Executions::UserId)
                            .to(crate::Users::Table, crate::Users::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("executions_api_id_created_at_idx")
                    .table(Executions::Table)
                    .col(Executions::ApiId)
                    .col(Executions::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Executions::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
enum Executions {
    Table,
    Id,
    ApiId,
    UserId,
    StatusCode,
    ExitCode,
    DurationMs,
    RequestSize,
    ResponseSize,
    Error,
    CreatedAt,
}
