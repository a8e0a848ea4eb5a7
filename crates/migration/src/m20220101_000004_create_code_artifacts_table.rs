use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CodeArtifacts::Table)
                    .col(
                        ColumnDef::new(CodeArtifacts::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CodeArtifacts::ApiId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(CodeArtifacts::Filename).string().not_null())
                    .col(
                        ColumnDef::new(CodeArtifacts::SizeBytes)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CodeArtifacts::LanguageHint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CodeArtifacts::ContentHash)
                            .binary_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CodeArtifacts::ContentKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CodeArtifacts::UploadedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(CodeArtifacts::Table, CodeArtifacts::ApiId)
                            .to(crate::ApiResources::Table, crate::ApiResources::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CodeArtifacts::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
enum CodeArtifacts {
    Table,
    Id,
    ApiId,
    Filename,
    SizeBytes,
    LanguageHint,
    ContentHash,
    ContentKey,
    UploadedAt,
}
