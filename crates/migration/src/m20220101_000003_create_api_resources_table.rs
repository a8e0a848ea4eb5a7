use db::api_resource::{Status, Visibility};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiResources::Table)
                    .col(
                        ColumnDef::new(ApiResources::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ApiResources::OwnerId).big_integer().not_null())
                    .col(ColumnDef::new(ApiResources::Name).string().not_null())
                    .col(
                        ColumnDef::new(ApiResources::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ApiResources::Version)
                            .string_len(32)
                            .not_null()
                            .default("v1"),
                    )
                    .col(ColumnDef::new(ApiResources::Runtime).small_integer().not_null())
                    .col(
                        ColumnDef::new(ApiResources::Visibility)
                            .small_integer()
                            .not_null()
                            .default(Visibility::Private),
                    )
                    .col(
                        ColumnDef::new(ApiResources::Status)
                            .small_integer()
                            .not_null()
                            .default(Status::Pending),
                    )
                    .col(ColumnDef::new(ApiResources::Endpoint).string())
                    .col(
                        ColumnDef::new(ApiResources::CreatedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(
                        ColumnDef::new(ApiResources::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ApiResources::Table, ApiResources::OwnerId)
                            .to(crate::Users::Table, crate::Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("api_resources_owner_id_idx")
                    .table(ApiResources::Table)
                    .col(ApiResources::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("api_resources_listing_idx")
                    .table(ApiResources::Table)
                    .col(ApiResources::Status)
                    .col(ApiResources::Visibility)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApiResources::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
pub(crate) enum ApiResources {
    Table,
    Id,
    OwnerId,
    Name,
    Description,
    Version,
    Runtime,
    Visibility,
    Status,
    Endpoint,
    CreatedAt,
    UpdatedAt,
}
