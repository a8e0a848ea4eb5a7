pub use sea_orm_migration::prelude::*;

mod m20220101_000001_create_users_table;
mod m20220101_000002_create_authentication_tokens_table;
mod m20220101_000003_create_api_resources_table;
mod m20220101_000004_create_code_artifacts_table;
mod m20220101_000005_create_api_keys_table;
mod m20220101_000006_create_executions_table;

pub(crate) use m20220101_000001_create_users_table::Users;
pub(crate) use m20220101_000003_create_api_resources_table::ApiResources;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20220101_000001_create_users_table::Migration),
            Box::new(m20220101_000002_create_authentication_tokens_table::Migration),
            Box::new(m20220101_000003_create_api_resources_table::Migration),
            Box::new(m20220101_000004_create_code_artifacts_table::Migration),
            Box::new(m20220101_000005_create_api_keys_table::Migration),
            Box::new(m20220101_000006_create_executions_table::Migration),
        ]
    }
}
