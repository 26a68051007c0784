use sea_orm_migration::prelude::*;

use crate::m20260301_090100_create_cluster_table::Cluster;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Environment::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Environment::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Environment::EnvironmentName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Environment::ClusterId).integer().not_null())
                    .col(ColumnDef::new(Environment::Active).boolean().not_null())
                    .col(ColumnDef::new(Environment::IsDefault).boolean().not_null())
                    .col(ColumnDef::new(Environment::Namespace).string().not_null())
                    .col(
                        ColumnDef::new(Environment::EnvironmentIdentifier)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Environment::Description).text().not_null())
                    .col(
                        ColumnDef::new(Environment::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Environment::CreatedBy).integer().not_null())
                    .col(
                        ColumnDef::new(Environment::UpdatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Environment::UpdatedBy).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from_tbl(Environment::Table)
                            .from_col(Environment::ClusterId)
                            .to_tbl(Cluster::Table)
                            .to_col(Cluster::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("environment_cluster_id_namespace_idx")
                    .table(Environment::Table)
                    .col(Environment::ClusterId)
                    .col(Environment::Namespace)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Environment {
    Table,
    Id,
    EnvironmentName,
    ClusterId,
    Active,
    IsDefault,
    Namespace,
    EnvironmentIdentifier,
    Description,
    CreatedOn,
    CreatedBy,
    UpdatedOn,
    UpdatedBy,
}
