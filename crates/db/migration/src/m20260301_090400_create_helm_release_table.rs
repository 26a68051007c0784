use sea_orm_migration::prelude::*;

use crate::m20260301_090300_create_chart_repo_table::ChartRepo;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HelmRelease::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HelmRelease::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(HelmRelease::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(HelmRelease::UpdatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(HelmRelease::ClusterId).integer().not_null())
                    .col(ColumnDef::new(HelmRelease::Namespace).string().not_null())
                    .col(ColumnDef::new(HelmRelease::ReleaseName).string().not_null())
                    .col(ColumnDef::new(HelmRelease::ChartRepoId).integer())
                    .col(ColumnDef::new(HelmRelease::ChartName).string().not_null())
                    .col(ColumnDef::new(HelmRelease::ChartVersion).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from_tbl(HelmRelease::Table)
                            .from_col(HelmRelease::ChartRepoId)
                            .to_tbl(ChartRepo::Table)
                            .to_col(ChartRepo::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("helm_release_cluster_namespace_release_idx")
                    .table(HelmRelease::Table)
                    .col(HelmRelease::ClusterId)
                    .col(HelmRelease::Namespace)
                    .col(HelmRelease::ReleaseName)
                    .unique()
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum HelmRelease {
    Table,
    Id,
    CreatedOn,
    UpdatedOn,
    ClusterId,
    Namespace,
    ReleaseName,
    ChartRepoId,
    ChartName,
    ChartVersion,
}
