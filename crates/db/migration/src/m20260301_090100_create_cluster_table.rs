use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Cluster::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Cluster::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Cluster::ClusterName).string().not_null())
                    .col(ColumnDef::new(Cluster::ServerUrl).string().not_null())
                    .col(ColumnDef::new(Cluster::PrometheusUrl).string())
                    .col(ColumnDef::new(Cluster::Active).boolean().not_null())
                    .col(ColumnDef::new(Cluster::Config).text().not_null())
                    .col(ColumnDef::new(Cluster::PrometheusAuth).text())
                    .col(ColumnDef::new(Cluster::RemoteConnection).text())
                    .col(ColumnDef::new(Cluster::K8sVersion).string().not_null())
                    .col(
                        ColumnDef::new(Cluster::InsecureSkipTlsVerify)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Cluster::ErrorInConnecting)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Cluster::IsVirtualCluster)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Cluster::Description).text())
                    .col(
                        ColumnDef::new(Cluster::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Cluster::CreatedBy).integer().not_null())
                    .col(
                        ColumnDef::new(Cluster::UpdatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Cluster::UpdatedBy).integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("cluster_name_active_idx")
                    .table(Cluster::Table)
                    .col(Cluster::ClusterName)
                    .col(Cluster::Active)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
pub enum Cluster {
    Table,
    Id,
    ClusterName,
    ServerUrl,
    PrometheusUrl,
    Active,
    Config,
    PrometheusAuth,
    RemoteConnection,
    K8sVersion,
    InsecureSkipTlsVerify,
    ErrorInConnecting,
    IsVirtualCluster,
    Description,
    CreatedOn,
    CreatedBy,
    UpdatedOn,
    UpdatedBy,
}
