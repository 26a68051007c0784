use sea_orm_migration::prelude::*;

mod m20260301_090000_create_config_table;
mod m20260301_090100_create_cluster_table;
mod m20260301_090200_create_environment_table;
mod m20260301_090300_create_chart_repo_table;
mod m20260301_090400_create_helm_release_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_090000_create_config_table::Migration),
            Box::new(m20260301_090100_create_cluster_table::Migration),
            Box::new(m20260301_090200_create_environment_table::Migration),
            Box::new(m20260301_090300_create_chart_repo_table::Migration),
            Box::new(m20260301_090400_create_helm_release_table::Migration),
        ]
    }
}
