use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChartRepo::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChartRepo::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChartRepo::CreatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChartRepo::CreatedBy).integer().not_null())
                    .col(
                        ColumnDef::new(ChartRepo::UpdatedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChartRepo::UpdatedBy).integer().not_null())
                    .col(ColumnDef::new(ChartRepo::DeletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ChartRepo::Name).string().not_null())
                    .col(ColumnDef::new(ChartRepo::Url).string().not_null())
                    .col(ColumnDef::new(ChartRepo::AuthMode).string().not_null())
                    .col(ColumnDef::new(ChartRepo::UserName).string().not_null())
                    .col(ColumnDef::new(ChartRepo::Password).text().not_null())
                    .col(ColumnDef::new(ChartRepo::SshKey).text().not_null())
                    .col(ColumnDef::new(ChartRepo::AccessToken).text().not_null())
                    .col(ColumnDef::new(ChartRepo::IsDefault).boolean().not_null())
                    .col(ColumnDef::new(ChartRepo::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(ChartRepo::AllowInsecureConnection)
                            .boolean()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
pub enum ChartRepo {
    Table,
    Id,
    CreatedOn,
    CreatedBy,
    UpdatedOn,
    UpdatedBy,
    DeletedAt,
    Name,
    Url,
    AuthMode,
    UserName,
    Password,
    SshKey,
    AccessToken,
    IsDefault,
    Active,
    AllowInsecureConnection,
}
