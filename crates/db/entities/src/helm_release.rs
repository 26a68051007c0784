use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "helm_release")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_on: DateTimeWithTimeZone,
    pub updated_on: DateTimeWithTimeZone,
    pub cluster_id: i32,
    pub namespace: String,
    pub release_name: String,
    pub chart_repo_id: Option<i32>,
    pub chart_name: String,
    pub chart_version: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chart_repo::Entity",
        from = "Column::ChartRepoId",
        to = "super::chart_repo::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    ChartRepo,
}

impl Related<super::chart_repo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChartRepo.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
