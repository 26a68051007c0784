use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "chart_repo")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_on: DateTimeWithTimeZone,
    pub created_by: i32,
    pub updated_on: DateTimeWithTimeZone,
    pub updated_by: i32,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub name: String,
    pub url: String,
    pub auth_mode: String,
    pub user_name: String,
    pub password: String,
    pub ssh_key: String,
    pub access_token: String,
    pub is_default: bool,
    pub active: bool,
    pub allow_insecure_connection: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::helm_release::Entity")]
    HelmRelease,
}

impl Related<super::helm_release::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HelmRelease.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
