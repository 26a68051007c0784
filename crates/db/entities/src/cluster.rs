use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "cluster")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub cluster_name: String,
    pub server_url: String,
    pub prometheus_url: Option<String>,
    pub active: bool,
    /// JSON object of credential key to value.
    pub config: String,
    pub prometheus_auth: Option<String>,
    pub remote_connection: Option<String>,
    pub k8s_version: String,
    pub insecure_skip_tls_verify: bool,
    pub error_in_connecting: String,
    pub is_virtual_cluster: bool,
    pub description: Option<String>,
    pub created_on: DateTimeWithTimeZone,
    pub created_by: i32,
    pub updated_on: DateTimeWithTimeZone,
    pub updated_by: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::environment::Entity")]
    Environment,
}

impl Related<super::environment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Environment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
