use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::Utc;
use devplane_common::{
    chart_repo::ChartRepoDto, cluster::ClusterBean, environment::EnvironmentBean,
    HOST_URL_CONFIG_KEY,
};
use devplane_db_entities::{chart_repo, cluster, config, environment, helm_release};
use devplane_db_migration::Migrator;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue, ColumnTrait, Condition,
    DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use sqlx::PgPool;

#[derive(Clone)]
pub struct DbApi {
    pub conn: DatabaseConnection,
    pub pool: Option<PgPool>,
}

async fn connect_db(conn_url: &str) -> Result<sqlx::PgPool> {
    let pool: sqlx::PgPool = sqlx::pool::PoolOptions::new()
        .max_connections(100)
        .connect(conn_url)
        .await?;
    Ok(pool)
}

fn to_json_column<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(anyhow::Error::from))
        .transpose()
}

impl DbApi {
    pub async fn new(conn_url: &str, no_migration: bool) -> Result<Self> {
        let pool = connect_db(conn_url).await?;
        let conn = sea_orm::SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());
        let db = DbApi {
            conn,
            pool: Some(pool),
        };
        if !no_migration {
            db.migrate().await?;
        }
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<()> {
        Migrator::up(&self.conn, None).await?;
        Ok(())
    }

    pub async fn update_config(&self, name: &str, value: &str) -> Result<config::Model> {
        let model = config::Entity::insert(config::ActiveModel {
            name: ActiveValue::set(name.to_string()),
            value: ActiveValue::set(value.to_string()),
        })
        .on_conflict(
            OnConflict::column(config::Column::Name)
                .update_column(config::Column::Value)
                .to_owned(),
        )
        .exec_with_returning(&self.conn)
        .await?;
        Ok(model)
    }

    pub async fn get_config(&self, name: &str) -> Result<String> {
        let model = config::Entity::find()
            .filter(config::Column::Name.eq(name))
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow!("no config found"))?;
        Ok(model.value)
    }

    /// The externally reachable url of the platform, if one was configured.
    pub async fn get_host_url(&self) -> Result<Option<String>> {
        let model = config::Entity::find()
            .filter(config::Column::Name.eq(HOST_URL_CONFIG_KEY))
            .one(&self.conn)
            .await?;
        Ok(model.map(|m| m.value).filter(|v| !v.is_empty()))
    }

    // Clusters

    pub async fn get_all_active_clusters(&self) -> Result<Vec<cluster::Model>> {
        let models = cluster::Entity::find()
            .filter(cluster::Column::Active.eq(true))
            .order_by_asc(cluster::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(models)
    }

    pub async fn get_all_active_clusters_except_virtual(&self) -> Result<Vec<cluster::Model>> {
        let models = cluster::Entity::find()
            .filter(cluster::Column::Active.eq(true))
            .filter(cluster::Column::IsVirtualCluster.eq(false))
            .order_by_asc(cluster::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(models)
    }

    pub async fn get_cluster(&self, id: i32) -> Result<Option<cluster::Model>> {
        let model = cluster::Entity::find_by_id(id)
            .filter(cluster::Column::Active.eq(true))
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn get_clusters_by_ids(&self, ids: &[i32]) -> Result<Vec<cluster::Model>> {
        let models = cluster::Entity::find()
            .filter(cluster::Column::Id.is_in(ids.iter().copied()))
            .filter(cluster::Column::Active.eq(true))
            .order_by_asc(cluster::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(models)
    }

    pub async fn get_cluster_by_name(&self, name: &str) -> Result<Option<cluster::Model>> {
        let model = cluster::Entity::find()
            .filter(cluster::Column::ClusterName.eq(name))
            .filter(cluster::Column::Active.eq(true))
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn get_cluster_by_server_url(&self, url: &str) -> Result<Option<cluster::Model>> {
        let model = cluster::Entity::find()
            .filter(cluster::Column::ServerUrl.eq(url))
            .filter(cluster::Column::Active.eq(true))
            .order_by_asc(cluster::Column::Id)
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn create_cluster(&self, bean: &ClusterBean, user_id: i32) -> Result<cluster::Model> {
        let now = Utc::now();
        let model = cluster::ActiveModel {
            cluster_name: ActiveValue::Set(bean.cluster_name.clone()),
            server_url: ActiveValue::Set(bean.server_url.clone()),
            prometheus_url: ActiveValue::Set(bean.prometheus_url.clone()),
            active: ActiveValue::Set(true),
            config: ActiveValue::Set(serde_json::to_string(&bean.config)?),
            prometheus_auth: ActiveValue::Set(to_json_column(&bean.prometheus_auth)?),
            remote_connection: ActiveValue::Set(to_json_column(&bean.remote_connection)?),
            k8s_version: ActiveValue::Set(bean.k8s_version.clone()),
            insecure_skip_tls_verify: ActiveValue::Set(bean.insecure_skip_tls_verify),
            error_in_connecting: ActiveValue::Set(bean.error_in_connecting.clone()),
            is_virtual_cluster: ActiveValue::Set(bean.is_virtual_cluster),
            description: ActiveValue::Set(bean.description.clone()),
            created_on: ActiveValue::Set(now.into()),
            created_by: ActiveValue::Set(user_id),
            updated_on: ActiveValue::Set(now.into()),
            updated_by: ActiveValue::Set(user_id),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;
        Ok(model)
    }

    /// Writes every mutable field of `bean` onto the stored row.
    pub async fn update_cluster(&self, bean: &ClusterBean, user_id: i32) -> Result<cluster::Model> {
        let model = cluster::ActiveModel {
            id: ActiveValue::Unchanged(bean.id),
            cluster_name: ActiveValue::Set(bean.cluster_name.clone()),
            server_url: ActiveValue::Set(bean.server_url.clone()),
            prometheus_url: ActiveValue::Set(bean.prometheus_url.clone()),
            config: ActiveValue::Set(serde_json::to_string(&bean.config)?),
            prometheus_auth: ActiveValue::Set(to_json_column(&bean.prometheus_auth)?),
            remote_connection: ActiveValue::Set(to_json_column(&bean.remote_connection)?),
            k8s_version: ActiveValue::Set(bean.k8s_version.clone()),
            insecure_skip_tls_verify: ActiveValue::Set(bean.insecure_skip_tls_verify),
            error_in_connecting: ActiveValue::Set(bean.error_in_connecting.clone()),
            is_virtual_cluster: ActiveValue::Set(bean.is_virtual_cluster),
            updated_on: ActiveValue::Set(Utc::now().into()),
            updated_by: ActiveValue::Set(user_id),
            ..Default::default()
        }
        .update(&self.conn)
        .await?;
        Ok(model)
    }

    pub async fn update_cluster_connection_error(&self, id: i32, error: &str) -> Result<()> {
        cluster::ActiveModel {
            id: ActiveValue::Unchanged(id),
            error_in_connecting: ActiveValue::Set(error.to_string()),
            updated_on: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        }
        .update(&self.conn)
        .await?;
        Ok(())
    }

    pub async fn set_cluster_description(
        &self,
        id: i32,
        description: &str,
        user_id: i32,
    ) -> Result<cluster::Model> {
        let model = cluster::ActiveModel {
            id: ActiveValue::Unchanged(id),
            description: ActiveValue::Set(Some(description.to_string())),
            updated_on: ActiveValue::Set(Utc::now().into()),
            updated_by: ActiveValue::Set(user_id),
            ..Default::default()
        }
        .update(&self.conn)
        .await?;
        Ok(model)
    }

    pub async fn delete_cluster(&self, id: i32, user_id: i32) -> Result<()> {
        cluster::ActiveModel {
            id: ActiveValue::Unchanged(id),
            active: ActiveValue::Set(false),
            updated_on: ActiveValue::Set(Utc::now().into()),
            updated_by: ActiveValue::Set(user_id),
            ..Default::default()
        }
        .update(&self.conn)
        .await?;
        Ok(())
    }

    // Environments

    pub async fn cluster_has_active_environments(&self, cluster_id: i32) -> Result<bool> {
        let count = environment::Entity::find()
            .filter(environment::Column::ClusterId.eq(cluster_id))
            .filter(environment::Column::Active.eq(true))
            .count(&self.conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn get_environment(&self, id: i32) -> Result<Option<environment::Model>> {
        let model = environment::Entity::find_by_id(id)
            .filter(environment::Column::Active.eq(true))
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn get_environment_by_name(&self, name: &str) -> Result<Option<environment::Model>> {
        let model = environment::Entity::find()
            .filter(environment::Column::EnvironmentName.eq(name))
            .filter(environment::Column::Active.eq(true))
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    /// Any active environment whose name equals `name` or whose identifier
    /// equals `identifier`.
    pub async fn get_environment_by_name_or_identifier(
        &self,
        name: &str,
        identifier: &str,
    ) -> Result<Option<environment::Model>> {
        let model = environment::Entity::find()
            .filter(
                Condition::any()
                    .add(environment::Column::EnvironmentName.eq(name))
                    .add(environment::Column::EnvironmentIdentifier.eq(identifier)),
            )
            .filter(environment::Column::Active.eq(true))
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn get_environment_by_cluster_namespace(
        &self,
        cluster_id: i32,
        namespace: &str,
    ) -> Result<Option<environment::Model>> {
        let model = environment::Entity::find()
            .filter(environment::Column::ClusterId.eq(cluster_id))
            .filter(environment::Column::Namespace.eq(namespace))
            .filter(environment::Column::Active.eq(true))
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn get_all_environments(&self) -> Result<Vec<environment::Model>> {
        let models = environment::Entity::find()
            .order_by_asc(environment::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(models)
    }

    pub async fn get_active_environments(&self) -> Result<Vec<environment::Model>> {
        let models = environment::Entity::find()
            .filter(environment::Column::Active.eq(true))
            .order_by_asc(environment::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(models)
    }

    pub async fn get_environments_by_cluster(
        &self,
        cluster_id: i32,
    ) -> Result<Vec<environment::Model>> {
        let models = environment::Entity::find()
            .filter(environment::Column::ClusterId.eq(cluster_id))
            .filter(environment::Column::Active.eq(true))
            .order_by_asc(environment::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(models)
    }

    pub async fn create_environment(
        &self,
        bean: &EnvironmentBean,
        user_id: i32,
    ) -> Result<environment::Model> {
        let now = Utc::now();
        let model = environment::ActiveModel {
            environment_name: ActiveValue::Set(bean.environment_name.clone()),
            cluster_id: ActiveValue::Set(bean.cluster_id),
            active: ActiveValue::Set(true),
            is_default: ActiveValue::Set(bean.default),
            namespace: ActiveValue::Set(bean.namespace.clone()),
            environment_identifier: ActiveValue::Set(bean.environment_identifier.clone()),
            description: ActiveValue::Set(bean.description.clone()),
            created_on: ActiveValue::Set(now.into()),
            created_by: ActiveValue::Set(user_id),
            updated_on: ActiveValue::Set(now.into()),
            updated_by: ActiveValue::Set(user_id),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;
        Ok(model)
    }

    pub async fn update_environment(
        &self,
        bean: &EnvironmentBean,
        user_id: i32,
    ) -> Result<environment::Model> {
        let model = environment::ActiveModel {
            id: ActiveValue::Unchanged(bean.id),
            environment_name: ActiveValue::Set(bean.environment_name.clone()),
            cluster_id: ActiveValue::Set(bean.cluster_id),
            is_default: ActiveValue::Set(bean.default),
            namespace: ActiveValue::Set(bean.namespace.clone()),
            environment_identifier: ActiveValue::Set(bean.environment_identifier.clone()),
            description: ActiveValue::Set(bean.description.clone()),
            updated_on: ActiveValue::Set(Utc::now().into()),
            updated_by: ActiveValue::Set(user_id),
            ..Default::default()
        }
        .update(&self.conn)
        .await?;
        Ok(model)
    }

    pub async fn delete_environment(&self, id: i32, user_id: i32) -> Result<()> {
        let txn = self.conn.begin().await?;
        let env = environment::Entity::find_by_id(id)
            .filter(environment::Column::Active.eq(true))
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow!("environment not found"))?;
        environment::ActiveModel {
            id: ActiveValue::Unchanged(env.id),
            active: ActiveValue::Set(false),
            updated_on: ActiveValue::Set(Utc::now().into()),
            updated_by: ActiveValue::Set(user_id),
            ..Default::default()
        }
        .update(&txn)
        .await?;
        txn.commit().await?;
        Ok(())
    }

    // Chart repos

    pub async fn get_all_chart_repos(&self) -> Result<Vec<chart_repo::Model>> {
        let models = chart_repo::Entity::find()
            .filter(chart_repo::Column::DeletedAt.is_null())
            .order_by_asc(chart_repo::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(models)
    }

    pub async fn get_chart_repo(&self, id: i32) -> Result<Option<chart_repo::Model>> {
        let model = chart_repo::Entity::find_by_id(id)
            .filter(chart_repo::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn get_chart_repo_by_name(&self, name: &str) -> Result<Option<chart_repo::Model>> {
        let model = chart_repo::Entity::find()
            .filter(chart_repo::Column::Name.eq(name))
            .filter(chart_repo::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(model)
    }

    pub async fn create_chart_repo(
        &self,
        txn: &DatabaseTransaction,
        dto: &ChartRepoDto,
        user_id: i32,
    ) -> Result<chart_repo::Model> {
        let now = Utc::now();
        let model = chart_repo::ActiveModel {
            created_on: ActiveValue::Set(now.into()),
            created_by: ActiveValue::Set(user_id),
            updated_on: ActiveValue::Set(now.into()),
            updated_by: ActiveValue::Set(user_id),
            deleted_at: ActiveValue::Set(None),
            name: ActiveValue::Set(dto.name.clone()),
            url: ActiveValue::Set(dto.url.clone()),
            auth_mode: ActiveValue::Set(dto.auth_mode.to_string()),
            user_name: ActiveValue::Set(dto.user_name.clone()),
            password: ActiveValue::Set(dto.password.clone()),
            ssh_key: ActiveValue::Set(dto.ssh_key.clone()),
            access_token: ActiveValue::Set(dto.access_token.clone()),
            is_default: ActiveValue::Set(dto.default),
            active: ActiveValue::Set(true),
            allow_insecure_connection: ActiveValue::Set(dto.allow_insecure_connection),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(model)
    }

    pub async fn update_chart_repo(
        &self,
        txn: &DatabaseTransaction,
        dto: &ChartRepoDto,
        user_id: i32,
    ) -> Result<chart_repo::Model> {
        let model = chart_repo::ActiveModel {
            id: ActiveValue::Unchanged(dto.id),
            updated_on: ActiveValue::Set(Utc::now().into()),
            updated_by: ActiveValue::Set(user_id),
            name: ActiveValue::Set(dto.name.clone()),
            url: ActiveValue::Set(dto.url.clone()),
            auth_mode: ActiveValue::Set(dto.auth_mode.to_string()),
            user_name: ActiveValue::Set(dto.user_name.clone()),
            password: ActiveValue::Set(dto.password.clone()),
            ssh_key: ActiveValue::Set(dto.ssh_key.clone()),
            access_token: ActiveValue::Set(dto.access_token.clone()),
            is_default: ActiveValue::Set(dto.default),
            active: ActiveValue::Set(dto.active),
            allow_insecure_connection: ActiveValue::Set(dto.allow_insecure_connection),
            ..Default::default()
        }
        .update(txn)
        .await?;
        Ok(model)
    }

    pub async fn delete_chart_repo(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
        user_id: i32,
    ) -> Result<()> {
        let now = Utc::now();
        chart_repo::ActiveModel {
            id: ActiveValue::Unchanged(id),
            updated_on: ActiveValue::Set(now.into()),
            updated_by: ActiveValue::Set(user_id),
            active: ActiveValue::Set(false),
            deleted_at: ActiveValue::Set(Some(now.into())),
            ..Default::default()
        }
        .update(txn)
        .await?;
        Ok(())
    }

    // Helm releases

    pub async fn count_chart_repo_deployments(&self, chart_repo_id: i32) -> Result<u64> {
        let count = helm_release::Entity::find()
            .filter(helm_release::Column::ChartRepoId.eq(chart_repo_id))
            .count(&self.conn)
            .await?;
        Ok(count)
    }

    /// Deployment counts for every chart repo that has at least one release.
    pub async fn chart_repo_deployment_counts(&self) -> Result<HashMap<i32, u64>> {
        let releases = helm_release::Entity::find().all(&self.conn).await?;
        let mut counts = HashMap::new();
        for release in releases {
            if let Some(repo_id) = release.chart_repo_id {
                *counts.entry(repo_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    pub async fn namespace_has_helm_releases(&self, cluster_id: i32, namespace: &str) -> Result<bool> {
        let count = helm_release::Entity::find()
            .filter(helm_release::Column::ClusterId.eq(cluster_id))
            .filter(helm_release::Column::Namespace.eq(namespace))
            .count(&self.conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn upsert_helm_release(
        &self,
        cluster_id: i32,
        namespace: &str,
        release_name: &str,
        chart_repo_id: Option<i32>,
        chart_name: &str,
        chart_version: &str,
    ) -> Result<helm_release::Model> {
        let now = Utc::now();
        let model = helm_release::Entity::insert(helm_release::ActiveModel {
            created_on: ActiveValue::Set(now.into()),
            updated_on: ActiveValue::Set(now.into()),
            cluster_id: ActiveValue::Set(cluster_id),
            namespace: ActiveValue::Set(namespace.to_string()),
            release_name: ActiveValue::Set(release_name.to_string()),
            chart_repo_id: ActiveValue::Set(chart_repo_id),
            chart_name: ActiveValue::Set(chart_name.to_string()),
            chart_version: ActiveValue::Set(chart_version.to_string()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                helm_release::Column::ClusterId,
                helm_release::Column::Namespace,
                helm_release::Column::ReleaseName,
            ])
            .update_columns([
                helm_release::Column::UpdatedOn,
                helm_release::Column::ChartRepoId,
                helm_release::Column::ChartName,
                helm_release::Column::ChartVersion,
            ])
            .to_owned(),
        )
        .exec_with_returning(&self.conn)
        .await?;
        Ok(model)
    }
}
