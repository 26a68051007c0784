use std::collections::HashMap;

use devplane_common::{
    cluster::ClusterBean,
    environment::{environment_identifier, EnvironmentBean},
};
use devplane_db::environment_bean;
use devplane_db_entities::environment;
use devplane_rpc::error::ApiError;
use tracing::{info, warn};

use super::Controller;

pub const ENVIRONMENT_DUPLICATE_MSG: &str = "environment already exists";
const NAMESPACE_REQUIRED_MSG: &str = "namespace cannot be empty";
const OLD_ENVS_WITHOUT_NAMESPACE_MSG: &str =
    "cannot create env as existing old envs have no namespace";
const ENVIRONMENT_IN_USE_MSG: &str =
    "environment can't be deleted while helm releases are installed in its namespace";

impl Controller {
    async fn cluster_names(&self) -> Result<HashMap<i32, String>, ApiError> {
        Ok(self
            .db
            .get_all_active_clusters()
            .await?
            .into_iter()
            .map(|c| (c.id, c.cluster_name))
            .collect())
    }

    async fn environment_beans(
        &self,
        models: Vec<environment::Model>,
    ) -> Result<Vec<EnvironmentBean>, ApiError> {
        let names = self.cluster_names().await?;
        Ok(models
            .iter()
            .map(|m| {
                let cluster_name = names.get(&m.cluster_id).map(String::as_str).unwrap_or("");
                environment_bean(m, cluster_name)
            })
            .collect())
    }

    /// A blank namespace is only accepted for the first environment of a
    /// cluster, and no environment can follow one that has none.
    async fn validate_namespace(&self, cluster_id: i32, namespace: &str) -> Result<(), ApiError> {
        let existing = self.db.get_environments_by_cluster(cluster_id).await?;
        if existing.is_empty() {
            return Ok(());
        }
        if namespace.is_empty() {
            return Err(ApiError::InvalidRequest(NAMESPACE_REQUIRED_MSG.to_string()));
        }
        if existing.iter().any(|e| e.namespace.is_empty()) {
            return Err(ApiError::InvalidRequest(
                OLD_ENVS_WITHOUT_NAMESPACE_MSG.to_string(),
            ));
        }
        Ok(())
    }

    /// Create if absent. Failures are logged, the environment is kept.
    async fn ensure_environment_namespace(&self, cluster: &ClusterBean, namespace: &str) {
        if namespace.is_empty() || cluster.is_virtual_cluster {
            return;
        }
        match self
            .access
            .ensure_namespace(&cluster.connection_config(), namespace)
            .await
        {
            Ok(true) => info!(cluster_id = cluster.id, namespace, "created namespace"),
            Ok(false) => {}
            Err(err) => warn!(
                cluster_id = cluster.id,
                namespace,
                error = ?err,
                "failed to create namespace for environment"
            ),
        }
    }

    pub async fn create_environment(
        &self,
        mut env: EnvironmentBean,
        user_id: i32,
    ) -> Result<EnvironmentBean, ApiError> {
        env.environment_name = env.environment_name.trim().to_string();
        env.namespace = env.namespace.trim().to_string();
        if env.environment_name.is_empty() {
            return Err(ApiError::InvalidRequest(
                "environment name is required".to_string(),
            ));
        }
        let cluster = self.find_cluster_by_id(env.cluster_id).await?;
        self.validate_namespace(cluster.id, &env.namespace).await?;

        env.environment_identifier = environment_identifier(&cluster.cluster_name, &env.namespace);
        if self
            .db
            .get_environment_by_name_or_identifier(&env.environment_name, &env.environment_identifier)
            .await?
            .is_some()
        {
            return Err(ApiError::InvalidRequest(ENVIRONMENT_DUPLICATE_MSG.to_string()));
        }
        if !env.namespace.is_empty()
            && self
                .db
                .get_environment_by_cluster_namespace(cluster.id, &env.namespace)
                .await?
                .is_some()
        {
            return Err(ApiError::InvalidRequest(ENVIRONMENT_DUPLICATE_MSG.to_string()));
        }

        let model = self.db.create_environment(&env, user_id).await?;
        self.ensure_environment_namespace(&cluster, &env.namespace)
            .await;
        info!(
            environment_id = model.id,
            cluster_id = cluster.id,
            "environment created"
        );
        Ok(environment_bean(&model, &cluster.cluster_name))
    }

    pub async fn update_environment(
        &self,
        mut env: EnvironmentBean,
        user_id: i32,
    ) -> Result<EnvironmentBean, ApiError> {
        let stored = self
            .db
            .get_environment(env.id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("environment {} not found", env.id)))?;
        let cluster = self.find_cluster_by_id(env.cluster_id).await?;
        env.environment_name = env.environment_name.trim().to_string();
        env.namespace = env.namespace.trim().to_string();

        if let Some(other) = self.db.get_environment_by_name(&env.environment_name).await? {
            if other.id != stored.id {
                return Err(ApiError::InvalidRequest(ENVIRONMENT_DUPLICATE_MSG.to_string()));
            }
        }
        if !env.namespace.is_empty() {
            if let Some(other) = self
                .db
                .get_environment_by_cluster_namespace(cluster.id, &env.namespace)
                .await?
            {
                if other.id != stored.id {
                    return Err(ApiError::InvalidRequest(
                        ENVIRONMENT_DUPLICATE_MSG.to_string(),
                    ));
                }
            }
        }

        env.environment_identifier = environment_identifier(&cluster.cluster_name, &env.namespace);
        let model = self.db.update_environment(&env, user_id).await?;
        self.ensure_environment_namespace(&cluster, &env.namespace)
            .await;
        Ok(environment_bean(&model, &cluster.cluster_name))
    }

    pub async fn delete_environment(&self, id: i32, user_id: i32) -> Result<(), ApiError> {
        let env = self
            .db
            .get_environment(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("environment {id} not found")))?;
        if self
            .db
            .namespace_has_helm_releases(env.cluster_id, &env.namespace)
            .await?
        {
            return Err(ApiError::Conflict(ENVIRONMENT_IN_USE_MSG.to_string()));
        }
        self.db.delete_environment(id, user_id).await?;
        info!(environment_id = id, "environment deleted");
        Ok(())
    }

    pub async fn find_environment_by_id(&self, id: i32) -> Result<EnvironmentBean, ApiError> {
        let model = self
            .db
            .get_environment(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("environment {id} not found")))?;
        let mut beans = self.environment_beans(vec![model]).await?;
        beans
            .pop()
            .ok_or_else(|| ApiError::NotFound(format!("environment {id} not found")))
    }

    pub async fn find_environment_by_name(&self, name: &str) -> Result<EnvironmentBean, ApiError> {
        let model = self
            .db
            .get_environment_by_name(name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("environment {name} not found")))?;
        let mut beans = self.environment_beans(vec![model]).await?;
        beans
            .pop()
            .ok_or_else(|| ApiError::NotFound(format!("environment {name} not found")))
    }

    /// Includes soft deleted rows.
    pub async fn get_all_environments(&self) -> Result<Vec<EnvironmentBean>, ApiError> {
        let models = self.db.get_all_environments().await?;
        self.environment_beans(models).await
    }

    pub async fn get_all_active_environments(&self) -> Result<Vec<EnvironmentBean>, ApiError> {
        let models = self.db.get_active_environments().await?;
        self.environment_beans(models).await
    }

    pub async fn get_environments_by_cluster_id(
        &self,
        cluster_id: i32,
    ) -> Result<Vec<EnvironmentBean>, ApiError> {
        let cluster = self.find_cluster_by_id(cluster_id).await?;
        let models = self.db.get_environments_by_cluster(cluster_id).await?;
        Ok(models
            .iter()
            .map(|m| environment_bean(m, &cluster.cluster_name))
            .collect())
    }
}
