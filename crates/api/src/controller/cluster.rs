use std::collections::{BTreeMap, HashMap};

use devplane_common::{
    cluster::{
        connection_changed, ClusterAutoComplete, ClusterBean, ClusterModifyAction, ClusterState,
        ClusterStateEvent, CredentialsUpdate, PrometheusAuth, ValidateClusterBean,
    },
    DEFAULT_CLUSTER,
};
use devplane_db::cluster_bean;
use devplane_kube::{
    kubeconfig::{assemble_validation_result, parse_kubeconfig, RESERVED_CLUSTER_ERROR},
    prober::{apply_probe_results, probe_and_persist, probe_clusters},
};
use devplane_rpc::error::ApiError;
use tracing::{error, info, warn};

use super::{Controller, DbStatusStore};

pub const CLUSTER_DUPLICATE_MSG: &str = "cluster already exists";
const CLUSTER_NAME_REQUIRED_MSG: &str = "cluster name is required";
const CLUSTER_HAS_ENVIRONMENTS_MSG: &str =
    "cluster can't be deleted while environments are mapped to it";

fn merge_prometheus_auth(
    stored: Option<PrometheusAuth>,
    requested: Option<PrometheusAuth>,
) -> Option<PrometheusAuth> {
    let Some(requested) = requested else {
        return stored;
    };
    let mut merged = stored.unwrap_or_default();
    for (field, value) in [
        (&mut merged.user_name, requested.user_name),
        (&mut merged.password, requested.password),
        (&mut merged.tls_client_cert, requested.tls_client_cert),
        (&mut merged.tls_client_key, requested.tls_client_key),
    ] {
        if !value.is_empty() {
            *field = value;
        }
    }
    Some(merged)
}

impl Controller {
    pub async fn find_all_clusters(&self) -> Result<Vec<ClusterBean>, ApiError> {
        let clusters = self.db.get_all_active_clusters().await?;
        Ok(clusters.iter().map(cluster_bean).collect())
    }

    pub async fn find_all_clusters_except_virtual(&self) -> Result<Vec<ClusterBean>, ApiError> {
        let clusters = self.db.get_all_active_clusters_except_virtual().await?;
        Ok(clusters.iter().map(cluster_bean).collect())
    }

    pub async fn find_cluster_by_id(&self, id: i32) -> Result<ClusterBean, ApiError> {
        let cluster = self
            .db
            .get_cluster(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("cluster {id} not found")))?;
        Ok(cluster_bean(&cluster))
    }

    pub async fn find_clusters_by_ids(&self, ids: &[i32]) -> Result<Vec<ClusterBean>, ApiError> {
        let clusters = self.db.get_clusters_by_ids(ids).await?;
        Ok(clusters.iter().map(cluster_bean).collect())
    }

    pub async fn find_cluster_by_name(&self, name: &str) -> Result<ClusterBean, ApiError> {
        let cluster = self
            .db
            .get_cluster_by_name(name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("cluster {name} not found")))?;
        Ok(cluster_bean(&cluster))
    }

    /// Id, name and connection status only, no credentials.
    pub async fn find_all_clusters_for_autocomplete(
        &self,
    ) -> Result<Vec<ClusterAutoComplete>, ApiError> {
        let clusters = self.db.get_all_active_clusters().await?;
        Ok(clusters
            .into_iter()
            .map(|c| ClusterAutoComplete {
                id: c.id,
                cluster_name: c.cluster_name,
                error_in_connecting: c.error_in_connecting,
                is_virtual_cluster: c.is_virtual_cluster,
            })
            .collect())
    }

    /// Namespaces observed by the informers, by cluster name.
    pub fn get_all_cluster_namespaces(&self) -> BTreeMap<String, Vec<String>> {
        self.informers
            .snapshot()
            .into_iter()
            .map(|(cluster, namespaces)| {
                let mut namespaces: Vec<String> = namespaces.into_iter().collect();
                namespaces.sort();
                (cluster, namespaces)
            })
            .collect()
    }

    pub async fn find_all_namespaces_by_cluster_id(&self, id: i32) -> Result<Vec<String>, ApiError> {
        let cluster = self.find_cluster_by_id(id).await?;
        Ok(self.informers.namespaces_of(&cluster.cluster_name))
    }

    /// `/livez` check done before a cluster is persisted.
    async fn check_config_is_valid(&self, cluster: &ClusterBean) -> Result<(), ApiError> {
        self.connectivity
            .livez(&cluster.connection_config())
            .await
            .map_err(|reason| {
                warn!(
                    cluster_name = cluster.cluster_name.as_str(),
                    reason = reason.as_str(),
                    "cluster config is not valid"
                );
                ApiError::InvalidRequest(reason)
            })
    }

    /// Walks a new cluster through validation. Only a cluster that ends up
    /// active may be persisted.
    pub(super) async fn registration_state(
        &self,
        cluster: &ClusterBean,
    ) -> Result<ClusterState, ApiError> {
        let unregistered = ClusterState::Unregistered;
        let state = if cluster.is_virtual_cluster {
            unregistered.next(&ClusterStateEvent::MarkedVirtual)
        } else {
            let validating = unregistered.next(&ClusterStateEvent::ValidationStarted);
            let validated = self.check_config_is_valid(cluster).await;
            let outcome = validated.as_ref().err().map(|e| format!("{e:?}"));
            validated?;
            validating.and_then(|s| s.next(&ClusterStateEvent::Validated(outcome)))
        };
        match state {
            Some(state) if state.is_active() => Ok(state),
            _ => Err(ApiError::InvalidRequest(format!(
                "cluster {} could not be registered",
                cluster.cluster_name
            ))),
        }
    }

    async fn k8s_version(&self, cluster: &ClusterBean) -> String {
        match self.access.server_version(&cluster.connection_config()).await {
            Ok(version) => version,
            Err(err) => {
                warn!(
                    cluster_id = cluster.id,
                    error = ?err,
                    "failed to fetch kubernetes server version"
                );
                String::new()
            }
        }
    }

    async fn publish_cluster_event(&self, cluster_id: i32, action: ClusterModifyAction) {
        if let Err(err) = self.events.publish(cluster_id, action).await {
            error!(cluster_id, action = %action, error = ?err, "failed to publish cluster modify event");
        }
    }

    pub async fn create_cluster(
        &self,
        mut cluster: ClusterBean,
        user_id: i32,
    ) -> Result<ClusterBean, ApiError> {
        cluster.cluster_name = cluster.cluster_name.trim().to_string();
        cluster.server_url = cluster.server_url.trim().to_string();
        if cluster.cluster_name.is_empty() {
            return Err(ApiError::InvalidRequest(CLUSTER_NAME_REQUIRED_MSG.to_string()));
        }

        let state = self.registration_state(&cluster).await?;

        if self.db.get_cluster_by_name(&cluster.cluster_name).await?.is_some() {
            return Err(ApiError::InvalidRequest(CLUSTER_DUPLICATE_MSG.to_string()));
        }

        cluster.error_in_connecting = String::new();
        if !cluster.is_virtual_cluster {
            cluster.k8s_version = self.k8s_version(&cluster).await;
        }
        let model = self.db.create_cluster(&cluster, user_id).await?;
        let created = cluster_bean(&model);
        info!(
            cluster_id = created.id,
            cluster_name = created.cluster_name.as_str(),
            state = %state,
            "cluster registered"
        );

        if !created.is_virtual_cluster {
            self.publish_cluster_event(created.id, ClusterModifyAction::Add)
                .await;
            self.informers.build_informer(std::slice::from_ref(&created));
        }
        Ok(created)
    }

    /// Empty credential values in `request` keep what is stored.
    pub async fn update_cluster(
        &self,
        request: ClusterBean,
        user_id: i32,
    ) -> Result<ClusterBean, ApiError> {
        let stored = self.find_cluster_by_id(request.id).await?;
        if stored.cluster_name == DEFAULT_CLUSTER {
            return Err(ApiError::InvalidRequest(RESERVED_CLUSTER_ERROR.to_string()));
        }
        let name = request.cluster_name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::InvalidRequest(CLUSTER_NAME_REQUIRED_MSG.to_string()));
        }
        if let Some(other) = self.db.get_cluster_by_name(&name).await? {
            if other.id != stored.id {
                return Err(ApiError::InvalidRequest(CLUSTER_DUPLICATE_MSG.to_string()));
            }
        }

        let config = CredentialsUpdate::from_request(&request.config).apply(&stored.config);
        let mut updated = ClusterBean {
            cluster_name: name,
            server_url: request.server_url.trim().to_string(),
            prometheus_url: request.prometheus_url,
            config,
            prometheus_auth: merge_prometheus_auth(
                stored.prometheus_auth.clone(),
                request.prometheus_auth,
            ),
            remote_connection: request.remote_connection,
            insecure_skip_tls_verify: request.insecure_skip_tls_verify,
            ..stored.clone()
        };

        let changed = connection_changed(
            &stored.server_url,
            stored.insecure_skip_tls_verify,
            &stored.config,
            &updated.server_url,
            updated.insecure_skip_tls_verify,
            &updated.config,
        );
        if changed && !updated.is_virtual_cluster {
            self.check_config_is_valid(&updated).await?;
            updated.error_in_connecting = String::new();
            updated.k8s_version = String::new();
        }
        if updated.k8s_version.is_empty() && !updated.is_virtual_cluster {
            updated.k8s_version = self.k8s_version(&updated).await;
        }

        let model = self.db.update_cluster(&updated, user_id).await?;
        let saved = cluster_bean(&model);

        if changed && !saved.is_virtual_cluster {
            self.publish_cluster_event(saved.id, ClusterModifyAction::Update)
                .await;
        }
        if (changed || saved.cluster_name != stored.cluster_name) && !saved.is_virtual_cluster {
            if saved.cluster_name != stored.cluster_name {
                self.informers.clean_namespace_informer(&stored.cluster_name);
            }
            self.informers.rebuild(&saved);
        }
        Ok(saved)
    }

    pub async fn set_cluster_description(
        &self,
        id: i32,
        description: &str,
        user_id: i32,
    ) -> Result<ClusterBean, ApiError> {
        self.find_cluster_by_id(id).await?;
        let model = self
            .db
            .set_cluster_description(id, description, user_id)
            .await?;
        Ok(cluster_bean(&model))
    }

    pub async fn delete_cluster(&self, id: i32, user_id: i32) -> Result<(), ApiError> {
        let cluster = self.find_cluster_by_id(id).await?;
        if cluster.cluster_name == DEFAULT_CLUSTER {
            return Err(ApiError::InvalidRequest(RESERVED_CLUSTER_ERROR.to_string()));
        }
        if self.db.cluster_has_active_environments(id).await? {
            return Err(ApiError::Conflict(CLUSTER_HAS_ENVIRONMENTS_MSG.to_string()));
        }
        let state = ClusterState::of(
            cluster.active,
            cluster.is_virtual_cluster,
            &cluster.error_in_connecting,
        );
        if state.next(&ClusterStateEvent::Deleted).is_none() {
            return Err(ApiError::Conflict(format!("cluster {id} is {state}")));
        }

        self.db.delete_cluster(id, user_id).await?;
        self.informers
            .clean_namespace_informer(&cluster.cluster_name);
        if let Err(err) = self.events.remove(id).await {
            warn!(cluster_id = id, error = ?err, "failed to remove cluster modify event");
        }
        info!(cluster_id = id, "cluster deleted");
        Ok(())
    }

    /// Parses a kubeconfig and probes every context that passed validation.
    /// Nothing is persisted.
    pub async fn validate_kubeconfig(
        &self,
        document: &str,
    ) -> Result<HashMap<String, ValidateClusterBean>, ApiError> {
        let mut entries =
            parse_kubeconfig(document).map_err(|e| ApiError::InvalidRequest(format!("{e:#}")))?;

        let valid: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_valid())
            .map(|(i, _)| i)
            .collect();
        let mut batch: Vec<ClusterBean> = valid.iter().map(|&i| entries[i].cluster.clone()).collect();
        let results = probe_clusters(self.connectivity.as_ref(), &batch).await;
        apply_probe_results(&mut batch, &results);
        for (i, probed) in valid.into_iter().zip(batch) {
            entries[i].cluster.error_in_connecting = probed.error_in_connecting;
        }

        let existing: HashMap<String, i32> = self
            .db
            .get_all_active_clusters()
            .await?
            .into_iter()
            .map(|c| (c.cluster_name, c.id))
            .collect();
        Ok(assemble_validation_result(entries, &existing))
    }

    /// Probes every active cluster and stores the outcome. Virtual clusters
    /// get their sentinel error.
    pub async fn probe_all_clusters(&self) -> Result<(), ApiError> {
        let clusters = self.find_all_clusters().await?;
        probe_and_persist(
            self.connectivity.as_ref(),
            &DbStatusStore(self.db.clone()),
            &clusters,
        )
        .await;
        Ok(())
    }

    /// Starts namespace informers for every active cluster.
    pub async fn build_informers(&self) -> Result<(), ApiError> {
        let clusters = self.find_all_clusters_except_virtual().await?;
        self.informers.build_informer(&clusters);
        Ok(())
    }
}
