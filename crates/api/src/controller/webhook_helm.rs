use devplane_common::{app_id::ExternalAppId, helm::{app_detail_url, HelmAppCreateUpdateRequest}};
use devplane_rpc::{
    error::ApiError,
    helm_app::{ChartRepository, ClusterConfig, InstallReleaseRequest, ReleaseIdentifier},
};
use tracing::{error, info};

use super::Controller;

impl Controller {
    /// Installs the release, or updates it when it is already installed.
    /// Returns the detail url of the app, `None` when the platform host url
    /// isn't configured.
    pub async fn create_or_update_helm_app(
        &self,
        req: HelmAppCreateUpdateRequest,
    ) -> Result<Option<String>, ApiError> {
        let missing = req.missing_fields();
        if !missing.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let cluster = self
            .db
            .get_cluster_by_name(&req.cluster_name)
            .await?
            .map(|c| devplane_db::cluster_bean(&c))
            .ok_or_else(|| ApiError::NotFound(format!("cluster {} not found", req.cluster_name)))?;

        let (chart_repository, chart_repo_id) = match &req.chart.repo.identifier {
            Some(identifier) => (
                ChartRepository {
                    name: req.chart.repo.name.clone(),
                    url: identifier.url.clone(),
                    username: identifier.username.clone().unwrap_or_default(),
                    password: identifier.password.clone().unwrap_or_default(),
                    allow_insecure_connection: identifier.allow_insecure_connection,
                },
                None,
            ),
            None => {
                let repo = self
                    .db
                    .get_chart_repo_by_name(&req.chart.repo.name)
                    .await?
                    .ok_or_else(|| {
                        ApiError::NotFound(format!("chart repo {} not found", req.chart.repo.name))
                    })?;
                (
                    ChartRepository {
                        name: repo.name.clone(),
                        url: repo.url.clone(),
                        username: repo.user_name.clone(),
                        password: repo.password.clone(),
                        allow_insecure_connection: repo.allow_insecure_connection,
                    },
                    Some(repo.id),
                )
            }
        };

        let namespace = req.namespace().to_string();
        let identifier = ReleaseIdentifier {
            cluster_config: Some(ClusterConfig::from(&cluster.connection_config())),
            release_name: req.release_name.clone(),
            release_namespace: namespace.clone(),
        };
        let chart_version = req.chart.chart_version.clone().unwrap_or_default();
        let install = InstallReleaseRequest {
            release_identifier: Some(identifier.clone()),
            chart_name: req.chart.chart_name.clone(),
            chart_version: chart_version.clone(),
            values_yaml: req.values_override_yaml.clone().unwrap_or_default(),
            chart_repository: Some(chart_repository),
        };

        let installed = self
            .helm
            .is_release_installed(identifier)
            .await
            .map_err(|e| ApiError::upstream(e.to_string()))?;
        let success = if installed {
            self.helm.update_application_with_chart_info(install).await
        } else {
            self.helm.install_release(install).await
        }
        .map_err(|e| {
            error!(
                cluster_id = cluster.id,
                release = req.release_name.as_str(),
                error = ?e,
                "helm release call failed"
            );
            ApiError::upstream(e.to_string())
        })?;
        if !success {
            return Err(ApiError::upstream(format!(
                "helm app service could not {} release {}",
                if installed { "update" } else { "install" },
                req.release_name
            )));
        }
        info!(
            cluster_id = cluster.id,
            namespace = namespace.as_str(),
            release = req.release_name.as_str(),
            updated = installed,
            "helm release applied"
        );

        if let Err(err) = self
            .db
            .upsert_helm_release(
                cluster.id,
                &namespace,
                &req.release_name,
                chart_repo_id,
                &req.chart.chart_name,
                &chart_version,
            )
            .await
        {
            error!(cluster_id = cluster.id, error = ?err, "failed to record helm release");
        }

        let Some(host_url) = self.db.get_host_url().await? else {
            return Ok(None);
        };
        let app_id = ExternalAppId::new(cluster.id, namespace, req.release_name);
        Ok(Some(app_detail_url(&host_url, &app_id.encode())))
    }
}
