use devplane_common::{
    app_id::ExternalAppId,
    argo::{ArgoAppDetail, ArgoAppListEntry},
};
use devplane_rpc::error::ApiError;

use super::Controller;

impl Controller {
    pub async fn list_argo_apps(
        &self,
        cluster_ids: Option<Vec<i32>>,
    ) -> Result<Vec<ArgoAppListEntry>, ApiError> {
        self.argo.list_applications(cluster_ids).await
    }

    pub async fn argo_app_detail(
        &self,
        name: &str,
        namespace: &str,
        cluster_id: i32,
    ) -> Result<ArgoAppDetail, ApiError> {
        self.argo.get_app_detail(name, namespace, cluster_id).await
    }

    /// Same as [`Controller::argo_app_detail`] with the three parts taken
    /// from an encoded external app id.
    pub async fn argo_app_detail_by_app_id(&self, app_id: &str) -> Result<ArgoAppDetail, ApiError> {
        let id =
            ExternalAppId::decode(app_id).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.argo
            .get_app_detail(&id.name, &id.namespace, id.cluster_id)
            .await
    }
}
