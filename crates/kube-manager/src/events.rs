use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use devplane_common::cluster::{
    cluster_modify_event_name, ClusterModifyAction, CLUSTER_EVENT_FIELD_ACTION,
    CLUSTER_EVENT_FIELD_CLUSTER_ID, CLUSTER_EVENT_FIELD_UPDATED_ON, CLUSTER_MODIFY_LABEL_KEY,
    CLUSTER_MODIFY_LABEL_VALUE,
};
use k8s_openapi::{
    api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    api::{DeleteParams, PostParams},
    Api,
};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

/// Announces cluster add/update to the side-cars watching the platform
/// namespace.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterEventPublisher: Send + Sync {
    async fn publish(&self, cluster_id: i32, action: ClusterModifyAction) -> Result<()>;

    async fn remove(&self, cluster_id: i32) -> Result<()>;
}

/// Writes one ConfigMap per cluster, `cluster-event-<id>`, in the platform
/// namespace of the platform's own cluster.
#[derive(Clone)]
pub struct ConfigMapEventPublisher {
    client: kube::Client,
    namespace: String,
}

impl ConfigMapEventPublisher {
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

pub fn cluster_event_config_map(
    namespace: &str,
    cluster_id: i32,
    action: ClusterModifyAction,
    updated_on: DateTime<Utc>,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(cluster_modify_event_name(cluster_id)),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                CLUSTER_MODIFY_LABEL_KEY.to_string(),
                CLUSTER_MODIFY_LABEL_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (
                CLUSTER_EVENT_FIELD_CLUSTER_ID.to_string(),
                cluster_id.to_string(),
            ),
            (CLUSTER_EVENT_FIELD_ACTION.to_string(), action.to_string()),
            (
                CLUSTER_EVENT_FIELD_UPDATED_ON.to_string(),
                updated_on.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ])),
        ..Default::default()
    }
}

#[async_trait]
impl ClusterEventPublisher for ConfigMapEventPublisher {
    async fn publish(&self, cluster_id: i32, action: ClusterModifyAction) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let name = cluster_modify_event_name(cluster_id);
        let mut cm = cluster_event_config_map(&self.namespace, cluster_id, action, Utc::now());

        if let Some(existing) = api.get_opt(&name).await? {
            cm.metadata.resource_version = existing.metadata.resource_version;
            api.replace(&name, &PostParams::default(), &cm).await?;
        } else {
            api.create(&PostParams::default(), &cm).await?;
        }
        info!(cluster_id, action = %action, "published cluster modify event");
        Ok(())
    }

    async fn remove(&self, cluster_id: i32) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let name = cluster_modify_event_name(cluster_id);
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(cluster_id, "cluster modify event already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
