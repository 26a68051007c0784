use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::{
        batch::v1::{Job, JobSpec},
        core::v1::{Container, PodSpec, PodTemplateSpec},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    api::{DeleteParams, ListParams, PostParams, PropagationPolicy},
    Api, ResourceExt,
};
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

const CHART_SYNC_LABEL_KEY: &str = "app";
const CHART_SYNC_LABEL_VALUE: &str = "chart-sync";
const JOB_TTL_SECONDS: i32 = 3600;

/// Launches a refresh of the chart store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChartSyncTrigger: Send + Sync {
    /// Returns the name of the launched job.
    async fn trigger(&self) -> Result<String>;
}

#[derive(Clone)]
pub struct ChartSyncJob {
    client: kube::Client,
    namespace: String,
    image: String,
}

impl ChartSyncJob {
    pub fn new(client: kube::Client, namespace: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            image: image.into(),
        }
    }
}

pub fn chart_sync_job(namespace: &str, image: &str, at: DateTime<Utc>) -> Job {
    let labels = BTreeMap::from([(
        CHART_SYNC_LABEL_KEY.to_string(),
        CHART_SYNC_LABEL_VALUE.to_string(),
    )]);
    Job {
        metadata: ObjectMeta {
            name: Some(format!("{CHART_SYNC_LABEL_VALUE}-{}", at.timestamp())),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(JOB_TTL_SECONDS),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: CHART_SYNC_LABEL_VALUE.to_string(),
                        image: Some(image.to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ChartSyncTrigger for ChartSyncJob {
    async fn trigger(&self) -> Result<String> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);

        let selector = format!("{CHART_SYNC_LABEL_KEY}={CHART_SYNC_LABEL_VALUE}");
        let previous = api.list(&ListParams::default().labels(&selector)).await?;
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        for job in previous {
            let name = job.name_any();
            if let Err(err) = api.delete(&name, &dp).await {
                warn!(job = name.as_str(), error = ?err, "failed to delete old chart sync job");
            }
        }

        let job = chart_sync_job(&self.namespace, &self.image, Utc::now());
        let created = api.create(&PostParams::default(), &job).await?;
        let name = created.name_any();
        info!(job = name.as_str(), "chart sync job launched");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn job_runs_once_in_platform_namespace() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let job = chart_sync_job("devtroncd", "registry.example.com/chart-sync:v1", at);
        assert_eq!(
            job.metadata.name.as_deref(),
            Some(format!("chart-sync-{}", at.timestamp()).as_str())
        );
        assert_eq!(job.metadata.namespace.as_deref(), Some("devtroncd"));

        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(
            pod.containers[0].image.as_deref(),
            Some("registry.example.com/chart-sync:v1")
        );
    }
}
