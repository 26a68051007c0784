use std::{collections::HashMap, str::FromStr};

use devplane_common::{
    chart_repo::{ChartRepoAuthMode, ChartRepoDto},
    cluster::ClusterBean,
    environment::EnvironmentBean,
};
use serde::de::DeserializeOwned;

fn parse_json<T: DeserializeOwned>(raw: &str, column: &str, id: i32) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(id, column, error = ?e, "stored json can't be decoded");
            None
        }
    }
}

pub fn cluster_bean(model: &devplane_db_entities::cluster::Model) -> ClusterBean {
    let config: HashMap<String, String> =
        parse_json(&model.config, "config", model.id).unwrap_or_default();
    ClusterBean {
        id: model.id,
        cluster_name: model.cluster_name.clone(),
        server_url: model.server_url.clone(),
        prometheus_url: model.prometheus_url.clone(),
        active: model.active,
        config,
        prometheus_auth: model
            .prometheus_auth
            .as_deref()
            .and_then(|raw| parse_json(raw, "prometheus_auth", model.id)),
        remote_connection: model
            .remote_connection
            .as_deref()
            .and_then(|raw| parse_json(raw, "remote_connection", model.id)),
        k8s_version: model.k8s_version.clone(),
        insecure_skip_tls_verify: model.insecure_skip_tls_verify,
        error_in_connecting: model.error_in_connecting.clone(),
        is_virtual_cluster: model.is_virtual_cluster,
        description: model.description.clone(),
        user_name: None,
    }
}

pub fn environment_bean(
    model: &devplane_db_entities::environment::Model,
    cluster_name: &str,
) -> EnvironmentBean {
    EnvironmentBean {
        id: model.id,
        environment_name: model.environment_name.clone(),
        cluster_id: model.cluster_id,
        cluster_name: cluster_name.to_string(),
        active: model.active,
        default: model.is_default,
        namespace: model.namespace.clone(),
        description: model.description.clone(),
        environment_identifier: model.environment_identifier.clone(),
    }
}

pub fn chart_repo_dto(
    model: &devplane_db_entities::chart_repo::Model,
    deployment_count: u64,
) -> ChartRepoDto {
    ChartRepoDto {
        id: model.id,
        name: model.name.clone(),
        url: model.url.clone(),
        auth_mode: ChartRepoAuthMode::from_str(&model.auth_mode).unwrap_or_default(),
        user_name: model.user_name.clone(),
        password: model.password.clone(),
        ssh_key: model.ssh_key.clone(),
        access_token: model.access_token.clone(),
        default: model.is_default,
        active: model.active,
        allow_insecure_connection: model.allow_insecure_connection,
        deployment_count,
    }
}
