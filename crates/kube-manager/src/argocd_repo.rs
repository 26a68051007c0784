use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use devplane_common::chart_repo::{ChartRepoAuthMode, ChartRepoDto};
use k8s_openapi::{
    api::core::v1::{ConfigMap, Secret},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    api::{DeleteParams, PostParams},
    Api,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

const REPOSITORIES_KEY: &str = "repositories";
const CREDENTIALS_SECRET_PREFIX: &str = "chart-repo";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY_VALUE: &str = "devplane";
const MAX_EDIT_ATTEMPTS: usize = 3;

/// Registers chart repositories with the GitOps side-car.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GitOpsRepoSync: Send + Sync {
    /// Adds `repo`, or updates the entry named `previous_name` (or
    /// `repo.name` when none).
    async fn add_or_update(&self, repo: &ChartRepoDto, previous_name: Option<String>)
        -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// One entry of the `repositories` list in the Argo CD configmap. Keys this
/// type doesn't model are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgoRepository {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_secret: Option<SecretKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_private_key_secret: Option<SecretKeyRef>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

pub fn credentials_secret_name(repo_name: &str) -> String {
    format!("{CREDENTIALS_SECRET_PREFIX}-{repo_name}")
}

fn secret_ref(repo_name: &str, key: &str) -> SecretKeyRef {
    SecretKeyRef {
        name: credentials_secret_name(repo_name),
        key: key.to_string(),
    }
}

pub fn repository_entry(repo: &ChartRepoDto) -> ArgoRepository {
    let mut entry = ArgoRepository {
        url: repo.url.clone(),
        name: repo.name.clone(),
        type_: "helm".to_string(),
        username_secret: None,
        password_secret: None,
        ssh_private_key_secret: None,
        insecure: repo.allow_insecure_connection,
        extra: serde_yaml::Mapping::new(),
    };
    match repo.auth_mode {
        ChartRepoAuthMode::UsernamePassword => {
            entry.username_secret = Some(secret_ref(&repo.name, "username"));
            entry.password_secret = Some(secret_ref(&repo.name, "password"));
        }
        ChartRepoAuthMode::Ssh => {
            entry.ssh_private_key_secret = Some(secret_ref(&repo.name, "sshPrivateKey"));
        }
        ChartRepoAuthMode::AccessToken | ChartRepoAuthMode::Anonymous => {}
    }
    entry
}

/// Credentials stored next to the configmap entry, `None` for repos that
/// don't need any.
pub fn credentials_data(repo: &ChartRepoDto) -> Option<BTreeMap<String, String>> {
    match repo.auth_mode {
        ChartRepoAuthMode::UsernamePassword => Some(BTreeMap::from([
            ("username".to_string(), repo.user_name.clone()),
            ("password".to_string(), repo.password.clone()),
        ])),
        ChartRepoAuthMode::Ssh => Some(BTreeMap::from([(
            "sshPrivateKey".to_string(),
            repo.ssh_key.clone(),
        )])),
        ChartRepoAuthMode::AccessToken | ChartRepoAuthMode::Anonymous => None,
    }
}

fn parse_repositories(yaml: &str) -> Result<Vec<ArgoRepository>> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let repos: Option<Vec<ArgoRepository>> = serde_yaml::from_str(yaml)?;
    Ok(repos.unwrap_or_default())
}

/// Replaces the entry named `name` with `entry`, or appends it. Keys of the
/// replaced entry that `entry` doesn't model survive.
pub fn upsert_repository(yaml: &str, name: &str, entry: ArgoRepository) -> Result<String> {
    let mut repos = parse_repositories(yaml)?;
    match repos.iter_mut().find(|r| r.name == name) {
        Some(existing) => {
            let extra = std::mem::take(&mut existing.extra);
            *existing = ArgoRepository { extra, ..entry };
        }
        None => repos.push(entry),
    }
    Ok(serde_yaml::to_string(&repos)?)
}

pub fn remove_repository(yaml: &str, name: &str) -> Result<String> {
    let mut repos = parse_repositories(yaml)?;
    let before = repos.len();
    repos.retain(|r| r.name != name);
    if repos.len() == before {
        return Err(anyhow!("repo {name} not found in config-map"));
    }
    Ok(serde_yaml::to_string(&repos)?)
}

/// Edits the Argo CD configmap and the credential secrets in the Argo CD
/// namespace.
#[derive(Clone)]
pub struct ArgoRepoSync {
    client: kube::Client,
    namespace: String,
    config_map: String,
}

impl ArgoRepoSync {
    pub fn new(
        client: kube::Client,
        namespace: impl Into<String>,
        config_map: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            config_map: config_map.into(),
        }
    }

    /// Reads the configmap, applies `edit` to its repositories and writes it
    /// back. A write rejected because someone else changed the configmap in
    /// between is retried on a fresh read.
    async fn edit_repositories(&self, edit: impl Fn(&str) -> Result<String>) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let mut attempt = 1;
        loop {
            let mut cm = api.get(&self.config_map).await?;
            let data = cm.data.get_or_insert_with(BTreeMap::new);
            let current = data.get(REPOSITORIES_KEY).cloned().unwrap_or_default();
            data.insert(REPOSITORIES_KEY.to_string(), edit(&current)?);
            match api
                .replace(&self.config_map, &PostParams::default(), &cm)
                .await
            {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(ae)) if ae.code == 409 && attempt < MAX_EDIT_ATTEMPTS => {
                    debug!(
                        config_map = self.config_map.as_str(),
                        attempt, "argocd configmap changed meanwhile, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        config_map = self.config_map.as_str(),
                        attempt,
                        error = ?e,
                        "argocd configmap update failed"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    async fn write_credentials(&self, repo: &ChartRepoDto) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let name = credentials_secret_name(&repo.name);
        let Some(data) = credentials_data(repo) else {
            return self.delete_credentials(&repo.name).await;
        };

        let mut secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGED_BY_VALUE.to_string(),
                )])),
                ..Default::default()
            },
            string_data: Some(data),
            ..Default::default()
        };
        if let Some(existing) = api.get_opt(&name).await? {
            secret.metadata.resource_version = existing.metadata.resource_version;
            api.replace(&name, &PostParams::default(), &secret).await?;
        } else {
            api.create(&PostParams::default(), &secret).await?;
        }
        Ok(())
    }

    async fn delete_credentials(&self, repo_name: &str) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        match api
            .delete(&credentials_secret_name(repo_name), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl GitOpsRepoSync for ArgoRepoSync {
    async fn add_or_update(
        &self,
        repo: &ChartRepoDto,
        previous_name: Option<String>,
    ) -> Result<()> {
        self.write_credentials(repo).await?;
        let lookup = previous_name.clone().unwrap_or_else(|| repo.name.clone());
        let entry = repository_entry(repo);
        self.edit_repositories(|yaml| upsert_repository(yaml, &lookup, entry.clone()))
            .await?;
        if let Some(previous) = previous_name.filter(|p| p != &repo.name) {
            self.delete_credentials(&previous).await?;
        }
        info!(repo = repo.name.as_str(), "chart repo registered with argocd");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.edit_repositories(|yaml| remove_repository(yaml, name))
            .await?;
        self.delete_credentials(name).await?;
        debug!(repo = name, "chart repo removed from argocd");
        Ok(())
    }
}
