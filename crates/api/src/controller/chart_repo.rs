use std::time::Duration;

use devplane_common::{
    chart_repo::{
        ChartRepoDto, DetailedErrorHelmRepoValidation, DUPLICATE_REPO_MSG, INDEX_NOT_FOUND_MSG,
        INDEX_UNREADABLE_MSG, INVALID_AUTH_MSG, INVALID_NAME_MSG, NON_LOWERCASE_NAME_MSG,
        VALIDATION_FAILED_MSG,
    },
    utils::{chart_repo_index_url, contains_whitespace},
};
use devplane_db::chart_repo_dto;
use devplane_rpc::error::ApiError;
use reqwest::StatusCode;
use sea_orm::TransactionTrait;
use tracing::{error, info, warn};

use super::Controller;

const INDEX_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const IMMUTABLE_REPO_MSG: &str =
    "name and url of a chart repo can't be changed once charts from it are deployed";
const REPO_IN_USE_MSG: &str = "chart repo can't be deleted while charts from it are deployed";

/// Fetches `index.yaml` of the repo and maps the outcome to the messages
/// shown on the repo form.
pub async fn validate_chart_repo(
    http: &reqwest::Client,
    repo: &ChartRepoDto,
) -> DetailedErrorHelmRepoValidation {
    if repo.name.chars().count() < 3 || contains_whitespace(&repo.name) {
        return DetailedErrorHelmRepoValidation::failure(
            INVALID_NAME_MSG,
            format!("invalid repo name {:?}", repo.name),
        );
    }

    let http = if repo.allow_insecure_connection {
        match reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                return DetailedErrorHelmRepoValidation::failure(VALIDATION_FAILED_MSG, e.to_string())
            }
        }
    } else {
        http.clone()
    };

    let mut request = http
        .get(chart_repo_index_url(&repo.url))
        .timeout(INDEX_FETCH_TIMEOUT);
    if repo.has_basic_auth() {
        request = request.basic_auth(&repo.user_name, Some(&repo.password));
    }
    let resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(repo = repo.name.as_str(), error = ?e, "chart repo index request failed");
            return DetailedErrorHelmRepoValidation::failure(VALIDATION_FAILED_MSG, e.to_string());
        }
    };

    let status = resp.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DetailedErrorHelmRepoValidation::failure(INVALID_AUTH_MSG, status.to_string())
        }
        StatusCode::NOT_FOUND => {
            DetailedErrorHelmRepoValidation::failure(INDEX_NOT_FOUND_MSG, status.to_string())
        }
        s if !s.is_success() => {
            DetailedErrorHelmRepoValidation::failure(VALIDATION_FAILED_MSG, status.to_string())
        }
        _ => match resp.bytes().await {
            Ok(_) => DetailedErrorHelmRepoValidation::success(),
            Err(e) => DetailedErrorHelmRepoValidation::failure(INDEX_UNREADABLE_MSG, e.to_string()),
        },
    }
}

impl Controller {
    pub async fn validate_chart_repo(&self, repo: &ChartRepoDto) -> DetailedErrorHelmRepoValidation {
        validate_chart_repo(&self.http, repo).await
    }

    async fn ensure_valid_repo(&self, repo: &ChartRepoDto) -> Result<(), ApiError> {
        if repo.name != repo.name.to_lowercase() {
            return Err(ApiError::InvalidRequest(NON_LOWERCASE_NAME_MSG.to_string()));
        }
        let validation = self.validate_chart_repo(repo).await;
        if !validation.is_success() {
            warn!(
                repo = repo.name.as_str(),
                reason = validation.actual_err_msg.as_str(),
                "chart repo validation failed"
            );
            return Err(ApiError::InvalidRequest(validation.custom_err_msg));
        }
        Ok(())
    }

    pub async fn get_chart_repo_list(&self) -> Result<Vec<ChartRepoDto>, ApiError> {
        let counts = self.db.chart_repo_deployment_counts().await?;
        let repos = self.db.get_all_chart_repos().await?;
        Ok(repos
            .iter()
            .map(|r| chart_repo_dto(r, counts.get(&r.id).copied().unwrap_or(0)))
            .collect())
    }

    pub async fn get_chart_repo_by_id(&self, id: i32) -> Result<ChartRepoDto, ApiError> {
        let repo = self
            .db
            .get_chart_repo(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("chart repo {id} not found")))?;
        let count = self.db.count_chart_repo_deployments(id).await?;
        Ok(chart_repo_dto(&repo, count))
    }

    pub async fn get_chart_repo_by_name(&self, name: &str) -> Result<ChartRepoDto, ApiError> {
        let repo = self
            .db
            .get_chart_repo_by_name(name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("chart repo {name} not found")))?;
        let count = self.db.count_chart_repo_deployments(repo.id).await?;
        Ok(chart_repo_dto(&repo, count))
    }

    pub async fn create_chart_repo(
        &self,
        mut repo: ChartRepoDto,
        user_id: i32,
    ) -> Result<ChartRepoDto, ApiError> {
        repo.name = repo.name.trim().to_string();
        repo.url = repo.url.trim().to_string();
        self.ensure_valid_repo(&repo).await?;
        if self.db.get_chart_repo_by_name(&repo.name).await?.is_some() {
            return Err(ApiError::InvalidRequest(DUPLICATE_REPO_MSG.to_string()));
        }

        let txn = self.db.conn.begin().await?;
        let model = self.db.create_chart_repo(&txn, &repo, user_id).await?;
        repo.id = model.id;
        if let Err(err) = self.repo_sync.add_or_update(&repo, None).await {
            error!(repo = repo.name.as_str(), error = ?err, "failed to register chart repo with argocd");
            txn.rollback().await?;
            return Err(ApiError::upstream(format!("{err:#}")));
        }
        txn.commit().await?;
        info!(chart_repo_id = model.id, "chart repo created");

        self.trigger_chart_sync().await;
        Ok(chart_repo_dto(&model, 0))
    }

    /// Name and url are frozen once the repo has deployments.
    pub async fn update_chart_repo(
        &self,
        mut repo: ChartRepoDto,
        user_id: i32,
    ) -> Result<ChartRepoDto, ApiError> {
        let stored = self
            .db
            .get_chart_repo(repo.id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("chart repo {} not found", repo.id)))?;
        repo.name = repo.name.trim().to_string();
        repo.url = repo.url.trim().to_string();

        let deployments = self.db.count_chart_repo_deployments(stored.id).await?;
        if deployments > 0 && (repo.name != stored.name || repo.url != stored.url) {
            return Err(ApiError::InvalidRequest(IMMUTABLE_REPO_MSG.to_string()));
        }
        if let Some(other) = self.db.get_chart_repo_by_name(&repo.name).await? {
            if other.id != stored.id {
                return Err(ApiError::InvalidRequest(DUPLICATE_REPO_MSG.to_string()));
            }
        }
        self.ensure_valid_repo(&repo).await?;

        let txn = self.db.conn.begin().await?;
        let model = self.db.update_chart_repo(&txn, &repo, user_id).await?;
        if let Err(err) = self
            .repo_sync
            .add_or_update(&repo, Some(stored.name.clone()))
            .await
        {
            error!(repo = repo.name.as_str(), error = ?err, "failed to update chart repo in argocd");
            txn.rollback().await?;
            return Err(ApiError::upstream(format!("{err:#}")));
        }
        txn.commit().await?;

        self.trigger_chart_sync().await;
        Ok(chart_repo_dto(&model, deployments))
    }

    pub async fn delete_chart_repo(&self, id: i32, user_id: i32) -> Result<(), ApiError> {
        let stored = self
            .db
            .get_chart_repo(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("chart repo {id} not found")))?;
        if self.db.count_chart_repo_deployments(id).await? > 0 {
            return Err(ApiError::Conflict(REPO_IN_USE_MSG.to_string()));
        }

        let txn = self.db.conn.begin().await?;
        self.db.delete_chart_repo(&txn, id, user_id).await?;
        if let Err(err) = self.repo_sync.delete(&stored.name).await {
            error!(repo = stored.name.as_str(), error = ?err, "failed to remove chart repo from argocd");
            txn.rollback().await?;
            return Err(ApiError::upstream(format!("{err:#}")));
        }
        txn.commit().await?;
        info!(chart_repo_id = id, "chart repo deleted");

        self.trigger_chart_sync().await;
        Ok(())
    }

    /// Launch failures are logged only.
    async fn trigger_chart_sync(&self) {
        if let Err(err) = self.chart_sync.trigger().await {
            warn!(error = ?err, "failed to launch chart sync job");
        }
    }

    /// Launches a chart sync job and returns its name.
    pub async fn trigger_chart_sync_manual(&self) -> Result<String, ApiError> {
        self.chart_sync
            .trigger()
            .await
            .map_err(|e| ApiError::upstream(format!("{e:#}")))
    }
}
