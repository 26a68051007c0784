use serde::{Deserialize, Serialize};

pub const VALIDATION_SUCCESS_MSG: &str = "Configurations are validated successfully";
pub const INVALID_AUTH_MSG: &str = "Invalid authentication credentials. Please verify.";
pub const INDEX_NOT_FOUND_MSG: &str =
    "Could not find an index.yaml file in the repo directory. Please try another chart repo.";
pub const VALIDATION_FAILED_MSG: &str = "Could not validate the repo. Please try again.";
pub const INDEX_UNREADABLE_MSG: &str = "Devtron was unable to read the index.yaml file in the repo directory. Please try another chart repo.";
pub const INVALID_NAME_MSG: &str =
    "Invalid repo name: name must be at least 3 characters long and must not contain whitespace";
pub const NON_LOWERCASE_NAME_MSG: &str = "invalid repo name: please use lowercase";
pub const DUPLICATE_REPO_MSG: &str = "repo with chart name already exists";

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChartRepoAuthMode {
    #[default]
    Anonymous,
    UsernamePassword,
    AccessToken,
    Ssh,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartRepoDto {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub auth_mode: ChartRepoAuthMode,
    pub user_name: String,
    pub password: String,
    pub ssh_key: String,
    pub access_token: String,
    pub default: bool,
    pub active: bool,
    pub allow_insecure_connection: bool,
    pub deployment_count: u64,
}

impl ChartRepoDto {
    pub fn has_basic_auth(&self) -> bool {
        !self.user_name.is_empty() && !self.password.is_empty()
    }

    pub fn is_private(&self) -> bool {
        self.auth_mode != ChartRepoAuthMode::Anonymous
    }
}

/// Outcome of a chart repo validation. `custom_err_msg` is shown to the
/// user, `actual_err_msg` carries the underlying failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedErrorHelmRepoValidation {
    pub custom_err_msg: String,
    pub actual_err_msg: String,
}

impl DetailedErrorHelmRepoValidation {
    pub fn success() -> Self {
        Self {
            custom_err_msg: VALIDATION_SUCCESS_MSG.to_string(),
            actual_err_msg: String::new(),
        }
    }

    pub fn failure(custom: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            custom_err_msg: custom.into(),
            actual_err_msg: actual.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.custom_err_msg == VALIDATION_SUCCESS_MSG
    }
}
