use crate::{MAX_ERROR_LEN, UNABLE_TO_CONNECT_ERROR};

/// Error strings coming back from a cluster can carry TLS material or tokens,
/// anything longer than [`MAX_ERROR_LEN`] is replaced with a generic message.
pub fn bounded_error(msg: impl Into<String>) -> String {
    let msg = msg.into();
    if msg.chars().count() > MAX_ERROR_LEN {
        UNABLE_TO_CONNECT_ERROR.to_string()
    } else {
        msg
    }
}

/// Url of the helm repository index for a repo url.
pub fn chart_repo_index_url(repo_url: &str) -> String {
    format!("{}/index.yaml", repo_url.trim_end_matches('/'))
}

pub fn contains_whitespace(s: &str) -> bool {
    s.chars().any(char::is_whitespace)
}
