use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Identifies an application that lives outside the platform's own
/// pipelines: a helm release or an Argo `Application`.
///
/// The string form is `<clusterId>|<namespace>|<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAppId {
    pub cluster_id: i32,
    pub namespace: String,
    pub name: String,
}

impl ExternalAppId {
    pub fn new(cluster_id: i32, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster_id,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(value: &str) -> anyhow::Result<Self> {
        value.parse()
    }
}

impl fmt::Display for ExternalAppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.cluster_id, self.namespace, self.name)
    }
}

impl FromStr for ExternalAppId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').collect();
        let [cluster_id, namespace, name] = parts.as_slice() else {
            return Err(anyhow!("malformed app id {s}"));
        };
        let cluster_id: i32 = cluster_id
            .parse()
            .map_err(|_| anyhow!("malformed app id {s}"))?;
        if cluster_id <= 0 {
            return Err(anyhow!("target cluster is not provided"));
        }
        Ok(Self {
            cluster_id,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reads_the_three_fields() {
        let id = ExternalAppId::decode("3|argocd|guestbook").unwrap();
        assert_eq!(id.cluster_id, 3);
        assert_eq!(id.namespace, "argocd");
        assert_eq!(id.name, "guestbook");
        assert_eq!(id.encode(), "3|argocd|guestbook");
    }

    #[test]
    fn decode_keeps_empty_namespace() {
        let id = ExternalAppId::decode("1||app").unwrap();
        assert_eq!(id.namespace, "");
    }

    #[test]
    fn decode_rejects_wrong_shapes() {
        for value in ["", "1|ns", "1|ns|app|extra", "abc|ns|app"] {
            let err = ExternalAppId::decode(value).unwrap_err();
            assert_eq!(err.to_string(), format!("malformed app id {value}"));
        }
    }

    #[test]
    fn decode_rejects_non_positive_cluster() {
        let err = ExternalAppId::decode("0|ns|app").unwrap_err();
        assert_eq!(err.to_string(), "target cluster is not provided");
        assert!(ExternalAppId::decode("-4|ns|app").is_err());
    }
}
