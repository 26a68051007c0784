use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRef {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthStatus {
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkingInfo {
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub target_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceNode {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub parent_refs: Vec<ResourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networking_info: Option<NetworkingInfo>,
    pub resource_version: String,
}

impl ResourceNode {
    pub fn parent_of_kind(&self, kind: &str) -> Option<&ResourceRef> {
        self.parent_refs.iter().rev().find(|p| p.kind == kind)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.networking_info
            .as_ref()
            .and_then(|info| info.labels.get(key))
            .map(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationTree {
    pub nodes: Vec<ResourceNode>,
}

impl ApplicationTree {
    pub fn nodes_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodMetadata {
    pub name: String,
    pub uid: String,
    pub containers: Vec<String>,
    pub init_containers: Vec<String>,
    pub is_new: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

pub const SHARED_RESOURCE_WARNING: &str = "SharedResourceWarning";

/// Resource tree of an application, enriched with pod metadata and the
/// application-level status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceTreeResponse {
    #[serde(flatten)]
    pub tree: ApplicationTree,
    pub new_generation_replica_sets: Vec<String>,
    pub status: String,
    pub pod_metadata: Vec<PodMetadata>,
    pub conditions: Vec<ApplicationCondition>,
    pub resources_sync_result_map: HashMap<String, String>,
    pub revision_hash: String,
}
