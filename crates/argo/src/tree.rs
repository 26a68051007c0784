//! Enriches an application resource tree with pod metadata.
//!
//! The tree only carries references. Manifests of the controllers, of one
//! pod per owner and of the relevant controller revisions are fetched
//! concurrently, then used to decide which replica sets and pods belong to
//! the current rollout and which containers every pod runs.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    time::Instant,
};

use devplane_common::tree::{
    ApplicationTree, PodMetadata, ResourceNode, ResourceRef, ResourceTreeResponse,
};
use futures::{stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    hash::pod_template_hash,
    manifest::{ManifestSource, MANIFEST_FETCH_TIMEOUT},
    value::{array_at, container_names, i64_at, label, name, str_at, value_at},
};

pub const POD_KIND: &str = "Pod";
pub const REPLICA_SET_KIND: &str = "ReplicaSet";
pub const DEPLOYMENT_KIND: &str = "Deployment";
pub const ROLLOUT_KIND: &str = "Rollout";
pub const STATEFUL_SET_KIND: &str = "StatefulSet";
pub const DAEMON_SET_KIND: &str = "DaemonSet";
pub const JOB_KIND: &str = "Job";
pub const CRON_JOB_KIND: &str = "CronJob";
pub const WORKFLOW_KIND: &str = "Workflow";
pub const CONTROLLER_REVISION_KIND: &str = "ControllerRevision";

/// Upper bound of manifest fetches in flight for one tree.
pub const MAX_CONCURRENT_FETCHES: usize = 16;

const CONTROLLER_REVISION_HASH_LABEL: &str = "controller-revision-hash";
const ROLLOUT_POD_TEMPLATE_HASH_LABEL: &str = "rollouts-pod-template-hash";

fn node_ref(node: &ResourceNode) -> ResourceRef {
    ResourceRef {
        group: node.group.clone(),
        version: node.version.clone(),
        kind: node.kind.clone(),
        namespace: node.namespace.clone(),
        name: node.name.clone(),
        uid: node.uid.clone(),
    }
}

#[derive(Default)]
struct Queue {
    refs: Vec<ResourceRef>,
    seen: HashSet<(String, String, String)>,
}

impl Queue {
    fn push(&mut self, node: &ResourceNode) {
        let key = (node.kind.clone(), node.namespace.clone(), node.name.clone());
        if self.seen.insert(key) {
            self.refs.push(node_ref(node));
        }
    }
}

/// Resources whose manifests are needed to build pod metadata.
pub fn manifest_queries(tree: &ApplicationTree) -> Vec<ResourceRef> {
    // owner name -> one pod it owns
    let mut pod_parents: BTreeMap<&str, &ResourceNode> = BTreeMap::new();
    for pod in tree.nodes_of_kind(POD_KIND) {
        for parent in &pod.parent_refs {
            pod_parents.insert(parent.name.as_str(), pod);
        }
    }

    let mut queue = Queue::default();
    let mut need_pods = false;
    for node in &tree.nodes {
        match node.kind.as_str() {
            ROLLOUT_KIND | DEPLOYMENT_KIND => queue.push(node),
            STATEFUL_SET_KIND | DAEMON_SET_KIND | JOB_KIND | CRON_JOB_KIND => {
                queue.push(node);
                need_pods = true;
            }
            WORKFLOW_KIND => need_pods = true,
            REPLICA_SET_KIND if pod_parents.contains_key(node.name.as_str()) => queue.push(node),
            _ => {}
        }
    }

    for pod in pod_parents.values() {
        queue.push(pod);
    }
    if need_pods {
        for pod in tree.nodes_of_kind(POD_KIND) {
            queue.push(pod);
        }
    }

    let relevant_revisions: HashSet<String> = tree
        .nodes_of_kind(POD_KIND)
        .filter(|pod| pod.networking_info.is_some())
        .map(|pod| {
            let prefix = pod
                .parent_of_kind(DAEMON_SET_KIND)
                .map(|p| p.name.as_str())
                .unwrap_or("");
            format!(
                "{prefix}-{}",
                pod.label(CONTROLLER_REVISION_HASH_LABEL).unwrap_or("")
            )
        })
        .collect();
    for revision in tree.nodes_of_kind(CONTROLLER_REVISION_KIND) {
        if relevant_revisions.contains(&revision.name) {
            queue.push(revision);
        }
    }

    queue.refs
}

/// Fetches every manifest, at most [`MAX_CONCURRENT_FETCHES`] at a time,
/// keeping the query order. Failed or timed out fetches are logged and left
/// out.
pub async fn fetch_manifests(
    source: &dyn ManifestSource,
    queries: Vec<ResourceRef>,
) -> Vec<(ResourceRef, Value)> {
    let fetches = queries.into_iter().map(|resource| async move {
        let started = Instant::now();
        let result = tokio::time::timeout(MANIFEST_FETCH_TIMEOUT, source.get_manifest(&resource)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(Ok(manifest)) => {
                debug!(
                    kind = resource.kind.as_str(),
                    name = resource.name.as_str(),
                    elapsed_ms,
                    "fetched manifest"
                );
                Some((resource, manifest))
            }
            Ok(Err(err)) => {
                warn!(
                    kind = resource.kind.as_str(),
                    namespace = resource.namespace.as_str(),
                    name = resource.name.as_str(),
                    elapsed_ms,
                    error = ?err,
                    "failed to fetch manifest"
                );
                None
            }
            Err(_) => {
                warn!(
                    kind = resource.kind.as_str(),
                    namespace = resource.namespace.as_str(),
                    name = resource.name.as_str(),
                    "manifest fetch timed out"
                );
                None
            }
        }
    });
    stream::iter(fetches)
        .buffered(MAX_CONCURRENT_FETCHES)
        .filter_map(|fetched| async move { fetched })
        .collect()
        .await
}

#[derive(Default)]
struct Manifests {
    rollouts: Vec<Value>,
    deployments: Vec<Value>,
    stateful_sets: Vec<Value>,
    daemon_sets: Vec<Value>,
    replica_sets: Vec<Value>,
    pods: Vec<Value>,
    controller_revisions: Vec<Value>,
    jobs: Vec<Value>,
}

impl Manifests {
    fn group(fetched: Vec<(ResourceRef, Value)>) -> Self {
        let mut manifests = Self::default();
        for (resource, manifest) in fetched {
            let bucket = match resource.kind.as_str() {
                ROLLOUT_KIND => &mut manifests.rollouts,
                DEPLOYMENT_KIND => &mut manifests.deployments,
                STATEFUL_SET_KIND => &mut manifests.stateful_sets,
                DAEMON_SET_KIND => &mut manifests.daemon_sets,
                REPLICA_SET_KIND => &mut manifests.replica_sets,
                POD_KIND => &mut manifests.pods,
                CONTROLLER_REVISION_KIND => &mut manifests.controller_revisions,
                JOB_KIND => &mut manifests.jobs,
                _ => continue,
            };
            bucket.push(manifest);
        }
        manifests
    }
}

/// The replica set whose `rollouts-pod-template-hash` label equals the
/// rollout's `status.currentPodHash`.
pub fn rollout_new_replica_set(rollout: &Value, replica_sets: &[Value]) -> Option<String> {
    let current = str_at(rollout, &["status", "currentPodHash"]);
    if current.is_empty() {
        return None;
    }
    replica_sets
        .iter()
        .rev()
        .find(|rs| label(rs, ROLLOUT_POD_TEMPLATE_HASH_LABEL) == current)
        .map(|rs| name(rs).to_string())
}

/// The replica set running the deployment's current pod template.
pub fn deployment_new_replica_set(deployment: &Value, replica_sets: &[Value]) -> Option<String> {
    let template = value_at(deployment, &["spec", "template"])?;
    let collision_count = i64_at(deployment, &["status", "collisionCount"]);
    let current = pod_template_hash(template, collision_count);
    replica_sets
        .iter()
        .rev()
        .find(|rs| {
            value_at(rs, &["spec", "template"])
                .map(|t| pod_template_hash(t, collision_count) == current)
                .unwrap_or(false)
        })
        .map(|rs| name(rs).to_string())
}

pub fn stateful_set_new_pods(stateful_set: &Value, pods: &[Value]) -> HashSet<String> {
    let update_revision = str_at(stateful_set, &["status", "updateRevision"]);
    if update_revision.is_empty() {
        return HashSet::new();
    }
    pods.iter()
        .filter(|pod| label(pod, CONTROLLER_REVISION_HASH_LABEL) == update_revision)
        .map(|pod| name(pod).to_string())
        .collect()
}

fn owned_by(object: &Value, kind: &str, owner: &str) -> bool {
    let owners = array_at(object, &["metadata", "ownerReferences"]);
    owners.is_empty()
        || owners
            .iter()
            .any(|o| str_at(o, &["kind"]) == kind && str_at(o, &["name"]) == owner)
}

/// Pods carrying the hash of the daemon set's highest controller revision.
pub fn daemon_set_new_pods(
    daemon_set: &Value,
    controller_revisions: &[Value],
    pods: &[Value],
) -> HashSet<String> {
    let daemon_set_name = name(daemon_set);
    let mut latest_generation = 0;
    let mut latest_hash = "";
    for revision in controller_revisions
        .iter()
        .filter(|cr| owned_by(cr, DAEMON_SET_KIND, daemon_set_name))
    {
        let generation = i64_at(revision, &["revision"]).unwrap_or(0);
        if generation > latest_generation {
            latest_generation = generation;
            latest_hash = label(revision, CONTROLLER_REVISION_HASH_LABEL);
        }
    }
    if latest_hash.is_empty() {
        return HashSet::new();
    }
    pods.iter()
        .filter(|pod| label(pod, CONTROLLER_REVISION_HASH_LABEL) == latest_hash)
        .map(|pod| name(pod).to_string())
        .collect()
}

/// Every pod of a job counts as new.
pub fn job_new_pods(pods: &[Value]) -> HashSet<String> {
    pods.iter().map(|pod| name(pod).to_string()).collect()
}

/// Pods named after one of the tree's workflows.
pub fn workflow_new_pods(tree: &ApplicationTree) -> HashSet<String> {
    let workflows: Vec<&str> = tree
        .nodes_of_kind(WORKFLOW_KIND)
        .map(|n| n.name.as_str())
        .collect();
    tree.nodes_of_kind(POD_KIND)
        .filter(|pod| workflows.iter().any(|w| pod.name.starts_with(w)))
        .map(|pod| pod.name.clone())
        .collect()
}

/// Metadata of every tree pod owned by a replica set, with containers read
/// from the replica set template. Also returns the pod -> replica set
/// mapping.
fn pod_metadata_from_replica_sets(
    tree: &ApplicationTree,
    new_replica_sets: &HashSet<String>,
    replica_sets: &[Value],
) -> (Vec<PodMetadata>, HashMap<String, String>) {
    let by_name: HashMap<&str, &Value> = replica_sets.iter().map(|rs| (name(rs), rs)).collect();
    let mut metadata = Vec::new();
    let mut pod_to_replica_set = HashMap::new();
    for pod in tree.nodes_of_kind(POD_KIND) {
        let Some(parent) = pod.parent_of_kind(REPLICA_SET_KIND) else {
            continue;
        };
        let (containers, init_containers) = by_name
            .get(parent.name.as_str())
            .and_then(|rs| value_at(rs, &["spec", "template", "spec"]))
            .map(container_names)
            .unwrap_or_default();
        pod_to_replica_set.insert(pod.name.clone(), parent.name.clone());
        metadata.push(PodMetadata {
            name: pod.name.clone(),
            uid: pod.uid.clone(),
            containers,
            init_containers,
            is_new: new_replica_sets.contains(&parent.name),
        });
    }
    (metadata, pod_to_replica_set)
}

/// Pod metadata read from the pod's own manifest. Container lists are `None`
/// when the manifest wasn't fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodManifestMetadata {
    pub name: String,
    pub uid: String,
    pub containers: Option<Vec<String>>,
    pub init_containers: Option<Vec<String>>,
    pub is_new: bool,
}

fn pod_metadata_from_pods(
    tree: &ApplicationTree,
    pods: &[Value],
    new_pods: &HashSet<String>,
) -> Vec<PodManifestMetadata> {
    let by_name: HashMap<&str, &Value> = pods.iter().map(|p| (name(p), p)).collect();
    tree.nodes_of_kind(POD_KIND)
        .map(|pod| {
            let (containers, init_containers) = match by_name
                .get(pod.name.as_str())
                .and_then(|p| value_at(p, &["spec"]))
            {
                Some(spec) => {
                    let (c, i) = container_names(spec);
                    (Some(c), Some(i))
                }
                None => (None, None),
            };
            PodManifestMetadata {
                name: pod.name.clone(),
                uid: pod.uid.clone(),
                containers,
                init_containers,
                is_new: new_pods.contains(&pod.name),
            }
        })
        .collect()
}

/// Merges pod-manifest metadata into the replica set derived list.
///
/// Pods without a replica set owner are appended. For owned pods whose
/// manifest was fetched, the containers read from it are copied to every pod
/// of the same replica set, since only one pod per owner is fetched.
pub fn merge_duplicate_pods(
    from_pods: Vec<PodManifestMetadata>,
    pod_to_replica_set: &HashMap<String, String>,
    mut metadata: Vec<PodMetadata>,
) -> Vec<PodMetadata> {
    let mut containers: HashMap<String, Vec<String>> = HashMap::new();
    let mut init_containers: HashMap<String, Vec<String>> = HashMap::new();

    for pod in from_pods {
        let Some(owner) = pod_to_replica_set.get(&pod.name) else {
            metadata.push(PodMetadata {
                name: pod.name,
                uid: pod.uid,
                containers: pod.containers.unwrap_or_default(),
                init_containers: pod.init_containers.unwrap_or_default(),
                is_new: pod.is_new,
            });
            continue;
        };
        let siblings = pod_to_replica_set
            .iter()
            .filter(|(_, rs)| *rs == owner)
            .map(|(name, _)| name);
        if let Some(list) = &pod.containers {
            for sibling in siblings.clone() {
                containers.insert(sibling.clone(), list.clone());
            }
        }
        if let Some(list) = &pod.init_containers {
            for sibling in siblings {
                init_containers.insert(sibling.clone(), list.clone());
            }
        }
    }

    for pod in &mut metadata {
        if let Some(list) = containers.remove(&pod.name) {
            pod.containers = list;
        }
        if let Some(list) = init_containers.remove(&pod.name) {
            pod.init_containers = list;
        }
    }
    metadata
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodInsights {
    pub new_generation_replica_sets: Vec<String>,
    pub pod_metadata: Vec<PodMetadata>,
}

pub fn pod_insights(tree: &ApplicationTree, fetched: Vec<(ResourceRef, Value)>) -> PodInsights {
    let manifests = Manifests::group(fetched);

    let mut new_replica_sets: Vec<String> = Vec::new();
    let candidates = manifests
        .rollouts
        .iter()
        .map(|r| rollout_new_replica_set(r, &manifests.replica_sets))
        .chain(
            manifests
                .deployments
                .iter()
                .map(|d| deployment_new_replica_set(d, &manifests.replica_sets)),
        );
    for rs in candidates.flatten() {
        if !new_replica_sets.contains(&rs) {
            new_replica_sets.push(rs);
        }
    }

    let mut new_pods = workflow_new_pods(tree);
    for stateful_set in &manifests.stateful_sets {
        new_pods.extend(stateful_set_new_pods(stateful_set, &manifests.pods));
    }
    for daemon_set in &manifests.daemon_sets {
        new_pods.extend(daemon_set_new_pods(
            daemon_set,
            &manifests.controller_revisions,
            &manifests.pods,
        ));
    }
    if !manifests.jobs.is_empty() {
        new_pods.extend(job_new_pods(&manifests.pods));
    }

    let (from_replica_sets, pod_to_replica_set) = if new_replica_sets.is_empty() {
        (Vec::new(), HashMap::new())
    } else {
        let new_set: HashSet<String> = new_replica_sets.iter().cloned().collect();
        pod_metadata_from_replica_sets(tree, &new_set, &manifests.replica_sets)
    };
    let from_pods = pod_metadata_from_pods(tree, &manifests.pods, &new_pods);
    let pod_metadata = merge_duplicate_pods(from_pods, &pod_to_replica_set, from_replica_sets);

    PodInsights {
        new_generation_replica_sets: new_replica_sets,
        pod_metadata,
    }
}

/// Fetches the manifests `tree` needs from `source` and attaches pod
/// metadata and the current replica sets.
pub async fn enrich_tree(source: &dyn ManifestSource, tree: ApplicationTree) -> ResourceTreeResponse {
    let queries = manifest_queries(&tree);
    let queued = queries.len();
    let fetched = fetch_manifests(source, queries).await;
    debug!(queued, received = fetched.len(), "resource tree manifests fetched");
    let insights = pod_insights(&tree, fetched);
    ResourceTreeResponse {
        tree,
        new_generation_replica_sets: insights.new_generation_replica_sets,
        pod_metadata: insights.pod_metadata,
        ..Default::default()
    }
}
