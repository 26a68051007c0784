use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use devplane_common::cluster::ClusterBean;
use futures::{pin_mut, TryStreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    runtime::watcher::{self, watcher, Error as WatcherError, Event},
    Api, ResourceExt,
};
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::client::{build_watch_client, LIVEZ_TIMEOUT};

/// Server side timeout of one watch call. The watcher relists after it.
const WATCH_TIMEOUT_SECS: u32 = 300;
/// Reads on the watch connection may block until the server ends the watch.
const WATCH_READ_TIMEOUT: Duration = Duration::from_secs(WATCH_TIMEOUT_SECS as u64 + 30);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub type NamespaceMap = HashMap<String, HashSet<String>>;

/// Keeps one namespace watcher per cluster and the latest namespace set of
/// each, keyed by cluster name.
#[derive(Clone, Default)]
pub struct NamespaceInformerFactory {
    namespaces: Arc<Mutex<NamespaceMap>>,
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    timeout: Option<Duration>,
}

impl NamespaceInformerFactory {
    pub fn new(client_timeout: Duration) -> Self {
        Self {
            timeout: Some(client_timeout),
            ..Default::default()
        }
    }

    /// Starts a watcher for every active, non-virtual cluster that doesn't
    /// have one yet. A cluster whose client can't be built is skipped.
    pub fn build_informer(&self, clusters: &[ClusterBean]) {
        for cluster in clusters {
            if !cluster.active || cluster.is_virtual_cluster {
                continue;
            }
            if let Err(err) = self.start_cluster(cluster) {
                warn!(
                    cluster_id = cluster.id,
                    cluster_name = cluster.cluster_name.as_str(),
                    error = ?err,
                    "failed to build namespace informer"
                );
            }
        }
    }

    /// Stops the watcher of `cluster_name` and forgets its namespaces.
    pub fn clean_namespace_informer(&self, cluster_name: &str) {
        if let Some(handle) = self.tasks.lock().remove(cluster_name) {
            handle.abort();
            debug!(cluster_name, "stopped namespace informer");
        }
        self.namespaces.lock().remove(cluster_name);
    }

    /// Clean then build, used after a cluster's connection changed.
    pub fn rebuild(&self, cluster: &ClusterBean) {
        self.clean_namespace_informer(&cluster.cluster_name);
        self.build_informer(std::slice::from_ref(cluster));
    }

    pub fn is_watching(&self, cluster_name: &str) -> bool {
        self.tasks.lock().contains_key(cluster_name)
    }

    /// A deep copy of the namespace map.
    pub fn snapshot(&self) -> NamespaceMap {
        self.namespaces.lock().clone()
    }

    /// Sorted namespaces of one cluster, empty when nothing was observed yet.
    pub fn namespaces_of(&self, cluster_name: &str) -> Vec<String> {
        let mut namespaces: Vec<String> = self
            .namespaces
            .lock()
            .get(cluster_name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        namespaces.sort();
        namespaces
    }

    fn watch_client(&self, cluster: &ClusterBean) -> Result<kube::Client> {
        build_watch_client(
            &cluster.connection_config(),
            self.timeout.unwrap_or(LIVEZ_TIMEOUT),
            WATCH_READ_TIMEOUT,
        )
    }

    fn start_cluster(&self, cluster: &ClusterBean) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&cluster.cluster_name) {
            return Ok(());
        }

        let client = self.watch_client(cluster)?;
        let namespaces = self.namespaces.clone();
        let cluster_name = cluster.cluster_name.clone();

        let handle = tokio::spawn(async move {
            info!(
                cluster_name = cluster_name.as_str(),
                "starting namespace informer"
            );
            let mut backoff = Duration::from_secs(1);
            loop {
                match watch_namespaces(client.clone(), &namespaces, &cluster_name).await {
                    Ok(()) => {
                        debug!(
                            cluster_name = cluster_name.as_str(),
                            "namespace watch ended, restarting"
                        );
                        backoff = Duration::from_secs(1);
                    }
                    Err(err) => {
                        warn!(
                            cluster_name = cluster_name.as_str(),
                            error = ?err,
                            "namespace watch failed, restarting with backoff"
                        );
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        });

        tasks.insert(cluster.cluster_name.clone(), handle);
        Ok(())
    }
}

async fn watch_namespaces(
    client: kube::Client,
    namespaces: &Mutex<NamespaceMap>,
    cluster_name: &str,
) -> Result<()> {
    let api: Api<Namespace> = Api::all(client);
    let stream = watcher(api, watcher::Config::default().timeout(WATCH_TIMEOUT_SECS));
    pin_mut!(stream);

    let mut relist: Option<HashSet<String>> = None;
    while let Some(event) = stream.try_next().await.map_err(map_watcher_error)? {
        apply_event(namespaces, cluster_name, &mut relist, event);
    }
    Ok(())
}

/// Folds one watch event into the map. A relist (`Init` .. `InitDone`) is
/// collected aside and swapped in whole once complete.
pub(crate) fn apply_event(
    namespaces: &Mutex<NamespaceMap>,
    cluster_name: &str,
    relist: &mut Option<HashSet<String>>,
    event: Event<Namespace>,
) {
    match event {
        Event::Apply(ns) => {
            namespaces
                .lock()
                .entry(cluster_name.to_string())
                .or_default()
                .insert(ns.name_any());
        }
        Event::Delete(ns) => {
            if let Some(set) = namespaces.lock().get_mut(cluster_name) {
                set.remove(&ns.name_any());
            }
        }
        Event::Init => {
            *relist = Some(HashSet::new());
        }
        Event::InitApply(ns) => {
            relist.get_or_insert_with(HashSet::new).insert(ns.name_any());
        }
        Event::InitDone => {
            let set = relist.take().unwrap_or_default();
            debug!(
                cluster_name,
                count = set.len(),
                "namespace informer synced"
            );
            namespaces.lock().insert(cluster_name.to_string(), set);
        }
    }
}

fn map_watcher_error(err: WatcherError) -> anyhow::Error {
    match err {
        WatcherError::InitialListFailed(source) => anyhow!("initial list request failed: {source}"),
        WatcherError::WatchStartFailed(source) => anyhow!("failed to start watcher: {source}"),
        WatcherError::WatchError(source) => anyhow!("watch error from API server: {source}"),
        WatcherError::WatchFailed(source) => anyhow!("watch stream failed: {source}"),
        WatcherError::NoResourceVersion => anyhow!("watch event missing resourceVersion"),
    }
}
