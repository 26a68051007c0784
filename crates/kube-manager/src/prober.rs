use std::{panic::AssertUnwindSafe, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use devplane_common::{
    bounded_error,
    cluster::{virtual_cluster_error, ClusterBean, ClusterConnectionConfig},
};
use futures::{stream, FutureExt, StreamExt};
use tracing::{debug, error, warn};

use crate::client::{check_livez, LIVEZ_TIMEOUT};

/// Upper bound of probes in flight at once.
pub const MAX_CONCURRENT_PROBES: usize = 16;

#[cfg(test)]
use mockall::automock;

/// Reachability check of a single cluster. `Err` carries the message that
/// ends up in `errorInConnecting`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterConnectivity: Send + Sync {
    async fn livez(&self, conn: &ClusterConnectionConfig) -> Result<(), String>;
}

/// Where probe results of already persisted clusters are written.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectionStatusStore: Send + Sync {
    async fn set_connection_error(&self, cluster_id: i32, error: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct LivezConnectivity {
    timeout: Duration,
}

impl LivezConnectivity {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LivezConnectivity {
    fn default() -> Self {
        Self::new(LIVEZ_TIMEOUT)
    }
}

#[async_trait]
impl ClusterConnectivity for LivezConnectivity {
    async fn livez(&self, conn: &ClusterConnectionConfig) -> Result<(), String> {
        check_livez(conn, self.timeout).await
    }
}

/// Probes the clusters of the batch concurrently, at most
/// [`MAX_CONCURRENT_PROBES`] at a time, and returns the connection
/// error of each one, keyed by its position in `clusters`. An empty string
/// means the cluster answered.
pub async fn probe_clusters(
    checker: &dyn ClusterConnectivity,
    clusters: &[ClusterBean],
) -> DashMap<usize, String> {
    let results = DashMap::new();
    let probes = clusters.iter().enumerate().map(|(i, cluster)| {
        let results = &results;
        async move {
            if cluster.is_virtual_cluster {
                results.insert(i, virtual_cluster_error(&cluster.cluster_name));
                return;
            }
            let conn = cluster.connection_config();
            let err = match checker.livez(&conn).await {
                Ok(()) => String::new(),
                Err(e) => {
                    debug!(
                        cluster_id = cluster.id,
                        cluster_name = cluster.cluster_name.as_str(),
                        error = e.as_str(),
                        "cluster probe failed"
                    );
                    bounded_error(e)
                }
            };
            results.insert(i, err);
        }
    }).collect::<Vec<_>>();
    stream::iter(probes)
        .buffer_unordered(MAX_CONCURRENT_PROBES)
        .collect::<Vec<()>>()
        .await;
    results
}

/// Writes the probe results of persisted clusters. A failing or panicking
/// write is logged and doesn't stop the remaining ones.
pub async fn persist_probe_results(
    store: &dyn ConnectionStatusStore,
    clusters: &[ClusterBean],
    results: &DashMap<usize, String>,
) {
    for (i, cluster) in clusters.iter().enumerate() {
        let Some(err) = results.get(&i).map(|e| e.value().clone()) else {
            continue;
        };
        let write = AssertUnwindSafe(store.set_connection_error(cluster.id, &err));
        match write.catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(
                    cluster_id = cluster.id,
                    error = ?e,
                    "failed to store cluster connection status"
                );
            }
            Err(_) => {
                error!(
                    cluster_id = cluster.id,
                    "panic while storing cluster connection status"
                );
            }
        }
    }
}

/// Copies the probe results onto clusters that aren't persisted yet, like
/// the ones parsed out of a kubeconfig.
pub fn apply_probe_results(clusters: &mut [ClusterBean], results: &DashMap<usize, String>) {
    for (i, cluster) in clusters.iter_mut().enumerate() {
        match results.get(&i) {
            Some(err) => cluster.error_in_connecting = err.value().clone(),
            None => warn!(
                cluster_name = cluster.cluster_name.as_str(),
                "no probe result for cluster"
            ),
        }
    }
}

/// Probes and persists a batch of registered clusters.
pub async fn probe_and_persist(
    checker: &dyn ClusterConnectivity,
    store: &dyn ConnectionStatusStore,
    clusters: &[ClusterBean],
) {
    let results = probe_clusters(checker, clusters).await;
    persist_probe_results(store, clusters, &results).await;
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Instant,
    };

    use devplane_common::{cluster::BEARER_TOKEN, UNABLE_TO_CONNECT_ERROR};

    use super::*;

    fn cluster(id: i32, name: &str) -> ClusterBean {
        ClusterBean {
            id,
            cluster_name: name.to_string(),
            server_url: format!("https://{name}:6443"),
            active: true,
            config: [(BEARER_TOKEN.to_string(), "t".to_string())].into(),
            ..Default::default()
        }
    }

    struct SlowChecker;

    #[async_trait]
    impl ClusterConnectivity for SlowChecker {
        async fn livez(&self, conn: &ClusterConnectionConfig) -> Result<(), String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if conn.cluster_name == "down" {
                Err("Incorrect server url : connection refused".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<(i32, String)>>,
    }

    #[async_trait]
    impl ConnectionStatusStore for RecordingStore {
        async fn set_connection_error(&self, cluster_id: i32, error: &str) -> anyhow::Result<()> {
            if cluster_id == 2 {
                panic!("store blew up");
            }
            self.writes
                .lock()
                .unwrap()
                .push((cluster_id, error.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn virtual_clusters_get_sentinel_and_are_never_probed() {
        let mut checker = MockClusterConnectivity::new();
        checker.expect_livez().times(1).returning(|_| Ok(()));

        let mut edge = cluster(2, "edge");
        edge.is_virtual_cluster = true;
        let clusters = vec![cluster(1, "prod"), edge];

        let results = probe_clusters(&checker, &clusters).await;
        assert_eq!(results.get(&0).unwrap().as_str(), "");
        assert_eq!(
            results.get(&1).unwrap().as_str(),
            "virtual cluster 'edge' error: connection not setup for isolated clusters"
        );
    }

    #[tokio::test]
    async fn probes_run_concurrently() {
        let clusters: Vec<_> = (1..=5)
            .map(|i| cluster(i, if i == 3 { "down" } else { "up" }))
            .collect();
        let start = Instant::now();
        let results = probe_clusters(&SlowChecker, &clusters).await;
        assert!(start.elapsed() < Duration::from_millis(900));
        assert_eq!(results.len(), 5);
        assert_eq!(
            results.get(&2).unwrap().as_str(),
            "Incorrect server url : connection refused"
        );
    }

    #[derive(Default)]
    struct CountingChecker {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ClusterConnectivity for CountingChecker {
        async fn livez(&self, _conn: &ClusterConnectionConfig) -> Result<(), String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn probes_in_flight_are_bounded() {
        let clusters: Vec<_> = (1..=40).map(|i| cluster(i, "up")).collect();
        let checker = CountingChecker::default();
        let results = probe_clusters(&checker, &clusters).await;
        assert_eq!(results.len(), 40);
        let peak = checker.peak.load(Ordering::SeqCst);
        assert!(peak > 1);
        assert!(peak <= MAX_CONCURRENT_PROBES);
    }

    #[tokio::test]
    async fn long_errors_are_collapsed() {
        let mut checker = MockClusterConnectivity::new();
        checker
            .expect_livez()
            .returning(|_| Err("x".repeat(5000)));
        let results = probe_clusters(&checker, &[cluster(1, "prod")]).await;
        assert_eq!(results.get(&0).unwrap().as_str(), UNABLE_TO_CONNECT_ERROR);
    }

    #[tokio::test]
    async fn panicking_write_does_not_stop_the_others() {
        let clusters = vec![cluster(1, "a"), cluster(2, "b"), cluster(3, "c")];
        let results = DashMap::new();
        results.insert(0, String::new());
        results.insert(1, "refused".to_string());
        results.insert(2, "timeout".to_string());

        let store = Arc::new(RecordingStore::default());
        persist_probe_results(store.as_ref(), &clusters, &results).await;

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![(1, String::new()), (3, "timeout".to_string())]
        );
    }

    #[test]
    fn results_are_applied_by_position() {
        let mut clusters = vec![cluster(0, "a"), cluster(0, "b")];
        let results = DashMap::new();
        results.insert(1, "refused".to_string());
        results.insert(0, String::new());
        apply_probe_results(&mut clusters, &results);
        assert_eq!(clusters[0].error_in_connecting, "");
        assert_eq!(clusters[1].error_in_connecting, "refused");
    }
}
