use std::time::Duration;

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error};

use crate::controller::Controller;

pub const DEFAULT_CLUSTER_STATUS_CRON_MINUTES: u64 = 15;

/// Probes every registered cluster once right away, then every `every`.
pub fn spawn_probe_scheduler(controller: Controller, every: Duration) -> ProbeSchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    debug!("probing cluster connections");
                    if let Err(err) = controller.probe_all_clusters().await {
                        error!(error = ?err, "cluster connection probe failed");
                    }
                }
            }
        }
    });

    ProbeSchedulerHandle {
        shutdown: Some(shutdown_tx),
        task,
    }
}

pub struct ProbeSchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ProbeSchedulerHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use devplane_common::cluster::virtual_cluster_error;

    use super::*;
    use crate::controller::tests::{cluster, harness};

    #[tokio::test]
    async fn first_probe_runs_at_startup() {
        let h = harness().await;
        let mut isolated = cluster("isolated");
        isolated.is_virtual_cluster = true;
        let isolated = h.controller.create_cluster(isolated, 1).await.unwrap();

        let handle = spawn_probe_scheduler(h.controller.clone(), Duration::from_secs(3600));
        let mut probed = String::new();
        for _ in 0..50 {
            probed = h
                .controller
                .find_cluster_by_id(isolated.id)
                .await
                .unwrap()
                .error_in_connecting;
            if !probed.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.stop().await;
        assert_eq!(probed, virtual_cluster_error("isolated"));
    }
}
