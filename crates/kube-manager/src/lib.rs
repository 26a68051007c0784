pub mod argocd_repo;
pub mod chart_sync;
pub mod client;
pub mod events;
pub mod informer;
pub mod kubeconfig;
pub mod namespace;
pub mod prober;
