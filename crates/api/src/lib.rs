pub mod argo_app;
pub mod chart_repo;
pub mod cluster;
pub mod cluster_access;
pub mod controller;
pub mod environment;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod webhook_helm;
