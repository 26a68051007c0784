pub mod app_id;
pub mod argo;
pub mod chart_repo;
pub mod cluster;
pub mod environment;
pub mod helm;
pub mod tree;
pub mod utils;

pub use utils::bounded_error;

/// The cluster the platform itself runs in. It can't be renamed, modified or
/// deleted through the API.
pub const DEFAULT_CLUSTER: &str = "default_cluster";

/// Conventional in-cluster API server address used by Argo CD for its own
/// cluster.
pub const DEFAULT_CLUSTER_URL: &str = "https://kubernetes.default.svc";

pub const HOST_URL_CONFIG_KEY: &str = "hostUrl";

pub const MAX_ERROR_LEN: usize = 2000;
pub const UNABLE_TO_CONNECT_ERROR: &str = "unable to connect to cluster";
