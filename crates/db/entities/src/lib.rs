pub mod chart_repo;
pub mod cluster;
pub mod config;
pub mod environment;
pub mod helm_release;
