pub mod api;
mod convert;

pub use convert::{chart_repo_dto, cluster_bean, environment_bean};

#[cfg(test)]
mod tests;
