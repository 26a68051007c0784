pub mod argocd;
pub mod error;
pub mod helm_app;
