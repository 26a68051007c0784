use std::collections::{BTreeMap, HashMap};

use devplane_common::{cluster::BEARER_TOKEN, tree::ResourceTreeResponse};
use serde_json::json;

use super::*;
use crate::{
    lookup::MockClusterLookup,
    provider::MockResourceTreeProvider,
    resolver::{ClusterSecretSource, MockClusterSecretSource},
};

fn cluster(id: i32, server_url: &str) -> ClusterBean {
    ClusterBean {
        id,
        cluster_name: format!("cluster-{id}"),
        server_url: server_url.to_string(),
        active: true,
        config: HashMap::from([(BEARER_TOKEN.to_string(), format!("token-{id}"))]),
        ..Default::default()
    }
}

fn application(destination: &str) -> Value {
    json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "Application",
        "metadata": {"name": "guestbook", "namespace": "argocd"},
        "spec": {"destination": {"server": destination, "namespace": "web"}},
        "status": {
            "health": {"status": "Healthy"},
            "sync": {"status": "Synced", "revision": "abc123"},
            "resources": [
                {"group": "apps", "version": "v1", "kind": "Deployment", "namespace": "web", "name": "guestbook"},
                {"version": "v1", "kind": "Service", "namespace": "web", "name": "guestbook"}
            ]
        }
    })
}

fn lookup(clusters: Vec<ClusterBean>) -> Arc<MockClusterLookup> {
    let mut lookup = MockClusterLookup::new();
    let by_id = clusters.clone();
    lookup
        .expect_get_cluster()
        .returning(move |id| Ok(by_id.iter().find(|c| c.id == id).cloned()));
    let active = clusters.clone();
    lookup
        .expect_active_clusters()
        .returning(move || Ok(active.clone()));
    lookup
        .expect_clusters_by_ids()
        .returning(move |ids| Ok(clusters.iter().filter(|c| ids.contains(&c.id)).cloned().collect()));
    Arc::new(lookup)
}

fn secrets(found: Vec<BTreeMap<String, String>>) -> Arc<dyn ClusterSecretSource> {
    let mut secrets = MockClusterSecretSource::new();
    secrets
        .expect_cluster_secrets()
        .returning(move |_| Ok(found.clone()));
    Arc::new(secrets)
}

fn applications_returning(app: Option<Value>) -> Arc<MockArgoApplicationApi> {
    let mut api = MockArgoApplicationApi::new();
    api.expect_get_application()
        .withf(|_, namespace, name| namespace == "argocd" && name == "guestbook")
        .returning(move |_, _, _| Ok(app.clone()));
    Arc::new(api)
}

fn no_trees() -> Arc<MockResourceTreeProvider> {
    let mut trees = MockResourceTreeProvider::new();
    trees.expect_resource_tree().never();
    Arc::new(trees)
}

fn locator(
    clusters: Vec<ClusterBean>,
    applications: Arc<dyn ArgoApplicationApi>,
    found_secrets: Vec<BTreeMap<String, String>>,
    trees: Arc<dyn ResourceTreeProvider>,
) -> ArgoAppLocator {
    let lookup = lookup(clusters);
    let resolver = DestinationResolver::new(lookup.clone(), secrets(found_secrets));
    ArgoAppLocator::new(lookup, applications, resolver, trees)
}

#[test]
fn managed_resources_reads_application_status() {
    let managed = managed_resources(&application("https://kubernetes.default.svc"));
    assert_eq!(managed.health_status, "Healthy");
    assert_eq!(managed.sync_status, "Synced");
    assert_eq!(managed.destination_server, "https://kubernetes.default.svc");
    assert_eq!(managed.resources.len(), 2);
    assert_eq!(managed.resources[0].group, "apps");
    assert_eq!(managed.resources[1].group, "");
    assert_eq!(managed.resources[1].kind, "Service");
}

#[tokio::test]
async fn in_cluster_application_gets_resource_tree() {
    let mut trees = MockResourceTreeProvider::new();
    trees
        .expect_resource_tree()
        .withf(|req| {
            req.app_name == "guestbook"
                && req.app_namespace == "argocd"
                && req.destination.cluster_id == 1
                && req.resources.len() == 2
        })
        .times(1)
        .returning(|_| {
            Ok(ResourceTreeResponse {
                status: "Healthy".to_string(),
                revision_hash: "abc123".to_string(),
                ..Default::default()
            })
        });
    let locator = locator(
        vec![cluster(1, "https://10.0.0.1")],
        applications_returning(Some(application("https://kubernetes.default.svc"))),
        vec![],
        Arc::new(trees),
    );

    let detail = locator.get_app_detail("guestbook", "argocd", 1).await.unwrap();
    assert_eq!(detail.cluster_name, "cluster-1");
    assert_eq!(detail.app_status, "Healthy");
    assert_eq!(detail.sync_status, "Synced");
    let tree = detail.resource_tree.unwrap();
    assert_eq!(tree.revision_hash, "abc123");
    assert_eq!(
        detail.manifest.unwrap()["metadata"]["name"],
        json!("guestbook")
    );
}

#[tokio::test]
async fn unknown_destination_returns_manifest_without_tree() {
    let locator = locator(
        vec![cluster(1, "https://10.0.0.1")],
        applications_returning(Some(application("https://edge.example.com"))),
        vec![],
        no_trees(),
    );

    let detail = locator.get_app_detail("guestbook", "argocd", 1).await.unwrap();
    assert!(detail.resource_tree.is_none());
    assert!(detail.manifest.is_some());
    assert_eq!(detail.destination_server, "https://edge.example.com");
}

#[tokio::test]
async fn destination_from_argocd_secret_gets_resource_tree() {
    let mut trees = MockResourceTreeProvider::new();
    trees
        .expect_resource_tree()
        .withf(|req| {
            req.destination.cluster_id == 0
                && req.destination.connection.server_url == "https://edge.example.com"
                && req.destination.connection.bearer_token.as_deref() == Some("edge-token")
        })
        .times(1)
        .returning(|_| Ok(ResourceTreeResponse::default()));
    let locator = locator(
        vec![cluster(1, "https://10.0.0.1")],
        applications_returning(Some(application("https://edge.example.com"))),
        vec![BTreeMap::from([
            ("server".to_string(), "https://edge.example.com".to_string()),
            (
                "config".to_string(),
                r#"{"bearerToken":"edge-token","tlsClientConfig":{"insecure":true}}"#.to_string(),
            ),
        ])],
        Arc::new(trees),
    );

    let detail = locator.get_app_detail("guestbook", "argocd", 1).await.unwrap();
    assert!(detail.resource_tree.is_some());
}

#[tokio::test]
async fn virtual_cluster_returns_bare_detail() {
    let mut api = MockArgoApplicationApi::new();
    api.expect_get_application().never();
    let mut virtual_cluster = cluster(2, "");
    virtual_cluster.is_virtual_cluster = true;
    let locator = locator(vec![virtual_cluster], Arc::new(api), vec![], no_trees());

    let detail = locator.get_app_detail("guestbook", "argocd", 2).await.unwrap();
    assert_eq!(detail.cluster_name, "cluster-2");
    assert!(detail.manifest.is_none());
    assert!(detail.resource_tree.is_none());
}

#[tokio::test]
async fn unreachable_cluster_is_reported() {
    let mut api = MockArgoApplicationApi::new();
    api.expect_get_application().never();
    let mut broken = cluster(3, "https://10.0.0.3");
    broken.error_in_connecting = "connection refused".to_string();
    let locator = locator(vec![broken], Arc::new(api), vec![], no_trees());

    let err = locator.get_app_detail("guestbook", "argocd", 3).await.unwrap_err();
    assert_eq!(
        err,
        ApiError::NotReachable("cluster is not reachable: connection refused".to_string())
    );
}

#[tokio::test]
async fn missing_cluster_or_application_is_not_found() {
    let locator = locator(
        vec![cluster(1, "https://10.0.0.1")],
        applications_returning(None),
        vec![],
        no_trees(),
    );

    let err = locator.get_app_detail("guestbook", "argocd", 9).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    let err = locator.get_app_detail("guestbook", "argocd", 1).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

fn table(rows: Vec<(&str, &str, &str, &str)>) -> Value {
    json!({
        "kind": "Table",
        "apiVersion": "meta.k8s.io/v1",
        "columnDefinitions": [
            {"name": "Name", "type": "string"},
            {"name": "Sync Status", "type": "string"},
            {"name": "Health Status", "type": "string"}
        ],
        "rows": rows
            .into_iter()
            .map(|(name, ns, sync, health)| json!({
                "cells": [name, sync, health],
                "object": {"metadata": {"name": name, "namespace": ns}}
            }))
            .collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn list_skips_unusable_clusters() {
    let mut virtual_cluster = cluster(2, "");
    virtual_cluster.is_virtual_cluster = true;
    let mut broken = cluster(3, "https://10.0.0.3");
    broken.error_in_connecting = "timeout".to_string();

    let mut api = MockArgoApplicationApi::new();
    api.expect_list_applications().returning(|conn| match conn.cluster_id {
        1 => Ok(Some(table(vec![
            ("guestbook", "argocd", "Synced", "Healthy"),
            ("billing", "argocd", "OutOfSync", "Degraded"),
        ]))),
        4 => Ok(None),
        5 => Err(anyhow::anyhow!("forbidden")),
        id => panic!("cluster {id} should have been skipped"),
    });

    let locator = locator(
        vec![
            cluster(1, "https://10.0.0.1"),
            virtual_cluster,
            broken,
            cluster(4, "https://10.0.0.4"),
            cluster(5, "https://10.0.0.5"),
        ],
        Arc::new(api),
        vec![],
        no_trees(),
    );

    let apps = locator.list_applications(None).await.unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0].app_name, "guestbook");
    assert_eq!(apps[0].cluster_id, 1);
    assert_eq!(apps[0].cluster_name, "cluster-1");
    assert_eq!(apps[0].namespace, "argocd");
    assert_eq!(apps[0].app_status, "Healthy");
    assert_eq!(apps[1].sync_status, "OutOfSync");
    assert_eq!(apps[1].app_status, "Degraded");
}

#[tokio::test]
async fn list_limits_to_requested_clusters() {
    let mut api = MockArgoApplicationApi::new();
    api.expect_list_applications()
        .withf(|conn| conn.cluster_id == 4)
        .times(1)
        .returning(|_| Ok(Some(table(vec![("edge", "argocd", "Synced", "Healthy")]))));
    let locator = locator(
        vec![cluster(1, "https://10.0.0.1"), cluster(4, "https://10.0.0.4")],
        Arc::new(api),
        vec![],
        no_trees(),
    );

    let apps = locator.list_applications(Some(vec![4])).await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].app_name, "edge");
}
