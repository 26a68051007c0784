use std::collections::HashMap;

use anyhow::Result;
use devplane_common::{
    chart_repo::{ChartRepoAuthMode, ChartRepoDto},
    cluster::{ClusterBean, BEARER_TOKEN},
    environment::{environment_identifier, EnvironmentBean},
    HOST_URL_CONFIG_KEY,
};
use sea_orm::{Database, TransactionTrait};

use crate::{api::DbApi, chart_repo_dto, cluster_bean};

async fn prepare_db() -> Result<DbApi> {
    let conn = Database::connect("sqlite::memory:").await?;
    let db = DbApi { conn, pool: None };
    db.migrate().await?;
    Ok(db)
}

fn cluster(name: &str) -> ClusterBean {
    ClusterBean {
        cluster_name: name.to_string(),
        server_url: format!("https://{name}.example.com:6443"),
        config: HashMap::from([(BEARER_TOKEN.to_string(), "token".to_string())]),
        k8s_version: "v1.30.2".to_string(),
        ..Default::default()
    }
}

fn environment(cluster_id: i32, name: &str, namespace: &str) -> EnvironmentBean {
    EnvironmentBean {
        environment_name: name.to_string(),
        cluster_id,
        namespace: namespace.to_string(),
        environment_identifier: environment_identifier("prod", namespace),
        ..Default::default()
    }
}

#[tokio::test]
async fn cluster_round_trips_config_and_soft_deletes() {
    let db = prepare_db().await.unwrap();
    let created = db.create_cluster(&cluster("prod"), 1).await.unwrap();
    let bean = cluster_bean(&created);
    assert_eq!(bean.config_value(BEARER_TOKEN), "token");
    assert!(bean.active);

    assert_eq!(
        db.get_cluster_by_name("prod").await.unwrap().map(|c| c.id),
        Some(created.id)
    );
    assert_eq!(
        db.get_cluster_by_server_url("https://prod.example.com:6443")
            .await
            .unwrap()
            .map(|c| c.id),
        Some(created.id)
    );

    db.delete_cluster(created.id, 1).await.unwrap();
    assert!(db.get_cluster(created.id).await.unwrap().is_none());
    assert!(db.get_cluster_by_name("prod").await.unwrap().is_none());

    // the name is free again once the old row is inactive
    let again = db.create_cluster(&cluster("prod"), 1).await.unwrap();
    assert_ne!(again.id, created.id);
}

#[tokio::test]
async fn virtual_clusters_are_excluded_from_probing_list() {
    let db = prepare_db().await.unwrap();
    db.create_cluster(&cluster("real"), 1).await.unwrap();
    let mut edge = cluster("edge");
    edge.is_virtual_cluster = true;
    db.create_cluster(&edge, 1).await.unwrap();

    assert_eq!(db.get_all_active_clusters().await.unwrap().len(), 2);
    let probed = db.get_all_active_clusters_except_virtual().await.unwrap();
    assert_eq!(probed.len(), 1);
    assert_eq!(probed[0].cluster_name, "real");
}

#[tokio::test]
async fn connection_error_updates_only_that_column() {
    let db = prepare_db().await.unwrap();
    let created = db.create_cluster(&cluster("prod"), 1).await.unwrap();
    db.update_cluster_connection_error(created.id, "connection refused")
        .await
        .unwrap();
    let stored = db.get_cluster(created.id).await.unwrap().unwrap();
    assert_eq!(stored.error_in_connecting, "connection refused");
    assert_eq!(stored.k8s_version, "v1.30.2");
    assert_eq!(stored.config, created.config);
}

#[tokio::test]
async fn environment_lookup_by_name_or_identifier() {
    let db = prepare_db().await.unwrap();
    let c = db.create_cluster(&cluster("prod"), 1).await.unwrap();
    assert!(!db.cluster_has_active_environments(c.id).await.unwrap());

    let env = db
        .create_environment(&environment(c.id, "prod-payments", "payments"), 1)
        .await
        .unwrap();
    assert!(db.cluster_has_active_environments(c.id).await.unwrap());

    let by_identifier = db
        .get_environment_by_name_or_identifier("other", "prod__payments")
        .await
        .unwrap();
    assert_eq!(by_identifier.map(|e| e.id), Some(env.id));

    db.delete_environment(env.id, 1).await.unwrap();
    assert!(!db.cluster_has_active_environments(c.id).await.unwrap());
    assert!(db.get_environment(env.id).await.unwrap().is_none());
    assert_eq!(db.get_all_environments().await.unwrap().len(), 1);
}

#[tokio::test]
async fn chart_repo_deployments_are_counted_from_releases() {
    let db = prepare_db().await.unwrap();
    let c = db.create_cluster(&cluster("prod"), 1).await.unwrap();
    let dto = ChartRepoDto {
        name: "bitnami".to_string(),
        url: "https://charts.bitnami.com/bitnami".to_string(),
        auth_mode: ChartRepoAuthMode::Anonymous,
        ..Default::default()
    };
    let txn = db.conn.begin().await.unwrap();
    let repo = db.create_chart_repo(&txn, &dto, 1).await.unwrap();
    txn.commit().await.unwrap();

    db.upsert_helm_release(c.id, "default", "web", Some(repo.id), "nginx", "1.0.0")
        .await
        .unwrap();
    // same release upgraded, still one deployment
    db.upsert_helm_release(c.id, "default", "web", Some(repo.id), "nginx", "1.1.0")
        .await
        .unwrap();
    db.upsert_helm_release(c.id, "staging", "web", Some(repo.id), "nginx", "1.1.0")
        .await
        .unwrap();

    assert_eq!(db.count_chart_repo_deployments(repo.id).await.unwrap(), 2);
    assert_eq!(
        db.chart_repo_deployment_counts().await.unwrap().get(&repo.id),
        Some(&2)
    );
    assert!(db.namespace_has_helm_releases(c.id, "staging").await.unwrap());
    assert!(!db.namespace_has_helm_releases(c.id, "prod").await.unwrap());

    let stored = db.get_chart_repo_by_name("bitnami").await.unwrap().unwrap();
    assert_eq!(chart_repo_dto(&stored, 2).deployment_count, 2);
}

#[tokio::test]
async fn deleted_chart_repo_is_hidden() {
    let db = prepare_db().await.unwrap();
    let dto = ChartRepoDto {
        name: "stable".to_string(),
        url: "https://charts.example.com".to_string(),
        ..Default::default()
    };
    let txn = db.conn.begin().await.unwrap();
    let repo = db.create_chart_repo(&txn, &dto, 1).await.unwrap();
    db.delete_chart_repo(&txn, repo.id, 1).await.unwrap();
    txn.commit().await.unwrap();

    assert!(db.get_chart_repo(repo.id).await.unwrap().is_none());
    assert!(db.get_all_chart_repos().await.unwrap().is_empty());
}

#[tokio::test]
async fn host_url_is_read_from_config_table() {
    let db = prepare_db().await.unwrap();
    assert_eq!(db.get_host_url().await.unwrap(), None);
    db.update_config(HOST_URL_CONFIG_KEY, "https://devplane.example.com")
        .await
        .unwrap();
    assert_eq!(
        db.get_host_url().await.unwrap().as_deref(),
        Some("https://devplane.example.com")
    );
}
