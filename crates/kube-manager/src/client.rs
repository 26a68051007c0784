use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use devplane_common::{
    bounded_error,
    cluster::{ClusterConnectionConfig, RemoteConnection},
};
use kube::config::AuthInfo;

/// Timeout of the `/livez` check done while registering or updating a
/// cluster, and of every scheduled probe.
pub const LIVEZ_TIMEOUT: Duration = Duration::from_secs(10);

const LIVEZ_PATH: &str = "/livez";
const UNAUTHORIZED_REASON: &str = "Unauthorized";

/// Certificates and keys are stored as PEM. Base64 wrapped PEM, as found in
/// kubeconfig files and Argo CD secrets, is accepted too.
pub fn pem_bytes(data: &str) -> Result<Vec<u8>> {
    let trimmed = data.trim();
    if trimmed.contains("-----BEGIN") {
        return Ok(trimmed.as_bytes().to_vec());
    }
    let decoded = STANDARD.decode(trimmed)?;
    Ok(decoded)
}

fn root_certs(ca_data: &str) -> Result<Vec<Vec<u8>>> {
    let certs = pem::parse_many(pem_bytes(ca_data)?)?
        .into_iter()
        .filter_map(|p| {
            if p.tag() == "CERTIFICATE" {
                Some(p.into_contents())
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    if certs.is_empty() {
        return Err(anyhow!("no certificate found in certificate authority data"));
    }
    Ok(certs)
}

fn parse_server_url(server_url: &str) -> std::result::Result<http::Uri, String> {
    let uri: http::Uri = server_url
        .parse()
        .map_err(|e| format!("Incorrect server url : {e}"))?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(format!(
            "Incorrect server url : {server_url:?} is missing a scheme or host"
        ));
    }
    Ok(uri)
}

pub fn cluster_config(conn: &ClusterConnectionConfig, timeout: Duration) -> Result<kube::Config> {
    let cluster_url = parse_server_url(&conn.server_url).map_err(|e| anyhow!(e))?;
    let mut config = kube::Config::new(cluster_url);
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    config.write_timeout = Some(timeout);
    config.accept_invalid_certs = conn.insecure_skip_tls_verify;

    match &conn.remote_connection {
        Some(RemoteConnection::Proxy { proxy_url }) => {
            config.proxy_url = Some(proxy_url.parse()?);
        }
        Some(RemoteConnection::SshTunnel(tunnel)) => {
            return Err(anyhow!(
                "ssh tunnel through {} is not available for direct api access",
                tunnel.ssh_server_address
            ));
        }
        None => {}
    }

    if !conn.insecure_skip_tls_verify {
        if let Some(ca_data) = &conn.ca_data {
            config.root_cert = Some(root_certs(ca_data)?);
        }
    }

    let mut auth_info = AuthInfo {
        token: conn.bearer_token.clone().map(|t| t.into()),
        ..Default::default()
    };
    if let (Some(cert), Some(key)) = (&conn.cert_data, &conn.key_data) {
        auth_info.client_certificate_data = Some(STANDARD.encode(pem_bytes(cert)?));
        auth_info.client_key_data = Some(STANDARD.encode(pem_bytes(key)?).into());
    }
    config.auth_info = auth_info;

    Ok(config)
}

pub fn build_client(conn: &ClusterConnectionConfig, timeout: Duration) -> Result<kube::Client> {
    let config = cluster_config(conn, timeout)?;
    let client = kube::Client::try_from(config)?;
    Ok(client)
}

/// A client for long running watches. Connect and write time out after
/// `timeout` while reads may block up to `read_timeout`, which has to outlast
/// the server side timeout of the watch.
pub fn build_watch_client(
    conn: &ClusterConnectionConfig,
    timeout: Duration,
    read_timeout: Duration,
) -> Result<kube::Client> {
    let mut config = cluster_config(conn, timeout)?;
    config.read_timeout = Some(read_timeout);
    let client = kube::Client::try_from(config)?;
    Ok(client)
}

/// Turns a failed `/livez` request into the message shown on the cluster.
pub fn classify_livez_error(err: &kube::Error) -> String {
    let msg = match err {
        kube::Error::Api(ae) => {
            if ae.code == 401 {
                format!(
                    "{UNAUTHORIZED_REASON} : token seems invalid or does not have sufficient permissions"
                )
            } else {
                format!("{} : {}", ae.reason, ae.message)
            }
        }
        kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::HttpError(_) => {
            format!("Incorrect server url : {err}")
        }
        _ => format!("Validation failed : {err}"),
    };
    bounded_error(msg)
}

/// GETs `/livez` on the cluster. `Ok` means the server answered `ok`,
/// otherwise the error is the message to store as `errorInConnecting`.
pub async fn check_livez(
    conn: &ClusterConnectionConfig,
    timeout: Duration,
) -> std::result::Result<(), String> {
    if let Err(e) = parse_server_url(&conn.server_url) {
        return Err(bounded_error(e));
    }
    let client = build_client(conn, timeout).map_err(|e| bounded_error(format!("{e:#}")))?;
    check_livez_with_client(&client).await
}

pub async fn check_livez_with_client(client: &kube::Client) -> std::result::Result<(), String> {
    let request = http::Request::get(LIVEZ_PATH)
        .body(Vec::new())
        .map_err(|e| bounded_error(format!("Validation failed : {e}")))?;
    match client.request_text(request).await {
        Ok(body) if body.trim() == "ok" => Ok(()),
        Ok(body) => Err(bounded_error(format!(
            "Validation failed with response : {body}"
        ))),
        Err(e) => Err(classify_livez_error(&e)),
    }
}

/// Server version, used to fill `k8sVersion`.
pub async fn server_version(client: &kube::Client) -> Result<String> {
    let info = client.apiserver_version().await?;
    Ok(info.git_version)
}

#[cfg(test)]
mod tests {
    use devplane_common::cluster::SshTunnelConfig;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn conn(url: &str) -> ClusterConnectionConfig {
        ClusterConnectionConfig {
            cluster_id: 1,
            cluster_name: "test".to_string(),
            server_url: url.to_string(),
            bearer_token: Some("token".to_string()),
            insecure_skip_tls_verify: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_connecting() {
        let err = check_livez(&conn("not-a-url"), LIVEZ_TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.starts_with("Incorrect server url : "), "{err}");
    }

    #[tokio::test]
    async fn livez_ok_body_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/livez"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        check_livez(&conn(&server.uri()), LIVEZ_TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unexpected_livez_body_fails_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/livez"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[-]etcd failed"))
            .mount(&server)
            .await;

        let err = check_livez(&conn(&server.uri()), LIVEZ_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, "Validation failed with response : [-]etcd failed");
    }

    #[tokio::test]
    async fn unauthorized_is_reported_as_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/livez"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"Unauthorized","reason":"Unauthorized","code":401}"#,
            ))
            .mount(&server)
            .await;

        let err = check_livez(&conn(&server.uri()), LIVEZ_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            "Unauthorized : token seems invalid or does not have sufficient permissions"
        );
    }

    #[tokio::test]
    async fn other_status_errors_pass_reason_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/livez"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"livez is forbidden","reason":"Forbidden","code":403}"#,
            ))
            .mount(&server)
            .await;

        let err = check_livez(&conn(&server.uri()), LIVEZ_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, "Forbidden : livez is forbidden");
    }

    #[test]
    fn ssh_tunnel_clusters_have_no_direct_config() {
        let mut c = conn("https://10.0.0.1:6443");
        c.remote_connection = Some(RemoteConnection::SshTunnel(SshTunnelConfig {
            ssh_server_address: "bastion:22".to_string(),
            ssh_username: "ops".to_string(),
            ssh_password: String::new(),
            ssh_auth_key: String::new(),
        }));
        assert!(cluster_config(&c, LIVEZ_TIMEOUT).is_err());
    }

    #[test]
    fn pem_accepts_raw_and_base64() {
        let raw = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----";
        assert_eq!(pem_bytes(raw).unwrap(), raw.as_bytes());
        let wrapped = STANDARD.encode(raw);
        assert_eq!(pem_bytes(&wrapped).unwrap(), raw.as_bytes());
    }
}
