//! Startup, listeners, TLS termination and shutdown.

mod common;

use std::time::Duration;

use common::{closed_port_url, eventually, start_static_upstream, start_upstream, Reply};
use http_forwarder::config::{ConfigError, ProxyConfig, TargetSpec};
use http_forwarder::lifecycle::shutdown::DRAIN_TIMEOUT;
use http_forwarder::lifecycle::{self, Shutdown};
use http_forwarder::net::ListenerError;
use http_forwarder::ProxyError;

fn local_config(cert_dir: &std::path::Path) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_host = "127.0.0.1".to_string();
    config.listener.http_port = 0;
    config.listener.https_port = 0;
    config.tls.cert_dir = cert_dir.to_string_lossy().into_owned();
    config.tls.common_name = "localhost".to_string();
    config
}

fn tls_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}

#[tokio::test]
async fn both_listeners_forward_to_their_own_targets() {
    let plain_upstream = start_static_upstream("via-http").await;
    let tls_upstream = start_static_upstream("via-https").await;
    let certs = tempfile::tempdir().unwrap();

    let mut config = local_config(certs.path());
    config.target_hosts_http = Some(vec![TargetSpec::from(plain_upstream.url().as_str())]);
    config.target_hosts_https = Some(vec![TargetSpec::from(tls_upstream.url().as_str())]);

    let shutdown = Shutdown::new();
    let proxy = lifecycle::start(&config, &shutdown).await.unwrap();
    let https_addr = proxy.https_addr().unwrap();

    let response = tls_client()
        .get(format!("https://{}/weatherstation/update?id=1", https_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "via-https");

    let response = tls_client()
        .get(format!("http://{}/weatherstation/update?id=1", proxy.http_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "via-http");

    assert_eq!(tls_upstream.requests()[0].path, "/weatherstation/update?id=1");
    assert!(certs.path().join("ssl.cert").exists());
    assert!(certs.path().join("ssl.key").exists());

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(15), proxy.wait())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn restart_reuses_cached_credentials() {
    let certs = tempfile::tempdir().unwrap();
    let config = local_config(certs.path());

    let shutdown = Shutdown::new();
    let proxy = lifecycle::start(&config, &shutdown).await.unwrap();
    let first = std::fs::read(certs.path().join("ssl.cert")).unwrap();
    shutdown.trigger();
    proxy.wait().await.unwrap();

    let shutdown = Shutdown::new();
    let proxy = lifecycle::start(&config, &shutdown).await.unwrap();
    let second = std::fs::read(certs.path().join("ssl.cert")).unwrap();
    shutdown.trigger();
    proxy.wait().await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn occupied_tls_port_is_fatal() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let certs = tempfile::tempdir().unwrap();
    let mut config = local_config(certs.path());
    config.listener.https_port = taken.local_addr().unwrap().port();

    let err = lifecycle::start(&config, &Shutdown::new()).await.unwrap_err();

    match err {
        ProxyError::Listener(ListenerError::Bind { listener, .. }) => {
            assert_eq!(listener.as_str(), "https");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn occupied_plain_port_is_fatal() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let certs = tempfile::tempdir().unwrap();
    let mut config = local_config(certs.path());
    config.listener.http_port = taken.local_addr().unwrap().port();

    let err = lifecycle::start(&config, &Shutdown::new()).await.unwrap_err();

    assert!(matches!(err, ProxyError::Listener(ListenerError::Bind { .. })));
}

#[tokio::test]
async fn malformed_target_is_a_configuration_error() {
    let certs = tempfile::tempdir().unwrap();
    let mut config = local_config(certs.path());
    config.listener.https_enabled = false;
    config.target_hosts = vec![TargetSpec::from("ftp://files.local")];

    let err = lifecycle::start(&config, &Shutdown::new()).await.unwrap_err();

    assert!(matches!(err, ProxyError::Config(ConfigError::Validation(_))));
}

#[tokio::test]
async fn shutdown_completes_with_plain_listener_only() {
    let certs = tempfile::tempdir().unwrap();
    let mut config = local_config(certs.path());
    config.listener.https_enabled = false;
    config.target_hosts = vec![TargetSpec::from(closed_port_url().as_str())];

    let shutdown = Shutdown::new();
    let proxy = lifecycle::start(&config, &shutdown).await.unwrap();
    assert!(proxy.https_addr().is_none());
    assert!(!certs.path().join("ssl.cert").exists());

    let response = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("http://{}/health", proxy.http_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(15), proxy.wait())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn shutdown_abandons_requests_stuck_past_the_drain_deadline() {
    let upstream = start_upstream(|_| Reply::Stall).await;
    let certs = tempfile::tempdir().unwrap();
    let mut config = local_config(certs.path());
    config.listener.https_enabled = false;
    config.target_hosts = vec![TargetSpec::from(upstream.url().as_str())];

    let shutdown = Shutdown::new();
    let proxy = lifecycle::start(&config, &shutdown).await.unwrap();

    let url = format!("http://{}/stuck", proxy.http_addr());
    let request = tokio::spawn(async move {
        reqwest::Client::builder().no_proxy().build().unwrap().get(url).send().await
    });
    assert!(eventually(Duration::from_secs(5), || upstream.hits() == 1).await);
    assert_eq!(proxy.tracker().active_count(), 1);

    shutdown.trigger();
    tokio::time::timeout(DRAIN_TIMEOUT + Duration::from_secs(5), proxy.wait())
        .await
        .expect("shutdown waits no longer than the drain deadline")
        .unwrap();

    assert!(request.await.unwrap().is_err());
    assert!(eventually(Duration::from_secs(2), || upstream.disconnects() == 1).await);
}
