mod common;

use common::{MockConnector, config};
use stomp_session::{SessionAdapter, SessionError};

const FAILOVER: &str = "failover://(tcp://a:61613,tcp://b:61613,tcp://c:61613)";

#[tokio::test]
async fn first_reachable_host_wins() {
    let connector = MockConnector::new();
    connector.refuse("tcp://a:61613", "connection refused");

    let session = SessionAdapter::with_connector(config(FAILOVER), connector.clone())
        .await
        .expect("b should accept");

    assert!(session.is_connected());
    assert_eq!(connector.opens(), vec!["tcp://a:61613", "tcp://b:61613"]);
    assert_eq!(
        session.last_errors(),
        &[("tcp://a:61613".to_string(), "protocol error: connection refused".to_string())]
    );
}

#[tokio::test]
async fn hosts_after_success_are_not_contacted() {
    let connector = MockConnector::new();
    let _session = SessionAdapter::with_connector(config(FAILOVER), connector.clone())
        .await
        .unwrap();

    assert_eq!(connector.opens(), vec!["tcp://a:61613"]);
}

#[tokio::test]
async fn exhausting_every_host_reports_each_failure() {
    let connector = MockConnector::new();
    for host in ["tcp://a:61613", "tcp://b:61613", "tcp://c:61613"] {
        connector.refuse(host, "down");
    }

    let err = SessionAdapter::with_connector(config(FAILOVER), connector.clone())
        .await
        .err()
        .expect("no broker accepts");

    assert!(err.is_connection());
    let message = err.to_string();
    assert!(message.contains("could not connect to broker by provided hosts"));
    for host in ["[tcp://a:61613]", "[tcp://b:61613]", "[tcp://c:61613]"] {
        assert!(message.contains(host), "{} missing from {}", host, message);
    }
    assert_eq!(connector.opens().len(), 3);
}

#[tokio::test]
async fn malformed_url_is_a_configuration_error() {
    let connector = MockConnector::new();
    let err = SessionAdapter::with_connector(config("broker.example.com:61613"), connector.clone())
        .await
        .err()
        .expect("a bare host is not a broker URI");

    assert!(matches!(err, SessionError::Configuration(_)));
    assert!(connector.opens().is_empty());
}

#[tokio::test]
async fn error_log_is_reset_by_each_connect_pass() {
    let connector = MockConnector::new();
    connector.refuse("tcp://a:61613", "down");
    let mut session = SessionAdapter::with_connector(config(FAILOVER), connector.clone())
        .await
        .unwrap();
    assert_eq!(session.last_errors().len(), 1);

    connector.accept("tcp://a:61613");
    session.reconnect().await.unwrap();

    assert!(session.last_errors().is_empty());
    assert_eq!(connector.opens().last().map(String::as_str), Some("tcp://a:61613"));
}

#[tokio::test]
async fn broken_link_is_replaced_before_the_next_operation() {
    let connector = MockConnector::new();
    let mut session = SessionAdapter::with_connector(config("tcp://a:61613"), connector.clone())
        .await
        .unwrap();

    connector.break_link("socket reset");
    assert!(!session.is_connected());

    session.send("/queue/out", "payload", &[]).await.unwrap();

    assert!(session.is_connected());
    assert_eq!(connector.links_opened(), 2);
}

#[tokio::test]
async fn healthy_link_is_reused() {
    let connector = MockConnector::new();
    let mut session = SessionAdapter::with_connector(config("tcp://a:61613"), connector.clone())
        .await
        .unwrap();

    session.check_connection().await.unwrap();
    session.send("/queue/out", "one", &[]).await.unwrap();
    session.send("/queue/out", "two", &[]).await.unwrap();

    assert_eq!(connector.links_opened(), 1);
}

#[tokio::test]
async fn connect_headers_reach_the_transport() {
    let connector = MockConnector::new();
    let cfg = config("tcp://a:61613").header("client-id", "worker-7");
    let _session = SessionAdapter::with_connector(cfg, connector.clone())
        .await
        .unwrap();

    let headers = connector.last_connect_headers().unwrap();
    assert_eq!(headers.get("client-id"), Some("worker-7"));
    assert_eq!(headers.get("accept-version"), Some("1.2"));
}
