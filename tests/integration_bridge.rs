// Integration bridge behavior against a wiremock automation service.

use std::sync::Arc;

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use envisalink_bridge::{
    ConfigRepository, IntegrationBridge, IntegrationConfig, OauthCredential,
    PartitionChangeEvent, PartitionStatus, ZoneChangeEvent, ZoneStatus,
};

fn zone_event() -> ZoneChangeEvent {
    ZoneChangeEvent {
        zone: 5,
        previous: ZoneStatus::Closed,
        current: ZoneStatus::Open,
        at: Utc::now(),
    }
}

fn partition_event() -> PartitionChangeEvent {
    PartitionChangeEvent {
        partition: 1,
        previous: PartitionStatus::Disarmed,
        current: PartitionStatus::Armed,
        at: Utc::now(),
    }
}

struct Harness {
    server: MockServer,
    bridge: Arc<IntegrationBridge>,
    tokens: Arc<ConfigRepository<OauthCredential>>,
    _dir: tempfile::TempDir,
}

async fn harness(credential: OauthCredential) -> Harness {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens: Arc<ConfigRepository<OauthCredential>> =
        Arc::new(ConfigRepository::new(dir.path().join("SmartThings.json")));
    tokens.save(&credential).await.unwrap();

    let bridge = Arc::new(
        IntegrationBridge::new(
            IntegrationConfig {
                endpoint_url: format!("{}/events", server.uri()),
                token_url: format!("{}/token", server.uri()),
                request_timeout: std::time::Duration::from_secs(2),
            },
            tokens.clone(),
        )
        .unwrap(),
    );

    Harness { server, bridge, tokens, _dir: dir }
}

fn valid_credential() -> OauthCredential {
    OauthCredential::new("tok-valid", "refresh-1", Utc::now() + Duration::hours(1))
}

fn expired_credential() -> OauthCredential {
    OauthCredential::new("tok-stale", "refresh-1", Utc::now() - Duration::hours(1))
}

fn token_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "access_token": "tok-new",
        "refresh_token": "refresh-2",
        "expires_in": 3600
    }))
}

#[tokio::test]
async fn forwards_zone_event_with_bearer_token() {
    let h = harness(valid_credential()).await;

    Mock::given(method("POST"))
        .and(path("/events/zone"))
        .and(header("authorization", "Bearer tok-valid"))
        .and(body_string_contains("\"zone\":5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    h.bridge.forward_zone_change(&zone_event()).await;
}

#[tokio::test]
async fn forwards_partition_event() {
    let h = harness(valid_credential()).await;

    Mock::given(method("POST"))
        .and(path("/events/partition"))
        .and(body_string_contains("\"current\":\"armed\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    h.bridge.forward_partition_change(&partition_event()).await;
}

#[tokio::test]
async fn expired_token_is_refreshed_and_persisted() {
    let h = harness(expired_credential()).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(token_response())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events/zone"))
        .and(header("authorization", "Bearer tok-new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    h.bridge.forward_zone_change(&zone_event()).await;

    let saved = h.tokens.get().await.unwrap();
    assert_eq!(saved.access_token, "tok-new");
    assert_eq!(saved.refresh_token, "refresh-2");
    assert!(!saved.is_expired(Utc::now()));
}

#[tokio::test]
async fn unauthorized_response_triggers_single_retry() {
    let h = harness(valid_credential()).await;

    // The service no longer accepts the stored token.
    Mock::given(method("POST"))
        .and(path("/events/zone"))
        .and(header("authorization", "Bearer tok-valid"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events/zone"))
        .and(header("authorization", "Bearer tok-new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    h.bridge.forward_zone_change(&zone_event()).await;
}

#[tokio::test]
async fn concurrent_deliveries_refresh_exactly_once() {
    let h = harness(expired_credential()).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events/zone"))
        .respond_with(ResponseTemplate::new(200))
        .expect(8)
        .mount(&h.server)
        .await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let bridge = h.bridge.clone();
        handles.push(tokio::spawn(async move {
            bridge.forward_zone_change(&zone_event()).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn failing_delivery_is_dropped_not_fatal() {
    let h = harness(valid_credential()).await;

    Mock::given(method("POST"))
        .and(path("/events/zone"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    // Best-effort: the event is dropped and logged, nothing panics and no
    // refresh is attempted for a non-401 failure.
    h.bridge.forward_zone_change(&zone_event()).await;
}
