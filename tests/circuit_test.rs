//! Circuit behavior through the client, against wiremock upstreams.
//!
//! The breaker state machine itself is unit-tested next to its module;
//! these tests cover what a caller observes: opening under failure load,
//! short-circuiting without network attempts, stale serving while open,
//! recovery after the sleep window, and live config updates.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use munin::{CircuitConfig, CircuitState, Munin, MuninError, ResilientClient};

const BODY: &str = "{\"name\":\"mock\"}\n";

/// A circuit policy that trips on the first failure and stays open long
/// past the end of the test.
fn hair_trigger() -> CircuitConfig {
    CircuitConfig::new()
        .request_volume_threshold(1)
        .error_percent_threshold(1)
        .sleep_window(Duration::from_secs(60))
}

fn bare_client(command: &str, config: CircuitConfig) -> ResilientClient {
    Munin::builder()
        .command(command)
        .circuit_config(config)
        .live_cache(false)
        .stale_cache(false)
        .build()
        .unwrap()
}

#[tokio::test]
async fn opens_after_consecutive_failures_and_short_circuits() {
    let server = MockServer::start().await;
    // Only the four calls below the volume threshold reach the upstream.
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let client = bare_client(
        "failing-upstream",
        CircuitConfig::new()
            .request_volume_threshold(4)
            .error_percent_threshold(50)
            .sleep_window(Duration::from_secs(60)),
    );
    let url = format!("{}/list", server.uri());

    for _ in 0..5 {
        assert!(client.get(&url).await.is_err());
    }
    assert_eq!(client.circuit_state(), Some(CircuitState::Open));

    let err = client.get(&url).await.unwrap_err();
    assert!(matches!(err.root_cause(), MuninError::CircuitOpen { .. }));
}

#[tokio::test]
async fn open_circuit_serves_stale_without_a_network_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = Munin::builder()
        .command("flaky-upstream")
        .circuit_config(hair_trigger())
        .live_ttl(Duration::from_millis(100))
        .build()
        .unwrap();
    let url = format!("{}/list", server.uri());

    // Seed both tiers, then outlive the live entry.
    assert_eq!(client.get(&url).await.unwrap(), BODY);
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The 500 trips the circuit; the caller still gets the stale body.
    assert_eq!(client.get(&url).await.unwrap(), BODY);
    assert_eq!(client.circuit_state(), Some(CircuitState::Open));

    // Open circuit: no further upstream traffic, stale keeps serving.
    assert_eq!(client.get(&url).await.unwrap(), BODY);
    assert_eq!(client.get(&url).await.unwrap(), BODY);
}

#[tokio::test]
async fn recovers_after_the_sleep_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .mount(&server)
        .await;

    let client = bare_client(
        "recovering-upstream",
        CircuitConfig::new()
            .request_volume_threshold(1)
            .error_percent_threshold(1)
            .sleep_window(Duration::from_millis(150)),
    );
    let url = format!("{}/list", server.uri());

    assert!(client.get(&url).await.is_err());
    assert_eq!(client.circuit_state(), Some(CircuitState::Open));

    // Inside the sleep window every call is rejected outright.
    let err = client.get(&url).await.unwrap_err();
    assert!(matches!(err.root_cause(), MuninError::CircuitOpen { .. }));

    // Past the window, the trial request goes through and closes the
    // circuit; the upstream has recovered by now.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.get(&url).await.unwrap(), BODY);
    assert_eq!(client.circuit_state(), Some(CircuitState::Closed));
    assert_eq!(client.get(&url).await.unwrap(), BODY);
}

#[tokio::test]
async fn update_circuit_config_takes_effect_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = Munin::builder()
        .command("tunable-upstream")
        .live_cache(false)
        .stale_cache(false)
        .build()
        .unwrap();
    let url = format!("{}/list", server.uri());

    // Default volume threshold is 3: one failure leaves the circuit closed.
    assert!(client.get(&url).await.is_err());
    assert_eq!(client.circuit_state(), Some(CircuitState::Closed));

    client.update_circuit_config(client.command(), hair_trigger());
    assert!(client.get(&url).await.is_err());
    assert_eq!(client.circuit_state(), Some(CircuitState::Open));
}

#[tokio::test]
async fn flush_all_resets_circuit_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let client = bare_client("doomed-upstream", hair_trigger());
    let url = format!("{}/list", server.uri());

    assert!(client.get(&url).await.is_err());
    assert_eq!(client.circuit_state(), Some(CircuitState::Open));

    client.flush_all();
    assert_eq!(client.circuit_state(), None);

    // The breaker is recreated with its installed config and reaches the
    // upstream again.
    assert!(client.get(&url).await.is_err());
    assert_eq!(client.circuit_state(), Some(CircuitState::Open));
}

#[tokio::test]
async fn commands_are_isolated_on_a_shared_registry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .mount(&server)
        .await;

    let bad = bare_client("bad-upstream", hair_trigger());
    let good = Munin::builder()
        .command("good-upstream")
        .shared_circuits(bad.circuits())
        .build()
        .unwrap();

    assert!(bad.get(&format!("{}/bad", server.uri())).await.is_err());
    assert_eq!(bad.circuit_state(), Some(CircuitState::Open));

    // The sibling command on the same registry is unaffected.
    assert_eq!(
        good.get(&format!("{}/good", server.uri())).await.unwrap(),
        BODY
    );
    assert_eq!(good.circuit_state(), Some(CircuitState::Closed));
}

#[tokio::test]
async fn the_same_command_is_shared_across_clients() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let first = bare_client("shared-upstream", hair_trigger());
    let second = Munin::builder()
        .command("shared-upstream")
        .shared_circuits(first.circuits())
        .live_cache(false)
        .stale_cache(false)
        .build()
        .unwrap();
    let url = format!("{}/list", server.uri());

    assert!(first.get(&url).await.is_err());

    // The second client's call is rejected by the breaker the first one
    // tripped, without touching the upstream.
    let err = second.get(&url).await.unwrap_err();
    assert!(matches!(err.root_cause(), MuninError::CircuitOpen { .. }));
}
