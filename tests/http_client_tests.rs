use resilience::client::{build_pipeline, ValuesClient, BREAKER_POLICY_KEY};
use resilience::retry::BackoffKind;
use resilience::{Context, PolicyError, PolicyExt, ResilienceConfig, ResilienceError};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn fast_config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.retry.max_retries = 3;
    config.retry.backoff = BackoffKind::Constant;
    config.retry.initial_backoff_ms = 10;
    config.circuit_breaker.failure_threshold = 10;
    config
}

fn client(server: &MockServer) -> ValuesClient {
    ValuesClient::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_get_value_sends_text_accept_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/values/5"))
        .and(header("Accept", "text/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("5"))
        .expect(1)
        .mount(&server)
        .await;

    let value = assert_ok!(client(&server).get_value(5).await);
    assert_eq!(value, "5");
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/values/7"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/values/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("7"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&fast_config());
    let client = client(&server);
    let client = &client;
    let ctx = Context::with_key("The execution.");

    let value = pipeline
        .execute(&ctx, move || client.get_value(7))
        .await
        .unwrap();
    assert_eq!(value, "7");
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/values/-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("id must not be negative."))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&fast_config());
    let client = client(&server);
    let client = &client;
    let ctx = Context::new();

    let err = assert_err!(pipeline.execute(&ctx, move || client.get_value(-1)).await);
    assert!(matches!(
        err,
        PolicyError::Inner(ResilienceError::UnexpectedStatus { status: 400 })
    ));
}

#[tokio::test]
async fn test_persistent_failure_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/values/5"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let pipeline = build_pipeline(&fast_config());
    let client = client(&server);
    let client = &client;
    let ctx = Context::new();

    let err = pipeline
        .execute(&ctx, move || client.get_value(5))
        .await
        .unwrap_err();
    match err {
        PolicyError::RetriesExhausted { attempts, ref last } => {
            assert_eq!(attempts, 4);
            assert!(matches!(
                **last,
                PolicyError::Inner(ResilienceError::UnexpectedStatus { status: 500 })
            ));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_breaker_stops_calls_to_failing_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/values/5"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.circuit_breaker.failure_threshold = 2;
    let pipeline = build_pipeline(&config);
    let client = client(&server);
    let client = &client;

    let ctx = Context::new();
    let err = pipeline
        .execute(&ctx, move || client.get_value(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PolicyError::CircuitBroken { ref policy_key, .. } if policy_key == BREAKER_POLICY_KEY
    ));

    // Later top-level calls are rejected without reaching the server
    let ctx = Context::new();
    let err = pipeline
        .execute(&ctx, move || client.get_value(5))
        .await
        .unwrap_err();
    assert!(err.is_circuit_broken());
}

#[tokio::test]
async fn test_slow_response_times_out_and_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/values/5"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("5")
                .set_delay(Duration::from_millis(1500)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/values/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("5"))
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.timeout_secs = Some(1);
    let pipeline = build_pipeline(&config);
    let client = client(&server);
    let client = &client;
    let ctx = Context::new();

    let value = pipeline
        .execute(&ctx, move || client.get_value(5))
        .await
        .unwrap();
    assert_eq!(value, "5");
}

#[tokio::test]
async fn test_connection_failure_is_transient() {
    // Nothing listens on a port we bound and released
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut config = fast_config();
    config.retry.max_retries = 1;
    let pipeline = build_pipeline(&config);
    let client = ValuesClient::new(uri, Duration::from_secs(1)).unwrap();
    let client = &client;
    let ctx = Context::new();

    let err = pipeline
        .execute(&ctx, move || client.get_value(5))
        .await
        .unwrap_err();
    assert!(err.is_retries_exhausted());
    assert!(matches!(err.fault(), Some(ResilienceError::Http(_))));
}
