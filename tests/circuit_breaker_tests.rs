use resilience::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
use resilience::{
    CircuitBreakerPolicy, Context, PolicyError, PolicyExt, PolicyWrap, TimeoutPolicy,
};
use std::sync::Arc;
use std::time::Duration;

async fn call(
    registry: &CircuitBreakerRegistry<String>,
    backend: &str,
    outcome: Result<u32, &'static str>,
) -> Result<u32, PolicyError<String>> {
    let breaker = registry.get_or_create(backend);
    let ctx = Context::new();
    breaker
        .execute(&ctx, move || async move { outcome.map_err(str::to_string) })
        .await
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_integration() {
    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        break_duration_secs: 1,
    };

    let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(config);
    let backend = "http://test-backend:8080";

    // Unknown names report closed
    assert_eq!(registry.state(backend), CircuitState::Closed);

    for _ in 0..3 {
        assert!(call(&registry, backend, Err("down")).await.is_err());
    }
    assert_eq!(registry.state(backend), CircuitState::Open);

    let rejected = call(&registry, backend, Ok(1)).await.unwrap_err();
    assert!(rejected.is_circuit_broken());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(registry.state(backend), CircuitState::HalfOpen);

    assert_eq!(call(&registry, backend, Ok(1)).await.unwrap(), 1);
    assert_eq!(registry.state(backend), CircuitState::Closed);

    let metrics = registry.metrics(backend).unwrap();
    assert_eq!(metrics.total_requests, 4);
    assert_eq!(metrics.failed_requests, 3);
    assert_eq!(metrics.rejected_requests, 1);
    assert_eq!(metrics.circuit_opened_count, 1);
    assert_eq!(metrics.circuit_closed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_timeout_tracking() {
    let breaker = Arc::new(
        CircuitBreakerPolicy::<String>::builder()
            .failure_threshold(2)
            .break_duration(Duration::from_secs(10))
            .handle_timeouts()
            .build(),
    );
    let wrap = PolicyWrap::<(), String>::builder()
        .wrap_shared(breaker.clone())
        .wrap(TimeoutPolicy::new(Duration::from_millis(100)))
        .build();

    for _ in 0..2 {
        let ctx = Context::new();
        let err = wrap
            .execute(&ctx, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timed_out());
    }

    assert_eq!(breaker.state(), CircuitState::Open);

    let metrics = breaker.metrics();
    assert_eq!(metrics.failed_requests, 2);
    assert_eq!(metrics.circuit_opened_count, 1);
}

#[tokio::test]
async fn test_multiple_backends() {
    let config = CircuitBreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    };

    let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(config);

    let backend1 = "http://backend1:8080";
    let backend2 = "http://backend2:8080";

    // Backend 1: Keep it closed with successes
    call(&registry, backend1, Ok(1)).await.unwrap();

    // Backend 2: Open it with failures
    for _ in 0..2 {
        let _ = call(&registry, backend2, Err("down")).await;
    }

    assert_eq!(registry.state(backend1), CircuitState::Closed);
    assert_eq!(registry.state(backend2), CircuitState::Open);
    assert!(call(&registry, backend2, Ok(1))
        .await
        .unwrap_err()
        .is_circuit_broken());

    let all_metrics = registry.all_metrics();
    assert_eq!(all_metrics.len(), 2);

    let backend1_data = all_metrics
        .iter()
        .find(|(name, _, _)| name == backend1)
        .unwrap();
    assert_eq!(backend1_data.2, CircuitState::Closed);
    assert_eq!(backend1_data.1.successful_requests, 1);

    let backend2_data = all_metrics
        .iter()
        .find(|(name, _, _)| name == backend2)
        .unwrap();
    assert_eq!(backend2_data.2, CircuitState::Open);
    assert_eq!(backend2_data.1.failed_requests, 2);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens_circuit() {
    let config = CircuitBreakerConfig {
        failure_threshold: 2,
        break_duration_secs: 1,
    };

    let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(config);
    let backend = "http://flaky-backend:8080";

    for _ in 0..2 {
        let _ = call(&registry, backend, Err("down")).await;
    }
    assert_eq!(registry.state(backend), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(registry.state(backend), CircuitState::HalfOpen);

    // A single failed trial reopens the circuit
    let err = call(&registry, backend, Err("still down")).await.unwrap_err();
    assert!(matches!(err, PolicyError::Inner(ref e) if e == "still down"));
    assert_eq!(registry.state(backend), CircuitState::Open);
}

#[tokio::test]
async fn test_isolate_and_reset() {
    let registry: CircuitBreakerRegistry<String> =
        CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
    let backend = "http://maintenance-backend:8080";

    registry.get_or_create(backend).isolate();
    assert_eq!(registry.state(backend), CircuitState::Isolated);

    let err = call(&registry, backend, Ok(1)).await.unwrap_err();
    assert!(matches!(
        err,
        PolicyError::CircuitBroken {
            retry_after: None,
            ..
        }
    ));

    registry.reset_all();
    assert_eq!(registry.state(backend), CircuitState::Closed);
    assert_eq!(call(&registry, backend, Ok(2)).await.unwrap(), 2);
}

#[tokio::test]
async fn test_circuit_breaker_metrics_accuracy() {
    let config = CircuitBreakerConfig {
        failure_threshold: 5,
        break_duration_secs: 1,
    };

    let registry: CircuitBreakerRegistry<String> = CircuitBreakerRegistry::new(config);
    let backend = "http://metrics-backend:8080";

    call(&registry, backend, Ok(1)).await.unwrap();
    call(&registry, backend, Ok(2)).await.unwrap();
    let _ = call(&registry, backend, Err("down")).await;
    let _ = call(&registry, backend, Err("down")).await;
    call(&registry, backend, Ok(3)).await.unwrap();

    let metrics = registry.metrics(backend).unwrap();
    assert_eq!(metrics.total_requests, 5);
    assert_eq!(metrics.successful_requests, 3);
    assert_eq!(metrics.failed_requests, 2);
    assert_eq!(metrics.rejected_requests, 0);
    assert_eq!(metrics.circuit_opened_count, 0);
    assert_eq!(registry.get_or_create(backend).consecutive_failures(), 0);
}
