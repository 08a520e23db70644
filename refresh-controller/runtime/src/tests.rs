use crate::{
    core::{defaults, ManualClock},
    index::{IndexMetrics, StartError},
    k8s::{resources, Client},
    telemetry::Recorder,
    Args, Config, Services,
};
use clap::Parser;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

type MockHandle =
    tower_test::mock::Handle<http::Request<kube::client::Body>, http::Response<kube::client::Body>>;

fn mock_client() -> (Client, MockHandle) {
    let (service, handle) = tower_test::mock::pair();
    (Client::new(service, "default"), handle)
}

fn config_from(args: &[&str]) -> Config {
    let args = std::iter::once("refresh").chain(args.iter().copied());
    Args::try_parse_from(args)
        .expect("arguments must parse")
        .config()
}

#[test]
fn flags_default_to_process_defaults() {
    let config = config_from(&[]);
    assert_eq!(
        config,
        Config {
            permission_cache_ttl: defaults::PERMISSION_CACHE_TTL,
            permission_prime_timeout: defaults::PERMISSION_PRIME_TIMEOUT,
            capability_workers: defaults::CAPABILITY_WORKERS,
            capability_qps: defaults::CAPABILITY_QPS,
            slow_request_threshold: defaults::SLOW_REQUEST_THRESHOLD,
            drain_max_history: defaults::DRAIN_MAX_HISTORY,
        }
    );
    assert!(config.rate_limiter().is_some());
}

#[test]
fn flags_override_defaults() {
    let config = config_from(&[
        "--permission-cache-ttl-secs=30",
        "--permission-prime-timeout-secs=3",
        "--capability-workers=8",
        "--capability-qps=0",
        "--slow-request-threshold-ms=200",
        "--drain-max-history=10",
    ]);
    assert_eq!(config.permission_cache_ttl, Duration::from_secs(30));
    assert_eq!(config.permission_prime_timeout, Duration::from_secs(3));
    assert_eq!(config.drain_max_history, 10);
    assert!(config.rate_limiter().is_none(), "zero qps disables pacing");

    let evaluator = config.evaluator_config();
    assert_eq!(evaluator.worker_count, 8);
    assert_eq!(evaluator.slow_request_threshold, Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn unanswered_reviews_leave_only_namespaced_informers() {
    let (client, _handle) = mock_client();
    let config = Config {
        permission_prime_timeout: Duration::from_secs(1),
        ..config_from(&[])
    };
    let recorder = Arc::new(Recorder::new(Arc::new(ManualClock::default())));
    let services = Services::new(
        client,
        &config,
        IndexMetrics::default(),
        recorder.clone(),
        Arc::new(ManualClock::default()),
    )
    .await;

    assert_eq!(
        services.factory.registered_resources().len(),
        resources::NAMESPACED.len()
    );
    assert!(services.factory.allowed_permission_keys().is_empty());
    assert_eq!(services.drains.max_history(), defaults::DRAIN_MAX_HISTORY);

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(
        services.sync_informers(&cancel).await,
        Err(StartError::Cancelled)
    ));
    let catalog = recorder.summary().catalog;
    assert_eq!(catalog.success_count + catalog.failure_count, 0);

    services.shutdown();
    assert!(services.factory.registered_resources().is_empty());
}
