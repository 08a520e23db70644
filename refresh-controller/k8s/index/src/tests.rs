use crate::{
    catalog,
    informer::{Informer, Pending},
    Factory, FactoryOptions, PermissionError, PodNodeIndex, StartError,
};
use futures::prelude::*;
use kubedesk_refresh_core::{
    capability::Attributes,
    defaults,
    permission::{PermissionKey, RuntimeChecker},
    ManualClock,
};
use kubedesk_refresh_k8s_api::{
    self as k8s, reflector, resources, watcher, AccessDecision, AccessReviewer, Client,
    ResourceExt, ReviewError,
};
use kubert::index::IndexNamespacedResource;
use maplit::btreeset;
use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn denied_cluster_scoped_informers_are_never_built() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let reviewer = Arc::new(MockReviewer::deny());
    let built = Arc::new(AtomicUsize::new(0));

    let pod_index = PodNodeIndex::shared();
    let namespaced = catalog::namespaced(
        &client,
        crate::IndexMetrics::default().wrap(pod_index.clone()),
    );
    let pending = resources::CLUSTER_SCOPED
        .iter()
        .map(|descriptor| {
            let built = built.clone();
            let client = client.clone();
            let descriptor = *descriptor;
            Pending::new(descriptor, move || {
                built.fetch_add(1, Ordering::SeqCst);
                Informer::watch::<k8s::Node>(client, descriptor)
            })
        })
        .collect();

    let factory = Factory::with_catalog(
        reviewer.clone(),
        FactoryOptions::default(),
        pod_index,
        namespaced,
        pending,
    )
    .await;

    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert_eq!(factory.registered_resources(), resources::NAMESPACED.to_vec());
    // Each cluster-scoped kind is reviewed for list and watch exactly once.
    assert_eq!(
        reviewer.calls(),
        resources::CLUSTER_SCOPED.len() * 2,
        "priming must make the per-registration checks cache hits"
    );
    assert!(factory.store::<k8s::Node>().is_none());
    assert!(factory.store::<k8s::Pod>().is_some());
    assert!(factory.allowed_permission_keys().is_empty());
}

#[tokio::test]
async fn permitted_cluster_scoped_informers_are_registered() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let factory = Factory::new(
        client,
        Arc::new(MockReviewer::allow()),
        FactoryOptions::default(),
    )
    .await;

    let registered = factory.registered_resources();
    assert_eq!(
        registered.len(),
        resources::NAMESPACED.len() + resources::CLUSTER_SCOPED.len()
    );
    for descriptor in resources::CLUSTER_SCOPED {
        assert!(registered.contains(&descriptor), "{descriptor} not registered");
    }
    assert!(factory.store::<k8s::Node>().is_some());
    assert!(factory.store::<k8s::CustomResourceDefinition>().is_some());
    assert!(factory
        .allowed_permission_keys()
        .contains(&"/nodes/watch".to_string()));
}

#[tokio::test]
async fn partial_grants_skip_only_the_denied_kinds() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let reviewer = MockReviewer::allow().denying(btreeset! {
        "/nodes/watch".to_string(),
        "apiextensions.k8s.io/customresourcedefinitions/list".to_string(),
    });
    let factory = Factory::new(client, Arc::new(reviewer), FactoryOptions::default()).await;

    let registered = factory.registered_resources();
    assert!(!registered.contains(&resources::NODES));
    assert!(!registered.contains(&resources::CUSTOM_RESOURCE_DEFINITIONS));
    assert!(registered.contains(&resources::NAMESPACES));
    assert!(registered.contains(&resources::STORAGE_CLASSES));
}

#[tokio::test]
async fn review_errors_skip_registration() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let reviewer = MockReviewer::allow();
    reviewer.fail.store(true, Ordering::SeqCst);
    let factory = Factory::new(client, Arc::new(reviewer), FactoryOptions::default()).await;

    assert_eq!(factory.registered_resources(), resources::NAMESPACED.to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_share_one_review() {
    let _tracing = init_tracing();
    let reviewer = Arc::new(MockReviewer::allow().with_delay(Duration::from_millis(50)));
    let factory = empty_factory(reviewer.clone(), FactoryOptions::default()).await;

    let results = future::join_all(
        (0..16).map(|_| factory.check_resource_verb("apps", "deployments", "list")),
    )
    .await;

    assert_eq!(reviewer.calls(), 1);
    for result in results {
        assert!(result.expect("check must succeed"));
    }

    // Later checks are served from the cache.
    assert!(factory
        .can_list_resource("apps", "deployments")
        .await
        .expect("check must succeed"));
    assert_eq!(reviewer.calls(), 1);
}

#[tokio::test]
async fn denials_are_cached_but_errors_are_not() {
    let _tracing = init_tracing();
    let reviewer = Arc::new(MockReviewer::deny());
    let factory = empty_factory(reviewer.clone(), FactoryOptions::default()).await;

    assert!(!factory.can_watch_resource("", "secrets").await.unwrap());
    assert!(!factory.can_watch_resource("", "secrets").await.unwrap());
    assert_eq!(reviewer.calls(), 1);

    reviewer.fail.store(true, Ordering::SeqCst);
    let error = factory
        .can_list_resource("", "nodes")
        .await
        .expect_err("review must fail");
    assert!(matches!(error, PermissionError::Review { .. }), "{error}");
    factory
        .can_list_resource("", "nodes")
        .await
        .expect_err("review must fail");
    assert_eq!(reviewer.calls(), 3);

    reviewer.fail.store(false, Ordering::SeqCst);
    assert!(!factory.can_list_resource("", "nodes").await.unwrap());
    assert_eq!(reviewer.calls(), 4);
}

#[tokio::test]
async fn decisions_expire_after_ttl() {
    let _tracing = init_tracing();
    let clock = Arc::new(ManualClock::default());
    let reviewer = Arc::new(MockReviewer::allow());
    let options = FactoryOptions {
        permission_cache_ttl: Duration::from_secs(120),
        clock: clock.clone(),
        ..FactoryOptions::default()
    };
    let factory = empty_factory(reviewer.clone(), options).await;

    assert!(factory.can_list_resource("", "pods").await.unwrap());
    clock.advance(Duration::from_secs(119));
    assert!(factory.can_list_resource("", "pods").await.unwrap());
    assert_eq!(reviewer.calls(), 1);

    clock.advance(Duration::from_secs(1));
    assert!(factory.can_list_resource("", "pods").await.unwrap());
    assert_eq!(reviewer.calls(), 2);
}

#[tokio::test]
async fn runtime_checker_is_preferred_and_falls_back_to_cache() {
    let _tracing = init_tracing();
    let clock = Arc::new(ManualClock::default());
    let reviewer = Arc::new(MockReviewer::deny());
    let runtime = Arc::new(MockRuntime::default());
    let options = FactoryOptions {
        clock: clock.clone(),
        runtime_checker: Some(runtime.clone()),
        ..FactoryOptions::default()
    };
    let factory = empty_factory(reviewer.clone(), options).await;

    assert!(factory.can_list_resource("", "nodes").await.unwrap());
    assert_eq!(runtime.calls.load(Ordering::SeqCst), 1);
    assert_eq!(reviewer.calls(), 0);
    assert_eq!(factory.allowed_permission_keys(), vec!["/nodes/list"]);

    // A failing runtime checker is covered by the decision it wrote through.
    runtime.fail.store(true, Ordering::SeqCst);
    assert!(factory.can_list_resource("", "nodes").await.unwrap());

    // Without a valid cached decision the runtime error surfaces.
    let error = factory
        .can_watch_resource("", "nodes")
        .await
        .expect_err("no cached decision to fall back to");
    assert!(matches!(error, PermissionError::Runtime { .. }), "{error}");
    assert!(error.to_string().contains("runtime checker unavailable"));

    clock.advance(defaults::PERMISSION_CACHE_TTL);
    factory
        .can_list_resource("", "nodes")
        .await
        .expect_err("cached decision expired");
    assert_eq!(reviewer.calls(), 0);
}

#[tokio::test]
async fn pending_registrations_reuse_primed_runtime_decisions() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let reviewer = Arc::new(MockReviewer::deny());
    let runtime = Arc::new(MockRuntime::default());
    let options = FactoryOptions {
        runtime_checker: Some(runtime.clone()),
        ..FactoryOptions::default()
    };
    let factory = Factory::new(client, reviewer.clone(), options).await;

    assert_eq!(
        runtime.calls.load(Ordering::SeqCst),
        resources::CLUSTER_SCOPED.len() * 2,
        "each list/watch key is checked once, while priming"
    );
    assert_eq!(reviewer.calls(), 0);
    assert_eq!(
        factory.registered_resources().len(),
        resources::NAMESPACED.len() + resources::CLUSTER_SCOPED.len()
    );
}

#[tokio::test(start_paused = true)]
async fn slow_runtime_checks_do_not_exhaust_the_prime_deadline() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let runtime = Arc::new(MockRuntime {
        latency: Duration::from_millis(500),
        ..MockRuntime::default()
    });
    let options = FactoryOptions {
        runtime_checker: Some(runtime.clone()),
        ..FactoryOptions::default()
    };
    let factory = Factory::new(client, Arc::new(MockReviewer::deny()), options).await;

    for descriptor in resources::CLUSTER_SCOPED {
        assert!(
            factory.registered_resources().contains(&descriptor),
            "{descriptor} not registered"
        );
    }
    assert_eq!(
        runtime.calls.load(Ordering::SeqCst),
        resources::CLUSTER_SCOPED.len() * 2
    );
}

#[tokio::test]
async fn priming_dedupes_and_warms_the_cache() {
    let _tracing = init_tracing();
    let reviewer = Arc::new(MockReviewer::allow().denying(btreeset! {
        "/secrets/list".to_string(),
    }));
    let factory = empty_factory(reviewer.clone(), FactoryOptions::default()).await;

    let keys = vec![
        PermissionKey::new("", "secrets", "list"),
        PermissionKey::new("", "secrets", "list"),
        PermissionKey::new("apps", "deployments", "watch"),
        PermissionKey::new("apps", "deployments", "watch"),
        PermissionKey::new("batch", "jobs", "list"),
    ];
    factory
        .prime_permissions(keys)
        .await
        .expect("priming must succeed");
    assert_eq!(reviewer.calls(), 3);

    assert!(!factory.can_list_resource("", "secrets").await.unwrap());
    assert!(factory.can_watch_resource("apps", "deployments").await.unwrap());
    assert_eq!(reviewer.calls(), 3);
    assert_eq!(
        factory.allowed_permission_keys(),
        vec!["apps/deployments/watch", "batch/jobs/list"]
    );
}

#[tokio::test]
async fn priming_reports_an_error_after_all_checks_run() {
    let _tracing = init_tracing();
    let reviewer = Arc::new(MockReviewer::allow());
    reviewer.fail.store(true, Ordering::SeqCst);
    let factory = empty_factory(reviewer.clone(), FactoryOptions::default()).await;

    let keys = (0..40).map(|i| PermissionKey::new("", format!("kind-{i}"), "list"));
    factory
        .prime_permissions(keys)
        .await
        .expect_err("priming must fail");
    assert_eq!(reviewer.calls(), 40);
}

#[tokio::test]
async fn start_waits_for_stores_to_sync() {
    let _tracing = init_tracing();
    let pod_index = PodNodeIndex::shared();
    let (pods, mut writer) = reflector::store::<k8s::Pod>();
    let task = {
        let pod_index = pod_index.clone();
        async move {
            let scheduled = [
                mk_pod("web", "web-0", Some("node-1")),
                mk_pod("web", "web-1", Some("node-2")),
                mk_pod("db", "db-0", Some("node-1")),
                mk_pod("db", "pending", None),
            ];
            writer.apply_watcher_event(&watcher::Event::Init);
            for pod in scheduled {
                pod_index.write().apply(pod.clone());
                writer.apply_watcher_event(&watcher::Event::InitApply(pod));
            }
            writer.apply_watcher_event(&watcher::Event::InitDone);
            future::pending::<()>().await
        }
    };
    let informer = Informer::new(resources::PODS, pods, task);
    let factory = Factory::with_catalog(
        Arc::new(MockReviewer::allow()),
        FactoryOptions::default(),
        pod_index,
        vec![informer],
        vec![],
    )
    .await;

    assert!(!factory.has_synced());
    assert!(factory.pods_on_node("node-1").is_empty(), "not yet started");
    assert_eq!(factory.cached_objects(), 0);

    let cancel = CancellationToken::new();
    factory.start(&cancel).await.expect("start must sync");
    assert!(factory.has_synced());
    assert_eq!(factory.cached_objects(), 4);

    // Starting again is a no-op that reports the same outcome.
    factory.start(&cancel).await.expect("start must sync");

    let names = factory
        .pods_on_node("node-1")
        .iter()
        .map(|pod| format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any()))
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["db/db-0", "web/web-0"]);
    assert_eq!(factory.pods_on_node("node-2").len(), 1);
    assert!(factory.pods_on_node("node-3").is_empty());

    cancel.cancel();
}

#[tokio::test]
async fn start_returns_when_cancelled() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let factory = Factory::new(
        client,
        Arc::new(MockReviewer::deny()),
        FactoryOptions::default(),
    )
    .await;

    let cancel = CancellationToken::new();
    let start = factory.start(&cancel);
    tokio::pin!(start);
    tokio::select! {
        _ = &mut start => panic!("the mock API server never answers, so caches cannot sync"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }

    cancel.cancel();
    assert!(matches!(start.await, Err(StartError::Cancelled)));
    assert!(!factory.has_synced());
}

#[tokio::test]
async fn shutdown_releases_registrations_and_permissions() {
    let _tracing = init_tracing();
    let (client, _handle) = mock_client();
    let reviewer = Arc::new(MockReviewer::allow());
    let factory = Factory::new(client, reviewer.clone(), FactoryOptions::default()).await;
    assert!(!factory.allowed_permission_keys().is_empty());
    let reviews = reviewer.calls();

    factory.shutdown();

    assert!(factory.registered_resources().is_empty());
    assert!(factory.allowed_permission_keys().is_empty());
    assert!(factory.store::<k8s::Pod>().is_none());
    assert!(factory.pods_on_node("node-1").is_empty());

    // With the cache cleared the next check is reviewed again.
    assert!(factory.can_list_resource("", "nodes").await.unwrap());
    assert_eq!(reviewer.calls(), reviews + 1);
}

// === Helpers ===

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

type MockHandle =
    tower_test::mock::Handle<http::Request<kube::client::Body>, http::Response<kube::client::Body>>;

/// A client whose API server never answers unless the handle is driven.
fn mock_client() -> (Client, MockHandle) {
    let (service, handle) = tower_test::mock::pair();
    (Client::new(service, "default"), handle)
}

async fn empty_factory(reviewer: Arc<dyn AccessReviewer>, options: FactoryOptions) -> Factory {
    Factory::with_catalog(reviewer, options, PodNodeIndex::shared(), vec![], vec![]).await
}

fn mk_pod(ns: &str, name: &str, node: Option<&str>) -> k8s::Pod {
    k8s::Pod {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(k8s::PodSpec {
            node_name: node.map(ToString::to_string),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Default)]
struct MockReviewer {
    calls: AtomicUsize,
    allow: bool,
    denied: BTreeSet<String>,
    fail: AtomicBool,
    delay: Duration,
}

impl MockReviewer {
    fn allow() -> Self {
        Self {
            allow: true,
            ..Self::default()
        }
    }

    fn deny() -> Self {
        Self::default()
    }

    fn denying(self, denied: BTreeSet<String>) -> Self {
        Self { denied, ..self }
    }

    fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AccessReviewer for MockReviewer {
    async fn review(&self, attributes: &Attributes) -> Result<AccessDecision, ReviewError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReviewError::MissingStatus);
        }
        let key = PermissionKey::new(&attributes.group, &attributes.resource, &attributes.verb);
        let allowed = self.allow && !self.denied.contains(&key.to_string());
        Ok(AccessDecision {
            allowed,
            reason: (!allowed).then(|| "forbidden by test".to_string()),
            evaluation_error: None,
        })
    }
}

#[derive(Default)]
struct MockRuntime {
    calls: AtomicUsize,
    fail: AtomicBool,
    latency: Duration,
}

#[async_trait::async_trait]
impl RuntimeChecker for MockRuntime {
    async fn check(&self, _key: &PermissionKey) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("runtime checker unavailable");
        }
        Ok(true)
    }
}
