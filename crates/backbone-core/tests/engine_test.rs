use backbone_core::mock::{journal, TestComponent};
use backbone_core::transport::memory::MemoryConnector;
use backbone_core::{
    BackboneError, ComponentType, FunctionIdentifier, InstanceContext, InstanceSettings, InstanceState, Lifecycle,
    LifecycleOperation, LifecycleStatus, Microservice, TenantEngine, TenantId,
};
use std::sync::Arc;
use std::time::Duration;

fn context() -> InstanceContext {
    InstanceContext::new(InstanceSettings::default(), Arc::new(MemoryConnector::new()))
}

fn tenant_engine(tenant: &str, ctx: &InstanceContext) -> (Arc<TenantEngine>, Arc<TestComponent>) {
    let engine = Arc::new(TenantEngine::new(TenantId::new(tenant), ctx));
    let worker = Arc::new(TestComponent::new("rule-processor"));
    engine.add_component(worker.clone());
    (engine, worker)
}

#[tokio::test]
async fn test_tenant_engines_follow_the_microservice() {
    let ctx = context();
    let events = journal();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("event-management"), &ctx);
    let shared = Arc::new(TestComponent::new("shared").with_journal(events.clone()));
    microservice.add_component(shared.clone());

    let engine = Arc::new(TenantEngine::new(TenantId::new("acme"), &ctx));
    let worker = Arc::new(TestComponent::new("acme-worker").with_journal(events.clone()));
    engine.add_component(worker.clone());
    microservice.add_tenant_engine(engine.clone()).await.unwrap();

    microservice.initialize().await.unwrap();
    microservice.start().await.unwrap();
    assert_eq!(engine.status(), LifecycleStatus::Started);

    microservice.stop().await.unwrap();
    assert_eq!(engine.status(), LifecycleStatus::Stopped);

    // Shared components come up before tenant work and go down after it
    assert_eq!(
        events.lock().clone(),
        vec![
            "shared:initialize",
            "acme-worker:initialize",
            "shared:start",
            "acme-worker:start",
            "acme-worker:stop",
            "shared:stop",
        ]
    );
}

#[tokio::test]
async fn test_failing_tenant_engine_is_isolated() {
    let ctx = context();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("event-management"), &ctx);
    let (acme, _) = tenant_engine("acme", &ctx);
    let (globex, globex_worker) = tenant_engine("globex", &ctx);
    globex_worker.fail_on(LifecycleOperation::Start);
    microservice.add_tenant_engine(acme.clone()).await.unwrap();
    microservice.add_tenant_engine(globex.clone()).await.unwrap();

    microservice.initialize().await.unwrap();
    microservice.start().await.unwrap();

    assert_eq!(microservice.status(), LifecycleStatus::Started);
    assert_eq!(acme.status(), LifecycleStatus::Started);
    assert_eq!(globex.status(), LifecycleStatus::StartError);

    let state = microservice.state();
    assert_eq!(state.root.status, LifecycleStatus::Started);
    assert_eq!(state.overall_status(), LifecycleStatus::StartError);
    let tenants: Vec<_> = state
        .tenant_engines
        .iter()
        .map(|t| t.tenant.as_str())
        .collect();
    assert_eq!(tenants, vec!["acme", "globex"]);

    let globex_state = state.tenant(&TenantId::new("globex")).unwrap();
    assert_eq!(globex_state.root.component_type, ComponentType::TenantEngine);
    let failures = globex_state.root.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[1].path, "globex/rule-processor");
    assert!(failures[1].errors[0].contains("injected start failure"));
}

#[tokio::test]
async fn test_tenant_engine_added_at_runtime_is_started() {
    let ctx = context();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("device-state"), &ctx);
    microservice.initialize().await.unwrap();
    microservice.start().await.unwrap();

    let (engine, worker) = tenant_engine("initech", &ctx);
    microservice.add_tenant_engine(engine.clone()).await.unwrap();
    assert_eq!(engine.status(), LifecycleStatus::Started);
    assert_eq!(worker.status(), LifecycleStatus::Started);

    let removed = microservice
        .remove_tenant_engine(&TenantId::new("initech"))
        .await
        .unwrap();
    assert_eq!(removed.status(), LifecycleStatus::Terminated);
    assert!(microservice.tenant_engines().is_empty());
    assert!(microservice
        .remove_tenant_engine(&TenantId::new("initech"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_engine_added_while_paused_follows_resume() {
    let ctx = context();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("device-state"), &ctx);
    microservice.initialize().await.unwrap();
    microservice.start().await.unwrap();
    microservice.pause().await.unwrap();

    let (engine, worker) = tenant_engine("initech", &ctx);
    microservice.add_tenant_engine(engine.clone()).await.unwrap();
    assert_eq!(engine.status(), LifecycleStatus::Paused);
    assert_eq!(
        worker.journal(),
        vec!["rule-processor:initialize", "rule-processor:start", "rule-processor:pause"]
    );

    microservice.resume().await.unwrap();
    assert_eq!(microservice.status(), LifecycleStatus::Started);
    assert_eq!(engine.status(), LifecycleStatus::Started);
    assert_eq!(worker.status(), LifecycleStatus::Started);
    assert_eq!(microservice.state().overall_status(), LifecycleStatus::Started);
}

#[tokio::test]
async fn test_engine_added_while_initialized_starts_with_the_microservice() {
    let ctx = context();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("device-state"), &ctx);
    microservice.initialize().await.unwrap();

    let (engine, _) = tenant_engine("initech", &ctx);
    microservice.add_tenant_engine(engine.clone()).await.unwrap();
    assert_eq!(engine.status(), LifecycleStatus::Initialized);

    microservice.start().await.unwrap();
    assert_eq!(engine.status(), LifecycleStatus::Started);
}

#[tokio::test]
async fn test_engine_failing_to_catch_up_shows_in_state() {
    let ctx = context();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("device-state"), &ctx);
    microservice.initialize().await.unwrap();
    microservice.start().await.unwrap();
    microservice.pause().await.unwrap();

    let (engine, worker) = tenant_engine("initech", &ctx);
    worker.fail_on(LifecycleOperation::Start);
    microservice.add_tenant_engine(engine.clone()).await.unwrap_err();
    assert_eq!(engine.status(), LifecycleStatus::StartError);

    // Resume retries from scratch and the failure stays visible
    microservice.resume().await.unwrap();
    assert_eq!(engine.status(), LifecycleStatus::StartError);
    assert!(!engine.component().errors().is_empty());
    assert_eq!(microservice.state().overall_status(), LifecycleStatus::StartError);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stops_touch_tenants_once() {
    let ctx = context();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("device-state"), &ctx);
    let engine = Arc::new(TenantEngine::new(TenantId::new("acme"), &ctx));
    let worker = Arc::new(TestComponent::new("rule-processor").with_delay(Duration::from_millis(50)));
    engine.add_component(worker.clone());
    microservice.add_tenant_engine(engine.clone()).await.unwrap();
    microservice.initialize().await.unwrap();
    microservice.start().await.unwrap();

    let (first, second) = tokio::join!(microservice.stop(), microservice.stop());
    first.unwrap();
    assert!(matches!(
        second,
        Err(BackboneError::ConcurrentTransition { .. })
    ));

    let stops = worker
        .journal()
        .iter()
        .filter(|entry| entry.ends_with(":stop"))
        .count();
    assert_eq!(stops, 1);
    assert_eq!(engine.status(), LifecycleStatus::Stopped);
    assert_eq!(microservice.status(), LifecycleStatus::Stopped);
}

#[tokio::test]
async fn test_runtime_engine_failure_is_reported_to_caller() {
    let ctx = context();
    let microservice = Microservice::new(FunctionIdentifier::multitenant("device-state"), &ctx);
    microservice.initialize().await.unwrap();
    microservice.start().await.unwrap();

    let (engine, worker) = tenant_engine("umbrella", &ctx);
    worker.fail_on(LifecycleOperation::Initialize);
    microservice.add_tenant_engine(engine.clone()).await.unwrap_err();

    assert_eq!(engine.status(), LifecycleStatus::InitializeError);
    assert!(microservice.tenant_engine(&TenantId::new("umbrella")).is_some());
    assert_eq!(microservice.status(), LifecycleStatus::Started);
}

#[tokio::test]
async fn test_instance_state_rolls_up_microservices() {
    let ctx = context();
    let healthy = Microservice::new(FunctionIdentifier::multitenant("device-state"), &ctx);
    let degraded = Microservice::new(FunctionIdentifier::global("instance-management"), &ctx);
    let flaky = Arc::new(TestComponent::new("kafka-consumer"));
    degraded.add_component(flaky.clone());

    for microservice in [&healthy, &degraded] {
        microservice.initialize().await.unwrap();
        microservice.start().await.unwrap();
    }
    flaky.component().fail("broker unreachable");

    let instance = InstanceState::aggregate("sitewhere", vec![healthy.state(), degraded.state()]);
    assert_eq!(instance.status, LifecycleStatus::LifecycleError);
    assert_eq!(
        instance.microservice("device-state").unwrap().overall_status(),
        LifecycleStatus::Started
    );
    let failures = instance
        .microservice("instance-management")
        .unwrap()
        .root
        .failures();
    assert_eq!(failures[0].path, "instance-management/kafka-consumer");
    assert_eq!(failures[0].errors, vec!["broker unreachable"]);

    // Same tree, no transitions in between: same snapshot
    assert_eq!(healthy.state(), healthy.state());
}
