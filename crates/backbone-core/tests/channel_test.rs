use async_trait::async_trait;
use backbone_core::mock::{MockService, StaticRegistry};
use backbone_core::transport::memory::MemoryConnector;
use backbone_core::transport::{CallMetadata, TransportError};
use backbone_core::{
    ApiChannel, ApiMethod, BackboneError, FunctionIdentifier, InstanceContext, InstanceSettings,
    Lifecycle, LifecycleStatus, ServiceIdentifier, ServiceTarget, StreamHandler, TargetKey,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// --- API under test ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DeviceQuery {
    device_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DeviceState {
    device_token: String,
    presence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Measurement {
    seq: u32,
    value: f64,
}

struct GetDeviceState;

impl ApiMethod for GetDeviceState {
    const NAME: &'static str = "getDeviceState";
    type Request = DeviceQuery;
    type Response = DeviceState;
}

struct StreamMeasurements;

impl ApiMethod for StreamMeasurements {
    const NAME: &'static str = "streamMeasurements";
    type Request = DeviceQuery;
    type Response = Measurement;
}

// --- Harness ---

struct Harness {
    registry: Arc<StaticRegistry>,
    connector: MemoryConnector,
    remote: MockService,
    context: InstanceContext,
    function: FunctionIdentifier,
    service: ServiceIdentifier,
    target: ServiceTarget,
}

impl Harness {
    fn new(settings: InstanceSettings) -> Self {
        Self::with_connector(settings, MemoryConnector::new())
    }

    fn with_connector(settings: InstanceSettings, connector: MemoryConnector) -> Self {
        let function = FunctionIdentifier::multitenant("device-state");
        let service = ServiceIdentifier::new("DeviceStateApi");
        let target = ServiceTarget::new("device-state", 9000);

        let registry = Arc::new(StaticRegistry::new());
        registry.set(&function, &service, target.clone());
        let remote = MockService::new();
        connector.bind(target.clone(), Arc::new(remote.clone()));
        let context =
            InstanceContext::with_registry(settings, registry.clone(), Arc::new(connector.clone()));

        Self {
            registry,
            connector,
            remote,
            context,
            function,
            service,
            target,
        }
    }

    fn channel(&self) -> ApiChannel {
        ApiChannel::new(self.function.clone(), self.service.clone(), self.context.clone())
    }

    async fn started_channel(&self) -> ApiChannel {
        let channel = self.channel();
        channel.initialize().await.unwrap();
        channel.start().await.unwrap();
        channel
    }
}

fn settings() -> InstanceSettings {
    InstanceSettings {
        call_timeout_ms: 100,
        stream_cancel_grace_ms: 100,
        ..Default::default()
    }
}

fn query() -> DeviceQuery {
    DeviceQuery {
        device_token: "d-1".into(),
    }
}

fn online() -> DeviceState {
    DeviceState {
        device_token: "d-1".into(),
        presence: "online".into(),
    }
}

// --- Lifecycle ---

#[tokio::test]
async fn test_start_connects_once() {
    let h = Harness::new(settings());
    let channel = h.started_channel().await;

    assert_eq!(channel.status(), LifecycleStatus::Started);
    assert!(channel.is_connected());
    assert_eq!(h.connector.connect_count(), 1);
    assert_eq!(h.registry.resolve_count(), 1);

    channel.connect().await.unwrap();
    assert_eq!(h.connector.connect_count(), 1, "connect is idempotent");

    // Resuming reuses the open transport
    channel.pause().await.unwrap();
    channel.resume().await.unwrap();
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test]
async fn test_initialize_registers_with_locator() {
    let h = Harness::new(settings());
    let channel = h.channel();
    channel.initialize().await.unwrap();

    assert_eq!(
        h.context.locator().registrations(),
        vec![TargetKey::new(&h.function, &h.service)]
    );
    assert!(!channel.is_connected(), "initialize does not connect");
}

#[tokio::test]
async fn test_invalid_configuration_fails_initialize() {
    let h = Harness::new(settings());
    let channel = h.channel().with_port(0);

    channel.initialize().await.unwrap_err();
    assert_eq!(channel.status(), LifecycleStatus::InitializeError);
    assert!(channel.component().errors()[0].contains("port must be non-zero"));
}

#[tokio::test]
async fn test_start_fails_when_target_unavailable_and_retries_after_reinitialize() {
    let h = Harness::new(settings());
    h.registry.remove(&h.function, &h.service);
    let channel = h.channel();
    channel.initialize().await.unwrap();

    channel.start().await.unwrap_err();
    assert_eq!(channel.status(), LifecycleStatus::StartError);
    let errors = channel.component().errors();
    assert!(errors[0].contains("Target unavailable"), "{}", errors[0]);
    assert_eq!(h.connector.connect_count(), 0);

    // Start is only legal from Initialized
    assert!(matches!(
        channel.start().await,
        Err(BackboneError::InvalidLifecycleTransition { .. })
    ));

    h.registry.set(&h.function, &h.service, h.target.clone());
    channel.initialize().await.unwrap();
    channel.start().await.unwrap();
    assert_eq!(channel.status(), LifecycleStatus::Started);
}

#[tokio::test]
async fn test_connect_is_refused_unless_started() {
    let h = Harness::new(settings());
    let channel = h.started_channel().await;
    channel.stop().await.unwrap();

    let err = channel.connect().await.unwrap_err();
    assert!(matches!(
        err,
        BackboneError::ChannelNotStarted {
            status: LifecycleStatus::Stopped,
            ..
        }
    ));
    assert!(!channel.is_connected());

    channel.terminate().await.unwrap();
    channel.connect().await.unwrap_err();
    assert!(!channel.is_connected());
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test]
async fn test_stop_releases_transport() {
    let h = Harness::new(settings());
    let channel = h.started_channel().await;

    channel.stop().await.unwrap();
    assert!(!channel.is_connected());
    channel.stop().await.unwrap();
    assert!(!channel.is_connected(), "stopping again does not reconnect");
    assert_eq!(h.connector.connect_count(), 1);
    channel.terminate().await.unwrap();
    channel.terminate().await.unwrap();
    assert_eq!(channel.status(), LifecycleStatus::Terminated);
}

// --- Blocking calls ---

#[tokio::test]
async fn test_blocking_call_round_trip() {
    let h = Harness::new(settings());
    h.remote.expect_call("getDeviceState").return_json(&online());
    let channel = h.started_channel().await;

    let metadata = CallMetadata::new().with("request-id", "r-1");
    let state = channel
        .blocking_call::<GetDeviceState>(&query(), metadata)
        .await
        .unwrap();
    assert_eq!(state, online());

    let requests = h.remote.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "getDeviceState");
    assert_eq!(requests[0].service, h.service);
    assert_eq!(requests[0].metadata.get("request-id"), Some("r-1"));
    let sent: DeviceQuery = serde_json::from_slice(&requests[0].payload).unwrap();
    assert_eq!(sent, query());
    h.remote.verify();
}

#[tokio::test]
async fn test_calls_rejected_unless_started() {
    let h = Harness::new(settings());
    let channel = h.channel();
    channel.initialize().await.unwrap();

    let err = channel
        .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackboneError::ChannelNotStarted {
            status: LifecycleStatus::Initialized,
            ..
        }
    ));
    assert!(h.remote.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_call_times_out() {
    let h = Harness::new(settings());
    h.remote
        .expect_call("getDeviceState")
        .after(Duration::from_secs(1))
        .return_json(&online());
    let channel = h.started_channel().await;

    let err = channel
        .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackboneError::CallTimeout(d) if d == Duration::from_millis(100)));
    assert!(err.is_retryable());
    assert_eq!(channel.status(), LifecycleStatus::Started, "one timeout is not fatal");
}

#[tokio::test(start_paused = true)]
async fn test_repeated_timeouts_fail_the_channel() {
    let h = Harness::new(InstanceSettings {
        failure_threshold: 2,
        ..settings()
    });
    for _ in 0..2 {
        h.remote
            .expect_call("getDeviceState")
            .after(Duration::from_secs(1))
            .return_json(&online());
    }
    let channel = h.started_channel().await;

    for _ in 0..2 {
        let _ = channel
            .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
            .await;
    }
    assert_eq!(channel.status(), LifecycleStatus::LifecycleError);
    assert!(channel.component().errors()[0].contains("2 consecutive calls failed"));
}

#[tokio::test]
async fn test_dropped_connection_moves_channel_to_lifecycle_error() {
    let h = Harness::new(settings());
    let channel = h.started_channel().await;

    h.connector.unbind(&h.target);
    let err = channel
        .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackboneError::TransportFailure(_)));
    assert!(!err.is_retryable());
    assert_eq!(channel.status(), LifecycleStatus::LifecycleError);

    // Recovery is driven by the owner
    h.connector.bind(h.target.clone(), Arc::new(h.remote.clone()));
    h.remote.expect_call("getDeviceState").return_json(&online());
    channel.stop().await.unwrap();
    channel.initialize().await.unwrap();
    channel.start().await.unwrap();
    let state = channel
        .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
        .await
        .unwrap();
    assert_eq!(state, online());
    assert_eq!(h.connector.connect_count(), 2);
}

#[tokio::test]
async fn test_remote_error_is_returned_without_failing_channel() {
    let h = Harness::new(settings());
    h.remote
        .expect_call("getDeviceState")
        .return_err(TransportError::status("NOT_FOUND", "unknown device"));
    let channel = h.started_channel().await;

    let err = channel
        .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackboneError::Remote { ref code, .. } if code == "NOT_FOUND"));
    assert_eq!(channel.status(), LifecycleStatus::Started);
}

#[tokio::test]
async fn test_undecodable_response_is_a_codec_error() {
    let h = Harness::new(settings());
    h.remote
        .expect_call("getDeviceState")
        .return_bytes(Bytes::from_static(b"{\"presence\": 7}"));
    let channel = h.started_channel().await;

    let err = channel
        .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackboneError::Codec(_)));
    assert_eq!(channel.status(), LifecycleStatus::Started);
}

// --- Streaming calls ---

#[derive(Clone, Default)]
struct Collector {
    items: Arc<Mutex<Vec<Measurement>>>,
    errors: Arc<Mutex<Vec<String>>>,
    completed: Arc<AtomicBool>,
}

impl Collector {
    fn seqs(&self) -> Vec<u32> {
        self.items.lock().unwrap().iter().map(|m| m.seq).collect()
    }
}

#[async_trait]
impl StreamHandler<Measurement> for Collector {
    async fn on_next(&mut self, item: Measurement) {
        self.items.lock().unwrap().push(item);
    }

    async fn on_error(&mut self, error: BackboneError) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    async fn on_complete(&mut self) {
        self.completed.store(true, Ordering::SeqCst);
    }
}

fn measurements(count: u32) -> Vec<Measurement> {
    (1..=count)
        .map(|seq| Measurement {
            seq,
            value: f64::from(seq) * 0.5,
        })
        .collect()
}

#[tokio::test]
async fn test_stream_delivers_in_order_then_completes() {
    let h = Harness::new(settings());
    h.remote
        .expect_stream("streamMeasurements")
        .return_json(measurements(20));
    let channel = h.started_channel().await;
    let collector = Collector::default();

    let handle = channel
        .streaming_call::<StreamMeasurements, _>(&query(), CallMetadata::new(), collector.clone())
        .await
        .unwrap();
    handle.join().await;

    assert_eq!(collector.seqs(), (1..=20).collect::<Vec<_>>());
    assert!(collector.completed.load(Ordering::SeqCst));
    assert!(collector.errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_further_delivery() {
    let h = Harness::new(settings());
    h.remote
        .expect_stream("streamMeasurements")
        .every(Duration::from_millis(10))
        .return_json(measurements(100));
    let channel = h.started_channel().await;
    let collector = Collector::default();

    let handle = channel
        .streaming_call::<StreamMeasurements, _>(&query(), CallMetadata::new(), collector.clone())
        .await
        .unwrap();
    while collector.seqs().len() < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    handle.cancel().await;
    let delivered = collector.seqs().len();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(collector.seqs().len(), delivered, "no delivery after cancel");
    assert!(delivered < 100);
    assert!(!collector.completed.load(Ordering::SeqCst));
    assert_eq!(collector.seqs(), (1..=delivered as u32).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_stream_error_reaches_handler() {
    let h = Harness::new(settings());
    let first = serde_json::to_vec(&measurements(1)[0]).unwrap();
    h.remote.expect_stream("streamMeasurements").return_frames(vec![
        Ok(Bytes::from(first)),
        Err(TransportError::status("ABORTED", "device removed")),
        Ok(Bytes::from_static(b"{}")),
    ]);
    let channel = h.started_channel().await;
    let collector = Collector::default();

    let handle = channel
        .streaming_call::<StreamMeasurements, _>(&query(), CallMetadata::new(), collector.clone())
        .await
        .unwrap();
    handle.join().await;

    assert_eq!(collector.seqs(), vec![1]);
    let errors = collector.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("ABORTED"), "{}", errors[0]);
    assert!(!collector.completed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stream_disconnect_moves_channel_to_lifecycle_error() {
    let h = Harness::new(settings());
    let first = serde_json::to_vec(&measurements(1)[0]).unwrap();
    h.remote.expect_stream("streamMeasurements").return_frames(vec![
        Ok(Bytes::from(first)),
        Err(TransportError::Disconnected("peer reset".into())),
    ]);
    let channel = h.started_channel().await;
    let collector = Collector::default();

    let handle = channel
        .streaming_call::<StreamMeasurements, _>(&query(), CallMetadata::new(), collector.clone())
        .await
        .unwrap();
    handle.join().await;

    assert_eq!(collector.seqs(), vec![1]);
    let errors = collector.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("peer reset"), "{}", errors[0]);

    assert_eq!(channel.status(), LifecycleStatus::LifecycleError);
    let stack = channel.component().errors();
    assert_eq!(stack.len(), 1);
    assert!(stack[0].contains("Connection lost: peer reset"), "{}", stack[0]);

    let err = channel
        .blocking_call::<GetDeviceState>(&query(), CallMetadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackboneError::ChannelNotStarted { .. }));
}
