use backbone_core::mock::{journal, Journal, RecordingMonitor, TestComponent};
use backbone_core::{
    BackboneError, CompositeComponent, ComponentStateSnapshot, Lifecycle, LifecycleOperation,
    LifecycleStatus,
};
use std::sync::Arc;
use std::time::Duration;

// --- Helpers ---

struct Tree {
    root: Arc<CompositeComponent>,
    a: Arc<TestComponent>,
    b: Arc<TestComponent>,
    c: Arc<TestComponent>,
    journal: Journal,
}

/// Root `r` (a composite) with children `a`, `b`, `c` sharing one journal.
fn tree() -> Tree {
    let journal = journal();
    let root = Arc::new(CompositeComponent::new("r"));
    let child = |name: &str| Arc::new(TestComponent::new(name).with_journal(journal.clone()));
    let (a, b, c) = (child("a"), child("b"), child("c"));
    root.add(a.clone());
    root.add(b.clone());
    root.add(c.clone());
    Tree {
        root,
        a,
        b,
        c,
        journal,
    }
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

/// Brings a fresh component into `status`.
async fn component_in(status: LifecycleStatus) -> TestComponent {
    let component = TestComponent::new("subject");
    match status {
        LifecycleStatus::Unknown => {}
        LifecycleStatus::Initialized => component.initialize().await.unwrap(),
        LifecycleStatus::Started => {
            component.initialize().await.unwrap();
            component.start().await.unwrap();
        }
        LifecycleStatus::Paused => {
            component.initialize().await.unwrap();
            component.start().await.unwrap();
            component.pause().await.unwrap();
        }
        LifecycleStatus::Stopped => {
            component.initialize().await.unwrap();
            component.stop().await.unwrap();
        }
        LifecycleStatus::Terminated => component.terminate().await.unwrap(),
        LifecycleStatus::InitializeError => {
            component.fail_on(LifecycleOperation::Initialize);
            component.initialize().await.unwrap_err();
            component.heal();
        }
        LifecycleStatus::StartError => {
            component.initialize().await.unwrap();
            component.fail_on(LifecycleOperation::Start);
            component.start().await.unwrap_err();
            component.heal();
        }
        LifecycleStatus::LifecycleError => {
            component.initialize().await.unwrap();
            component.start().await.unwrap();
            assert!(component.component().fail("connection reset"));
        }
        other => panic!("not a resting status: {other}"),
    }
    assert_eq!(component.status(), status);
    component
}

// --- Guarded transitions ---

#[tokio::test]
async fn test_start_only_legal_from_initialized() {
    let illegal = [
        LifecycleStatus::Unknown,
        LifecycleStatus::Started,
        LifecycleStatus::Paused,
        LifecycleStatus::Stopped,
        LifecycleStatus::Terminated,
        LifecycleStatus::InitializeError,
        LifecycleStatus::StartError,
        LifecycleStatus::LifecycleError,
    ];

    for status in illegal {
        let component = component_in(status).await;
        let errors_before = component.component().errors();

        let err = component.start().await.unwrap_err();
        match err {
            BackboneError::InvalidLifecycleTransition {
                current, requested, ..
            } => {
                assert_eq!(current, status);
                assert_eq!(requested, LifecycleOperation::Start);
            }
            other => panic!("unexpected error from {status}: {other}"),
        }
        assert_eq!(component.status(), status, "status changed from {status}");
        assert_eq!(component.component().errors(), errors_before);
    }

    let component = component_in(LifecycleStatus::Initialized).await;
    component.start().await.unwrap();
    assert_eq!(component.status(), LifecycleStatus::Started);
}

#[tokio::test]
async fn test_terminate_requires_stop_first() {
    let component = component_in(LifecycleStatus::Started).await;
    let err = component.terminate().await.unwrap_err();
    assert!(matches!(err, BackboneError::InvalidLifecycleTransition { .. }));

    component.stop().await.unwrap();
    component.terminate().await.unwrap();
    assert_eq!(component.status(), LifecycleStatus::Terminated);
}

#[tokio::test]
async fn test_stop_and_terminate_are_idempotent() {
    let t = tree();
    t.root.initialize().await.unwrap();
    t.root.start().await.unwrap();

    t.root.stop().await.unwrap();
    t.root.stop().await.unwrap();
    assert_eq!(t.root.status(), LifecycleStatus::Stopped);
    let stops = entries(&t.journal).iter().filter(|e| e.ends_with(":stop")).count();
    assert_eq!(stops, 3, "second stop must not re-run hooks");

    t.root.terminate().await.unwrap();
    t.root.terminate().await.unwrap();
    assert_eq!(t.root.status(), LifecycleStatus::Terminated);
    for child in [&t.a, &t.b, &t.c] {
        assert_eq!(child.status(), LifecycleStatus::Terminated);
    }
    assert!(t.root.component().errors().is_empty());
}

#[tokio::test]
async fn test_stop_without_start_is_a_no_op() {
    let component = TestComponent::new("idle");
    component.stop().await.unwrap();
    assert_eq!(component.status(), LifecycleStatus::Unknown);
    assert!(component.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_transition_is_rejected() {
    let component = Arc::new(TestComponent::new("slow").with_delay(Duration::from_millis(100)));

    let first = tokio::spawn({
        let component = component.clone();
        async move { component.initialize().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(component.status(), LifecycleStatus::Initializing);

    let err = component.initialize().await.unwrap_err();
    assert!(matches!(err, BackboneError::ConcurrentTransition { .. }));
    assert!(err.is_retryable());

    first.await.unwrap().unwrap();
    assert_eq!(component.status(), LifecycleStatus::Initialized);
}

// --- Cascades ---

#[tokio::test]
async fn test_cascade_order() {
    let t = tree();
    t.root.initialize().await.unwrap();
    t.root.start().await.unwrap();
    t.root.stop().await.unwrap();

    assert_eq!(
        entries(&t.journal),
        vec![
            "a:initialize",
            "b:initialize",
            "c:initialize",
            "a:start",
            "b:start",
            "c:start",
            "c:stop",
            "b:stop",
            "a:stop",
        ]
    );
}

#[tokio::test]
async fn test_child_start_failure_halts_cascade() {
    let t = tree();
    t.root.initialize().await.unwrap();
    t.b.fail_on(LifecycleOperation::Start);

    let err = t.root.start().await.unwrap_err();
    assert!(matches!(
        err,
        BackboneError::TransitionFailed {
            status: LifecycleStatus::StartError,
            ..
        }
    ));

    assert_eq!(t.root.status(), LifecycleStatus::StartError);
    let errors = t.root.component().errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Child 'b' failed to start"), "{}", errors[0]);
    assert!(errors[0].contains("injected start failure"), "{}", errors[0]);

    // No rollback, and c was never asked to start
    assert_eq!(t.a.status(), LifecycleStatus::Started);
    assert_eq!(t.b.status(), LifecycleStatus::StartError);
    assert_eq!(t.c.status(), LifecycleStatus::Initialized);
    assert!(!entries(&t.journal).contains(&"c:start".to_string()));
}

#[tokio::test]
async fn test_owner_recovers_partially_started_tree() {
    let t = tree();
    t.root.initialize().await.unwrap();
    t.b.fail_on(LifecycleOperation::Start);
    t.root.start().await.unwrap_err();

    // Started children make a direct re-initialize illegal; stop the tree first
    t.b.heal();
    t.root.stop().await.unwrap();
    for child in [&t.a, &t.b, &t.c] {
        assert_eq!(child.status(), LifecycleStatus::Stopped);
    }

    t.root.initialize().await.unwrap();
    t.root.start().await.unwrap();
    assert_eq!(t.root.status(), LifecycleStatus::Started);
    // History is kept across recovery
    assert_eq!(t.root.component().errors().len(), 1);
}

#[tokio::test]
async fn test_pause_and_resume_cascade() {
    let t = tree();
    t.root.initialize().await.unwrap();
    t.root.start().await.unwrap();

    t.root.pause().await.unwrap();
    assert_eq!(t.root.status(), LifecycleStatus::Paused);
    assert_eq!(t.a.status(), LifecycleStatus::Paused);
    assert_eq!(t.c.status(), LifecycleStatus::Paused);

    t.root.resume().await.unwrap();
    assert_eq!(t.root.status(), LifecycleStatus::Started);
    assert_eq!(t.b.status(), LifecycleStatus::Started);

    let journal = entries(&t.journal);
    let pauses: Vec<_> = journal.iter().filter(|e| e.ends_with(":pause")).collect();
    assert_eq!(pauses, vec!["c:pause", "b:pause", "a:pause"]);
}

#[tokio::test]
async fn test_end_to_end_tree_start() {
    let t = tree();
    t.root.initialize().await.unwrap();
    t.root.start().await.unwrap();

    assert_eq!(t.root.status(), LifecycleStatus::Started);
    let snapshot = ComponentStateSnapshot::capture(t.root.as_ref());
    let names: Vec<_> = snapshot.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(snapshot
        .children
        .iter()
        .all(|c| c.status == LifecycleStatus::Started));
    assert!(snapshot.is_healthy());
}

// --- Error capture ---

#[tokio::test]
async fn test_error_stack_is_bounded() {
    let component = TestComponent::new("noisy").with_error_limit(3);
    component.initialize().await.unwrap();
    component.start().await.unwrap();

    for i in 0..5 {
        component.component().fail(format!("error {i}"));
    }
    assert_eq!(component.status(), LifecycleStatus::LifecycleError);
    assert_eq!(
        component.component().errors(),
        vec!["error 2", "error 3", "error 4"]
    );
}

#[tokio::test]
async fn test_failed_hook_is_recorded() {
    let component = TestComponent::new("flaky");
    component.fail_on(LifecycleOperation::Initialize);

    let err = component.initialize().await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(component.status(), LifecycleStatus::InitializeError);
    assert_eq!(
        component.component().errors(),
        vec!["Failed to initialize: injected initialize failure"]
    );

    // Error statuses accept a fresh initialize
    component.heal();
    component.initialize().await.unwrap();
    assert_eq!(component.status(), LifecycleStatus::Initialized);
}

#[tokio::test]
async fn test_fail_only_affects_running_components() {
    let component = component_in(LifecycleStatus::Initialized).await;
    assert!(!component.component().fail("late report"));
    assert_eq!(component.status(), LifecycleStatus::Initialized);
    assert_eq!(component.component().errors(), vec!["late report"]);
}

// --- Progress reporting ---

#[tokio::test]
async fn test_progress_reports_cover_the_cascade() {
    let t = tree();
    let monitor = Arc::new(RecordingMonitor::new());
    t.root.component().set_monitor(monitor.clone());

    t.root.initialize().await.unwrap();

    let reports = monitor.progress_for("initialize r");
    let percentages: Vec<u8> = reports.iter().map(|r| r.percentage).collect();
    assert_eq!(percentages.first(), Some(&0));
    assert_eq!(percentages.last(), Some(&100));
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]), "{percentages:?}");
    assert!(monitor.errors().is_empty());

    t.a.fail_on(LifecycleOperation::Start);
    t.root.start().await.unwrap_err();
    assert_eq!(monitor.errors().len(), 1);
}

// --- Snapshots ---

#[tokio::test]
async fn test_snapshot_is_stable_without_transitions() {
    let t = tree();
    t.root.initialize().await.unwrap();
    t.c.fail_on(LifecycleOperation::Start);
    let _ = t.root.start().await;

    let first = ComponentStateSnapshot::capture(t.root.as_ref());
    let second = ComponentStateSnapshot::capture(t.root.as_ref());
    assert_eq!(first, second);

    assert_eq!(first.overall_status(), LifecycleStatus::StartError);
    let failed: Vec<_> = first.failures().into_iter().map(|f| f.path).collect();
    assert_eq!(failed, vec!["r", "r/c"]);

    let json = serde_json::to_value(&first).unwrap();
    assert_eq!(json["status"], "StartError");
    assert_eq!(json["children"][2]["name"], "c");
}

#[tokio::test]
async fn test_parent_is_tracked_by_id() {
    let t = tree();
    assert_eq!(t.a.component().parent(), Some(t.root.component().id()));

    let removed = t.root.component().remove_child(t.b.component().id()).unwrap();
    assert_eq!(removed.component().name(), "b");
    assert_eq!(t.b.component().parent(), None);
    assert_eq!(t.root.component().children().len(), 2);
}
