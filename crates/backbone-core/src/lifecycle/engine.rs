//! # Transition Engine
//!
//! Runs one guarded lifecycle transition on a component:
//!
//! 1. Acquire the component's transition guard (`try_lock`), otherwise fail with
//!    `ConcurrentTransition`.
//! 2. Reject illegal transitions with `InvalidLifecycleTransition`; succeed
//!    immediately on idempotent no-ops (`stop` on a stopped component, ...).
//! 3. Enter the in-flight status and run the component's own hook plus the child
//!    cascade. `initialize`/`start`/`resume` run the own hook first, then the
//!    children in declaration order; `pause`/`stop`/`terminate` visit the
//!    children in reverse order first, then run the own hook. Components that
//!    manage extra nodes outside their children (a microservice and its tenant
//!    engines) pass them as a `managed` step, which runs under the same guard:
//!    last on the way up, first on the way down.
//! 4. On the first failure the cascade halts, the failure is appended to the
//!    error stack and the component takes the operation's failure status.
//!    Siblings that already transitioned are left where they are.

use crate::error::{BackboneError, Result};
use crate::lifecycle::{Lifecycle, LifecycleComponent, LifecycleOperation};
use crate::monitor::ProgressReport;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) async fn drive<C>(target: &C, operation: LifecycleOperation) -> Result<()>
where
    C: Lifecycle + ?Sized,
{
    drive_with(target, operation, || async {}).await
}

/// [`drive`] plus a `managed` step that never fails the transition.
pub(crate) async fn drive_with<C, F, Fut>(
    target: &C,
    operation: LifecycleOperation,
    managed: F,
) -> Result<()>
where
    C: Lifecycle + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let node = target.component();
    let component = node.name();

    let Some(_guard) = node.try_begin() else {
        debug!(component, %operation, "Transition already in flight");
        return Err(BackboneError::ConcurrentTransition {
            component: component.to_string(),
            requested: operation,
        });
    };

    let current = node.status();
    if operation.is_noop_from(current) {
        debug!(component, %operation, status = %current, "Nothing to do");
        return Ok(());
    }
    if !operation.is_legal_from(current) {
        warn!(component, %operation, status = %current, "Illegal transition");
        return Err(BackboneError::InvalidLifecycleTransition {
            component: component.to_string(),
            current,
            requested: operation,
        });
    }

    node.set_status(operation.in_flight_status());
    debug!(component, %operation, "Transition started");

    let monitor = node.monitor();
    let task = format!("{} {}", operation.verb(), component);
    monitor.report_progress(ProgressReport::new(&task, 0, format!("{}", operation.in_flight_status())));

    let children = node.children();
    let outcome = if operation.cascades_forward() {
        let outcome = match run_hook(target, operation).await {
            Ok(()) => cascade(node, &task, children.iter(), operation).await,
            Err(e) => Err(e),
        };
        if outcome.is_ok() {
            managed().await;
        }
        outcome
    } else {
        managed().await;
        match cascade(node, &task, children.iter().rev(), operation).await {
            Ok(()) => run_hook(target, operation).await,
            Err(e) => Err(e),
        }
    };

    match outcome {
        Ok(()) => {
            let status = operation.success_status();
            node.set_status(status);
            monitor.report_progress(ProgressReport::new(&task, 100, format!("{status}")));
            info!(component, %status, "Transition complete");
            Ok(())
        }
        Err(message) => {
            let status = operation.failure_status();
            node.record_failure(status, message.clone());
            monitor.report_error(&message);
            warn!(component, %operation, %status, error = %message, "Transition failed");
            Err(BackboneError::TransitionFailed {
                component: component.to_string(),
                operation,
                status,
                message,
            })
        }
    }
}

async fn run_hook<C>(target: &C, operation: LifecycleOperation) -> std::result::Result<(), String>
where
    C: Lifecycle + ?Sized,
{
    let result = match operation {
        LifecycleOperation::Initialize => target.on_initialize().await,
        LifecycleOperation::Start => target.on_start().await,
        LifecycleOperation::Pause => target.on_pause().await,
        LifecycleOperation::Resume => target.on_resume().await,
        LifecycleOperation::Stop => target.on_stop().await,
        LifecycleOperation::Terminate => target.on_terminate().await,
    };
    result.map_err(|e| format!("Failed to {operation}: {e}"))
}

async fn cascade<'a, I>(
    node: &LifecycleComponent,
    task: &str,
    children: I,
    operation: LifecycleOperation,
) -> std::result::Result<(), String>
where
    I: ExactSizeIterator<Item = &'a Arc<dyn Lifecycle>>,
{
    let total = children.len() as u32 + 1;
    let monitor = node.monitor();
    for (done, child) in children.enumerate() {
        let name = child.component().name().to_string();
        child
            .transition(operation)
            .await
            .map_err(|e| format!("Child '{name}' failed to {operation}: {e}"))?;
        monitor.report_progress(ProgressReport::new(
            task,
            (done as u32 + 1) * 100 / total,
            format!("{name} done"),
        ));
    }
    Ok(())
}
