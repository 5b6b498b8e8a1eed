//! Watch-driven readiness waiting
//!
//! [`Waiter`] runs a bounded watch per resource and reports a terminal
//! [`WatchOutcome`]. Only two kinds carry a real readiness predicate:
//!
//! - **Job**: ready when its `Complete` condition is `True`, failed when its
//!   `Failed` condition is `True` (the condition's reason is reported).
//! - **Pod**: ready when the phase reaches `Succeeded`, failed on `Failed`.
//!
//! Every other kind is ready on the first Added or Modified event — observed
//! existence is the best milestone available for things like ConfigMaps and
//! Secrets. A Deleted event is terminal success for any kind: the resource
//! disappearing is not an error for this wait.
//!
//! Each resource gets the full requested timeout independently; expiry aborts
//! the remaining wait list (fail-fast, unlike deletes).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DynamicObject, WatchEvent};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::resource::{ResourceHandle, ResourceList};
use crate::Error;

/// Stream of raw watch events for one resource
pub type WatchStream = BoxStream<'static, Result<WatchEvent<DynamicObject>, kube::Error>>;

/// Remote watch operations the waiter needs.
///
/// Implemented for the real API by [`crate::client::Client`]; mocked in
/// tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WatchOps: Send + Sync {
    /// Open a watch on the single resource a handle addresses
    async fn watch(&self, handle: &ResourceHandle) -> Result<WatchStream, Error>;

    /// Open a name-scoped watch on pods in the default namespace, bounded
    /// server-side by `timeout`
    async fn watch_pod(&self, name: &str, timeout: Duration) -> Result<WatchStream, Error>;
}

/// Terminal signal for one resource's readiness wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The resource reached its readiness milestone
    Ready,
    /// The resource failed to reach its milestone, with a reason
    Failed(String),
    /// The watch exceeded its deadline
    TimedOut,
    /// The resource was deleted while being watched (terminal success)
    Deleted,
}

/// Terminal phase of a completed pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    /// The pod ran to completion
    Succeeded,
    /// The pod terminated in failure
    Failed,
    /// The watch ended before the pod reached a terminal phase
    Unknown,
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(phase)
    }
}

/// Readiness predicate for a resource kind.
///
/// A closed table: new kinds get real predicates by adding a variant and a
/// row to [`READY_CHECKS`], not by subclassing anything.
#[derive(Debug, Clone, Copy)]
enum ReadyCheck {
    /// First Added/Modified event counts as ready
    Generic,
    /// Watch Job status conditions for completion
    Job,
    /// Watch pod phase for successful completion
    Pod,
}

/// Kinds with a real readiness predicate; everything else is `Generic`
static READY_CHECKS: &[(&str, ReadyCheck)] = &[("Job", ReadyCheck::Job), ("Pod", ReadyCheck::Pod)];

impl ReadyCheck {
    fn for_kind(kind: &str) -> Self {
        READY_CHECKS
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, check)| *check)
            .unwrap_or(ReadyCheck::Generic)
    }

    /// Evaluate one observed object; `None` means keep watching
    fn evaluate(self, obj: &DynamicObject, name: &str) -> Result<Option<WatchOutcome>, Error> {
        match self {
            ReadyCheck::Generic => Ok(Some(WatchOutcome::Ready)),
            ReadyCheck::Job => {
                let job: Job = to_typed(obj, name, "Job")?;
                Ok(job_milestone(&job, name))
            }
            ReadyCheck::Pod => {
                let pod: Pod = to_typed(obj, name, "Pod")?;
                Ok(pod_milestone(&pod, name))
            }
        }
    }
}

/// Reinterpret a watched object as its typed form
fn to_typed<T: serde::de::DeserializeOwned>(
    obj: &DynamicObject,
    name: &str,
    kind: &str,
) -> Result<T, Error> {
    let value = serde_json::to_value(obj)
        .map_err(|e| Error::serialization(format!("serializing watched object {name}: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization(format!("expected {name} to be a {kind}: {e}")))
}

fn job_milestone(job: &Job, name: &str) -> Option<WatchOutcome> {
    let status = job.status.as_ref()?;

    if let Some(conditions) = &status.conditions {
        for condition in conditions {
            if condition.type_ == "Complete" && condition.status == "True" {
                return Some(WatchOutcome::Ready);
            }
            if condition.type_ == "Failed" && condition.status == "True" {
                let reason = condition.reason.clone().unwrap_or_default();
                return Some(WatchOutcome::Failed(format!("job failed: {reason}")));
            }
        }
    }

    debug!(
        name = %name,
        active = status.active.unwrap_or(0),
        failed = status.failed.unwrap_or(0),
        succeeded = status.succeeded.unwrap_or(0),
        "Job not yet complete"
    );
    None
}

fn pod_milestone(pod: &Pod, name: &str) -> Option<WatchOutcome> {
    match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Succeeded") => Some(WatchOutcome::Ready),
        Some("Failed") => Some(WatchOutcome::Failed(format!("pod {name} failed"))),
        phase => {
            debug!(name = %name, phase = phase.unwrap_or("unknown"), "Pod not yet complete");
            None
        }
    }
}

/// Waits for resources to reach their readiness milestone via bounded watches
pub struct Waiter<W> {
    ops: W,
}

impl<W: WatchOps> Waiter<W> {
    /// Create a waiter over the given watch operations
    pub fn new(ops: W) -> Self {
        Self { ops }
    }

    /// Watch every resource in the list, in order, until each reaches its
    /// readiness milestone.
    ///
    /// Fail-fast: a failed or timed-out resource aborts the remaining list.
    /// Each resource gets the full `timeout` independently — there is no
    /// shared budget across the list.
    pub async fn wait_until_ready(
        &self,
        resources: &ResourceList,
        timeout: Duration,
    ) -> Result<(), Error> {
        if resources.is_empty() {
            return Err(Error::EmptyInput);
        }

        for handle in resources {
            let kind = &handle.id().kind;
            let name = &handle.id().name;
            info!(
                kind = %kind,
                name = %name,
                timeout_secs = timeout.as_secs(),
                "Watching resource until ready"
            );

            match self.watch_one(handle, timeout).await? {
                WatchOutcome::Ready => debug!(kind = %kind, name = %name, "Resource ready"),
                WatchOutcome::Deleted => {
                    debug!(kind = %kind, name = %name, "Resource deleted during watch");
                }
                WatchOutcome::Failed(reason) => {
                    return Err(Error::watch_failed(name, reason));
                }
                WatchOutcome::TimedOut => {
                    return Err(Error::timeout(kind, name));
                }
            }
        }

        Ok(())
    }

    /// Run one resource's watch state machine to a terminal outcome
    async fn watch_one(
        &self,
        handle: &ResourceHandle,
        timeout: Duration,
    ) -> Result<WatchOutcome, Error> {
        let check = ReadyCheck::for_kind(&handle.id().kind);
        let stream = self.ops.watch(handle).await?;

        match tokio::time::timeout(timeout, observe(stream, check, &handle.id().name)).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(WatchOutcome::TimedOut),
        }
    }

    /// Wait until the named pod enters a completed phase and return it.
    ///
    /// A narrower, single-resource convenience on the same watch primitive:
    /// no resource-list abstraction, just a name-scoped watch. Returns
    /// [`PodPhase::Unknown`] when the watch ends without a terminal phase.
    pub async fn wait_for_pod_completion(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<PodPhase, Error> {
        info!(name = %name, timeout_secs = timeout.as_secs(), "Waiting for pod completion");
        let mut stream = self.ops.watch_pod(name, timeout).await?;

        while let Some(event) = stream.next().await {
            match event? {
                WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                    let pod: Pod = to_typed(&obj, name, "Pod")?;
                    match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
                        Some("Succeeded") => return Ok(PodPhase::Succeeded),
                        Some("Failed") => return Ok(PodPhase::Failed),
                        phase => {
                            debug!(name = %name, phase = phase.unwrap_or("unknown"), "Pod still running");
                        }
                    }
                }
                WatchEvent::Bookmark(_) => {}
                WatchEvent::Error(e) => {
                    return Err(Error::watch_failed(name, format!("error event: {}", e.message)));
                }
            }
        }

        Ok(PodPhase::Unknown)
    }
}

/// Drive a watch stream until a terminal outcome.
///
/// The caller bounds this with a deadline; on its own it runs until the
/// stream yields a terminal event or closes.
async fn observe(
    mut stream: WatchStream,
    check: ReadyCheck,
    name: &str,
) -> Result<WatchOutcome, Error> {
    while let Some(event) = stream.next().await {
        match event? {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                debug!(name = %name, "Add/Modify event");
                if let Some(outcome) = check.evaluate(&obj, name)? {
                    return Ok(outcome);
                }
            }
            WatchEvent::Deleted(_) => {
                debug!(name = %name, "Deleted event");
                return Ok(WatchOutcome::Deleted);
            }
            WatchEvent::Bookmark(_) => {}
            WatchEvent::Error(e) => {
                return Ok(WatchOutcome::Failed(format!(
                    "error event: {} ({})",
                    e.message, e.reason
                )));
            }
        }
    }

    Ok(WatchOutcome::Failed(
        "watch stream closed before the resource was ready".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dyn_obj, handle};
    use futures::stream;
    use serde_json::{json, Value};

    fn events(objs: Vec<WatchEvent<DynamicObject>>) -> WatchStream {
        stream::iter(objs.into_iter().map(Ok)).boxed()
    }

    fn job_event(conditions: Value, counters: Value) -> WatchEvent<DynamicObject> {
        let mut status = json!({"conditions": conditions});
        if let (Value::Object(status_map), Value::Object(extra)) = (&mut status, counters) {
            for (k, v) in extra {
                status_map.insert(k, v);
            }
        }
        WatchEvent::Modified(dyn_obj(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {"name": "migrate", "namespace": "prod"},
            "status": status
        })))
    }

    fn pod_event(phase: &str) -> WatchEvent<DynamicObject> {
        WatchEvent::Modified(dyn_obj(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "runner", "namespace": "prod"},
            "status": {"phase": phase}
        })))
    }

    fn job_handle() -> ResourceHandle {
        handle("batch/v1", "Job", Some("prod"), "migrate", None)
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn wait_on_empty_list_fails() {
        let ops = MockWatchOps::new();
        let err = Waiter::new(ops)
            .wait_until_ready(&ResourceList::new(), WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[tokio::test]
    async fn generic_kinds_are_ready_on_first_event() {
        let cfg = handle("v1", "ConfigMap", Some("prod"), "cfg", None);

        let mut ops = MockWatchOps::new();
        ops.expect_watch().times(1).returning(|h| {
            Ok(events(vec![WatchEvent::Added(h.object().clone())]))
        });

        let resources: ResourceList = [cfg].into_iter().collect();
        Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn job_completion_counts_as_ready() {
        let mut ops = MockWatchOps::new();
        ops.expect_watch().times(1).returning(|_| {
            Ok(events(vec![
                job_event(json!([]), json!({"active": 1})),
                job_event(
                    json!([{"type": "Complete", "status": "True"}]),
                    json!({"succeeded": 1}),
                ),
            ]))
        });

        let resources: ResourceList = [job_handle()].into_iter().collect();
        Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn job_failure_reports_the_condition_reason() {
        let mut ops = MockWatchOps::new();
        ops.expect_watch().times(1).returning(|_| {
            Ok(events(vec![job_event(
                json!([{"type": "Failed", "status": "True", "reason": "BackoffLimitExceeded"}]),
                json!({"failed": 4}),
            )]))
        });

        let resources: ResourceList = [job_handle()].into_iter().collect();
        let err = Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WatchFailed { .. }));
        assert!(err.to_string().contains("BackoffLimitExceeded"));
    }

    #[tokio::test]
    async fn job_that_never_completes_times_out() {
        let mut ops = MockWatchOps::new();
        // A stream that stays open without ever yielding a terminal event
        ops.expect_watch()
            .times(1)
            .returning(|_| Ok(stream::pending().boxed()));

        let resources: ResourceList = [job_handle()].into_iter().collect();
        let err = Waiter::new(ops)
            .wait_until_ready(&resources, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn deletion_during_watch_is_terminal_success() {
        let mut ops = MockWatchOps::new();
        ops.expect_watch().times(1).returning(|h| {
            Ok(events(vec![WatchEvent::Deleted(h.object().clone())]))
        });

        let resources: ResourceList = [job_handle()].into_iter().collect();
        Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_event_fails_the_wait() {
        let mut ops = MockWatchOps::new();
        ops.expect_watch().times(1).returning(|_| {
            Ok(events(vec![WatchEvent::Error(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: "too old resource version".to_string(),
                reason: "Expired".to_string(),
                code: 410,
            })]))
        });

        let resources: ResourceList = [job_handle()].into_iter().collect();
        let err = Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WatchFailed { .. }));
        assert!(err.to_string().contains("too old resource version"));
    }

    #[tokio::test]
    async fn pod_success_and_failure_are_terminal() {
        let pod = handle("v1", "Pod", Some("prod"), "runner", None);

        let mut ops = MockWatchOps::new();
        ops.expect_watch()
            .times(1)
            .returning(|_| Ok(events(vec![pod_event("Running"), pod_event("Succeeded")])));

        let resources: ResourceList = [pod.clone()].into_iter().collect();
        Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap();

        let mut ops = MockWatchOps::new();
        ops.expect_watch()
            .times(1)
            .returning(|_| Ok(events(vec![pod_event("Failed")])));

        let resources: ResourceList = [pod].into_iter().collect();
        let err = Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WatchFailed { .. }));
    }

    #[tokio::test]
    async fn when_the_first_resource_times_out_the_rest_are_not_watched() {
        let first = job_handle();
        let second = handle("v1", "ConfigMap", Some("prod"), "cfg", None);

        let mut ops = MockWatchOps::new();
        // times(1): the second resource must never be watched
        ops.expect_watch()
            .times(1)
            .returning(|_| Ok(stream::pending().boxed()));

        let resources: ResourceList = [first, second].into_iter().collect();
        let err = Waiter::new(ops)
            .wait_until_ready(&resources, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn stream_closing_early_fails_the_wait() {
        let mut ops = MockWatchOps::new();
        ops.expect_watch()
            .times(1)
            .returning(|_| Ok(events(vec![job_event(json!([]), json!({"active": 1}))])));

        let resources: ResourceList = [job_handle()].into_iter().collect();
        let err = Waiter::new(ops)
            .wait_until_ready(&resources, WAIT)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stream closed"));
    }

    // =========================================================================
    // wait_for_pod_completion
    // =========================================================================

    #[tokio::test]
    async fn pod_completion_returns_terminal_phase() {
        let mut ops = MockWatchOps::new();
        ops.expect_watch_pod()
            .times(1)
            .returning(|_, _| Ok(events(vec![pod_event("Pending"), pod_event("Succeeded")])));

        let phase = Waiter::new(ops)
            .wait_for_pod_completion("runner", WAIT)
            .await
            .unwrap();
        assert_eq!(phase, PodPhase::Succeeded);
    }

    #[tokio::test]
    async fn pod_watch_closing_without_terminal_phase_is_unknown() {
        let mut ops = MockWatchOps::new();
        ops.expect_watch_pod()
            .times(1)
            .returning(|_, _| Ok(events(vec![pod_event("Running")])));

        let phase = Waiter::new(ops)
            .wait_for_pod_completion("runner", WAIT)
            .await
            .unwrap();
        assert_eq!(phase, PodPhase::Unknown);
    }
}
