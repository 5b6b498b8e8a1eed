//! Reconciliation of declared resource sets against live server state
//!
//! The [`Reconciler`] walks a [`ResourceList`] strictly in declared order and
//! issues creates, patches, and deletes through a [`ResourceOps`] seam.
//! Propagation policy differs per operation: [`Reconciler::create`] is
//! fail-fast, [`Reconciler::delete`] is best-effort and collects errors, and
//! [`Reconciler::update`] collects per-resource patch failures but aborts on
//! anything that poisons the whole call (a missing last-applied record, a
//! failed create).

use async_trait::async_trait;
use kube::api::DynamicObject;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::patch::{self, PatchFormat};
use crate::resource::{ReconcileResult, ResourceHandle, ResourceList};
use crate::Error;

/// Remote object operations the reconciler needs.
///
/// Implemented for the real API by [`crate::client::Client`]; mocked in
/// tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceOps: Send + Sync {
    /// Fetch the live object for a handle, `None` when absent
    async fn get(&self, handle: &ResourceHandle) -> Result<Option<DynamicObject>, Error>;

    /// Create the handle's object, returning the server's representation
    async fn create(&self, handle: &ResourceHandle) -> Result<DynamicObject, Error>;

    /// Apply a patch in the given format, returning the server's
    /// representation
    async fn patch(
        &self,
        handle: &ResourceHandle,
        format: PatchFormat,
        body: serde_json::Value,
    ) -> Result<DynamicObject, Error>;

    /// Delete the handle's object with background cascading propagation
    async fn delete(&self, handle: &ResourceHandle) -> Result<(), Error>;
}

/// Drives creates, updates, and deletes over ordered resource lists
pub struct Reconciler<O> {
    ops: O,
}

impl<O: ResourceOps> Reconciler<O> {
    /// Create a reconciler over the given remote operations
    pub fn new(ops: O) -> Self {
        Self { ops }
    }

    /// Create every resource in the list, in order, fail-fast.
    ///
    /// Each created handle is refreshed with the server's returned object.
    /// Fails with [`Error::EmptyInput`] when the list is empty; the first
    /// create failure aborts the call and no result is returned.
    pub async fn create(&self, mut resources: ResourceList) -> Result<ReconcileResult, Error> {
        info!(count = resources.len(), "Creating resources");
        if resources.is_empty() {
            return Err(Error::EmptyInput);
        }

        for target in resources.iter_mut() {
            let obj = self.ops.create(target).await?;
            target.refresh(obj);
            debug!(
                kind = %target.id().kind,
                name = %target.id().name,
                "Created resource"
            );
        }

        Ok(ReconcileResult {
            created: resources,
            ..ReconcileResult::default()
        })
    }

    /// Delete every resource in the list, best-effort.
    ///
    /// Attempts all resources even after individual failures; "not found" is
    /// treated as success. Successfully deleted resources are returned in the
    /// result alongside whatever errors were collected. An empty list yields
    /// the single "already deleted" error.
    pub async fn delete(&self, resources: &ResourceList) -> (ReconcileResult, Vec<Error>) {
        let mut result = ReconcileResult::default();
        let mut errs = Vec::new();

        if resources.is_empty() {
            return (result, vec![Error::AlreadyDeleted]);
        }

        for target in resources {
            info!(
                kind = %target.id().kind,
                name = %target.id().name,
                "Starting delete"
            );
            match self.ops.delete(target).await {
                Ok(()) => result.deleted.push(target.clone()),
                Err(err) if err.is_not_found() => {
                    debug!(
                        kind = %target.id().kind,
                        name = %target.id().name,
                        "Resource already gone"
                    );
                    result.deleted.push(target.clone());
                }
                Err(err) => errs.push(err),
            }
        }

        (result, errs)
    }

    /// Three-way reconciliation of `desired` against live state, with
    /// `current` as the previously-applied record.
    ///
    /// Resources absent from the server are created; present ones are patched
    /// toward desired (a no-op patch still refreshes the handle); resources
    /// present only in `current` are deleted afterwards. Per-resource patch
    /// failures are collected and reported as one [`Error::Aggregate`]
    /// carrying the partial result; stale deletions are attempted even when
    /// patches failed.
    ///
    /// A desired resource that exists on the server but has no entry in
    /// `current` fails the whole call with [`Error::StaleState`].
    pub async fn update(
        &self,
        current: &ResourceList,
        mut desired: ResourceList,
        force: bool,
    ) -> Result<ReconcileResult, Error> {
        let mut result = ReconcileResult::default();
        let mut failures: Vec<String> = Vec::new();

        info!(count = desired.len(), "Checking resources for changes");

        for target in desired.iter_mut() {
            match self.ops.get(target).await? {
                None => {
                    // Absent on the server: create it
                    let obj = self.ops.create(target).await?;
                    target.refresh(obj);
                    info!(
                        kind = %target.id().kind,
                        name = %target.id().name,
                        "Created a new resource"
                    );
                    result.created.push(target.clone());
                }
                Some(live) => {
                    if current.get(target.id()).is_none() {
                        return Err(Error::stale_state(&target.id().kind, &target.id().name));
                    }

                    let baseline = if force { None } else { Some(&live) };
                    if let Err(err) = self.apply_patch(target, baseline, force).await {
                        warn!(
                            kind = %target.id().kind,
                            name = %target.id().name,
                            error = %err,
                            "Error updating resource"
                        );
                        failures.push(err.to_string());
                    }
                    // Recorded regardless of patch outcome; failures are
                    // reported in aggregate below
                    result.updated.push(target.clone());
                }
            }
        }

        // Stale resources removed by the new declaration. Deletions are
        // always attempted, even when patches above failed; a failed delete
        // is logged, never fatal.
        for stale in current.difference(&desired).iter() {
            info!(
                kind = %stale.id().kind,
                name = %stale.id().name,
                namespace = stale.id().namespace.as_deref().unwrap_or_default(),
                "Deleting stale resource"
            );
            match self.ops.delete(stale).await {
                Ok(()) => result.deleted.push(stale.clone()),
                Err(err) => warn!(
                    kind = %stale.id().kind,
                    name = %stale.id().name,
                    error = %err,
                    "Failed to delete stale resource"
                ),
            }
        }

        if failures.is_empty() {
            Ok(result)
        } else {
            Err(Error::aggregate(failures, result))
        }
    }

    /// Compute and apply the patch converging one live resource to its
    /// desired state.
    ///
    /// A `None` baseline means unconditional overwrite (forced update). When
    /// the server rejects the patch and `force` is set, the resource is
    /// deleted and recreated from desired — a destructive fallback with an
    /// observable gap where the resource does not exist.
    async fn apply_patch(
        &self,
        target: &mut ResourceHandle,
        baseline: Option<&DynamicObject>,
        force: bool,
    ) -> Result<(), Error> {
        let kind = target.id().kind.clone();
        let name = target.id().name.clone();

        let plan = patch::compute_patch(target, baseline)?;

        let Some(body) = plan.body else {
            debug!(kind = %kind, name = %name, "No changes detected");
            // Refresh anyway so downstream logic sees current labels and
            // annotations from the server
            let live = self
                .ops
                .get(target)
                .await?
                .ok_or_else(|| Error::Refresh {
                    kind: kind.clone(),
                    name: name.clone(),
                })?;
            target.refresh(live);
            return Ok(());
        };

        debug!(kind = %kind, name = %name, format = ?plan.format, "Preparing patch");
        match self.ops.patch(target, plan.format, body).await {
            Ok(obj) => {
                target.refresh(obj);
                Ok(())
            }
            Err(err) if force => {
                warn!(kind = %kind, name = %name, error = %err, "Patch rejected, recreating");
                self.ops
                    .delete(target)
                    .await
                    .map_err(|e| Error::recreate(&kind, &name, e.to_string()))?;
                info!(kind = %kind, name = %name, "Deleted resource");

                let obj = self
                    .ops
                    .create(target)
                    .await
                    .map_err(|e| Error::recreate(&kind, &name, e.to_string()))?;
                target.refresh(obj);
                info!(kind = %kind, name = %name, "Recreated resource");
                Ok(())
            }
            Err(err) => Err(Error::patch_rejected(&kind, &name, err.to_string())),
        }
    }
}
