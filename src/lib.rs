//! Converge - declarative resource reconciliation client for Kubernetes
//!
//! Given a desired set of resource manifests (a [`ResourceList`]) and
//! optionally the previously-applied set, converge creates, patches, or
//! deletes server-side objects until actual state matches desired state, and
//! can block until resources reach a kind-specific readiness milestone.
//!
//! # What it does per resource
//!
//! - Absent on the server → create it.
//! - Present → compute the smallest patch toward desired: none at all when
//!   nothing changed, a schema-aware strategic merge patch for registered
//!   kinds, a generic JSON merge patch (RFC 7396) for everything else.
//! - A rejected patch can fall back to delete-and-recreate when the caller
//!   opts into `force`.
//! - Declared previously but no longer desired → delete, with background
//!   cascading propagation.
//!
//! Resources are processed strictly in declared order with no internal
//! parallelism; ordering across heterogeneous kinds (namespaces before
//! namespaced objects) is the caller's responsibility and is never changed
//! here.
//!
//! # Modules
//!
//! - [`resource`] - Resource handles, ordered lists, reconciliation results
//! - [`schema`] - Static registry of known kinds and their list-merge keys
//! - [`patch`] - Patch-format selection and the two diff engines
//! - [`reconcile`] - Create/update/delete orchestration with failure
//!   aggregation
//! - [`wait`] - Watch-driven readiness state machine
//! - [`client`] - Facade wiring everything to the cluster API
//! - [`error`] - Error types
//!
//! Manifest parsing is deliberately out of scope: a separate component turns
//! raw manifest text into the [`ResourceList`] input consumed here.

#![deny(missing_docs)]

pub mod client;
pub mod error;
pub mod patch;
pub mod reconcile;
pub mod resource;
pub mod schema;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Client;
pub use error::{AggregateError, Error};
pub use patch::{compute_patch, PatchFormat, PatchPlan};
pub use reconcile::{Reconciler, ResourceOps};
pub use resource::{ReconcileResult, ResourceHandle, ResourceId, ResourceList};
pub use wait::{PodPhase, Waiter, WatchOps, WatchOutcome, WatchStream};
