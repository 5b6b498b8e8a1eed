//! Resource handles, ordered resource lists, and reconciliation results
//!
//! A [`ResourceHandle`] pairs a declared object (as a [`DynamicObject`]) with
//! the API mapping needed to address it on the wire. A [`ResourceList`] keeps
//! handles in declared manifest order; that order is significant for
//! create/update/delete sequencing (e.g. namespaces before namespaced
//! objects) and is never changed by the core.

use std::collections::HashSet;

use kube::api::DynamicObject;
use kube::discovery::ApiResource;

use crate::Error;

/// Identity of a declared resource: (apiVersion, kind, namespace, name).
///
/// Unique within a [`ResourceList`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// API version, e.g. `apps/v1`
    pub api_version: String,
    /// Kind, e.g. `Deployment`
    pub kind: String,
    /// Namespace, `None` for cluster-scoped resources
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

impl ResourceId {
    /// Group part of the API version (empty for the core group)
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }
}

/// A declared resource plus everything needed to operate on it remotely.
///
/// Carries the object's last-known serialized representation; after a create
/// or patch the handle is refreshed with the server's returned object so
/// downstream logic sees authoritative metadata (assigned resource version,
/// server-populated labels, and so on).
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    id: ResourceId,
    object: DynamicObject,
    mapping: ApiResource,
}

impl ResourceHandle {
    /// Build a handle from a declared object and its discovered API mapping.
    ///
    /// The identity is taken from the object's type metadata and object
    /// metadata, falling back to the mapping for apiVersion/kind when the
    /// object carries no type information.
    pub fn new(object: DynamicObject, mapping: ApiResource) -> Result<Self, Error> {
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::invalid_resource("object has no name"))?;

        let (api_version, kind) = match &object.types {
            Some(t) if !t.kind.is_empty() => (t.api_version.clone(), t.kind.clone()),
            _ => (mapping.api_version.clone(), mapping.kind.clone()),
        };

        let id = ResourceId {
            api_version,
            kind,
            namespace: object.metadata.namespace.clone(),
            name,
        };

        Ok(Self {
            id,
            object,
            mapping,
        })
    }

    /// The resource's identity
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// The last-known representation of the object
    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    /// The API mapping used to address the resource remotely
    pub fn api_resource(&self) -> &ApiResource {
        &self.mapping
    }

    /// Replace the stored object with the server's returned representation
    pub fn refresh(&mut self, object: DynamicObject) {
        self.object = object;
    }
}

/// Ordered collection of resource handles.
///
/// Insertion order is the declared manifest order. Identity is unique within
/// the list; pushing a handle with an identity already present replaces the
/// earlier entry in place (last write wins).
#[derive(Debug, Clone, Default)]
pub struct ResourceList {
    items: Vec<ResourceHandle>,
}

impl ResourceList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handle, replacing any earlier entry with the same identity
    pub fn push(&mut self, handle: ResourceHandle) {
        match self.items.iter_mut().find(|h| h.id == handle.id) {
            Some(existing) => *existing = handle,
            None => self.items.push(handle),
        }
    }

    /// Look up a handle by identity
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceHandle> {
        self.items.iter().find(|h| &h.id == id)
    }

    /// All handles in `self` whose identity is absent from `other`,
    /// order-preserving
    pub fn difference(&self, other: &ResourceList) -> ResourceList {
        let known: HashSet<&ResourceId> = other.items.iter().map(|h| &h.id).collect();
        ResourceList {
            items: self
                .items
                .iter()
                .filter(|h| !known.contains(&h.id))
                .cloned()
                .collect(),
        }
    }

    /// Number of handles in the list
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list holds no handles
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over handles in declared order
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceHandle> {
        self.items.iter()
    }

    /// Iterate mutably over handles in declared order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ResourceHandle> {
        self.items.iter_mut()
    }
}

impl FromIterator<ResourceHandle> for ResourceList {
    fn from_iter<I: IntoIterator<Item = ResourceHandle>>(iter: I) -> Self {
        let mut list = ResourceList::new();
        for handle in iter {
            list.push(handle);
        }
        list
    }
}

impl IntoIterator for ResourceList {
    type Item = ResourceHandle;
    type IntoIter = std::vec::IntoIter<ResourceHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceList {
    type Item = &'a ResourceHandle;
    type IntoIter = std::slice::Iter<'a, ResourceHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// What one reconciliation call created, updated, and deleted.
///
/// Owned by a single call and discarded after the caller consumes it. When a
/// call fails part way through, whatever was populated before the failure
/// travels with the error (see [`crate::error::AggregateError`]).
#[derive(Debug, Clone, Default)]
pub struct ReconcileResult {
    /// Resources created by this call
    pub created: ResourceList,
    /// Resources patched (or found unchanged) by this call
    pub updated: ResourceList,
    /// Resources deleted by this call
    pub deleted: ResourceList,
}
