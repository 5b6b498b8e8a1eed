//! Client facade wiring the reconciler and waiter to the Kubernetes API
//!
//! [`Client`] owns a `kube::Client` and implements the [`ResourceOps`] and
//! [`WatchOps`] seams with `Api<DynamicObject>` handles built from each
//! resource's discovered [`ApiResource`] mapping. Everything else — patch
//! selection, failure aggregation, readiness state machines — lives in the
//! [`crate::reconcile`] and [`crate::wait`] modules and is exercised here
//! unchanged.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams, WatchParams};
use kube::discovery::ApiResource;
use tracing::debug;

use crate::patch::PatchFormat;
use crate::reconcile::{Reconciler, ResourceOps};
use crate::resource::{ReconcileResult, ResourceHandle, ResourceList};
use crate::wait::{PodPhase, Waiter, WatchOps, WatchStream};
use crate::Error;

/// A client capable of reconciling declared resources against a cluster
#[derive(Clone)]
pub struct Client {
    kube: kube::Client,
    namespace: String,
}

impl Client {
    /// Build a client from the default kubeconfig/in-cluster environment
    pub async fn try_default() -> Result<Self, Error> {
        Ok(Self::new(kube::Client::try_default().await?))
    }

    /// Wrap an existing `kube::Client`.
    ///
    /// The default namespace is taken from the client's configuration.
    pub fn new(kube: kube::Client) -> Self {
        let namespace = kube.default_namespace().to_string();
        Self { kube, namespace }
    }

    /// Override the namespace used for name-scoped pod watches
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// The namespace used for name-scoped pod watches
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Probe connectivity to the cluster API server
    pub async fn is_reachable(&self) -> Result<(), Error> {
        self.kube
            .apiserver_version()
            .await
            .map_err(|_| Error::Unreachable)?;
        Ok(())
    }

    /// Create every resource in the list, in declared order, fail-fast
    pub async fn create(&self, resources: ResourceList) -> Result<ReconcileResult, Error> {
        Reconciler::new(self.ops()).create(resources).await
    }

    /// Reconcile `desired` against live state, with `current` as the
    /// previously-applied record; see [`Reconciler::update`]
    pub async fn update(
        &self,
        current: &ResourceList,
        desired: ResourceList,
        force: bool,
    ) -> Result<ReconcileResult, Error> {
        Reconciler::new(self.ops()).update(current, desired, force).await
    }

    /// Delete every resource in the list, best-effort, collecting errors
    pub async fn delete(&self, resources: &ResourceList) -> (ReconcileResult, Vec<Error>) {
        Reconciler::new(self.ops()).delete(resources).await
    }

    /// Watch every resource until it reaches its readiness milestone
    pub async fn wait_until_ready(
        &self,
        resources: &ResourceList,
        timeout: Duration,
    ) -> Result<(), Error> {
        Waiter::new(self.ops()).wait_until_ready(resources, timeout).await
    }

    /// Wait until the named pod completes and return its terminal phase
    pub async fn wait_for_pod_completion(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<PodPhase, Error> {
        Waiter::new(self.ops())
            .wait_for_pod_completion(name, timeout)
            .await
    }

    fn ops(&self) -> RemoteOps {
        RemoteOps {
            client: self.kube.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Real remote operations over `Api<DynamicObject>`
struct RemoteOps {
    client: kube::Client,
    namespace: String,
}

impl RemoteOps {
    fn api_for(&self, handle: &ResourceHandle) -> Api<DynamicObject> {
        match handle.id().namespace.as_deref() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, handle.api_resource()),
            None => Api::all_with(self.client.clone(), handle.api_resource()),
        }
    }
}

#[async_trait]
impl ResourceOps for RemoteOps {
    async fn get(&self, handle: &ResourceHandle) -> Result<Option<DynamicObject>, Error> {
        match self.api_for(handle).get(&handle.id().name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, handle: &ResourceHandle) -> Result<DynamicObject, Error> {
        let obj = self
            .api_for(handle)
            .create(&PostParams::default(), handle.object())
            .await?;
        Ok(obj)
    }

    async fn patch(
        &self,
        handle: &ResourceHandle,
        format: PatchFormat,
        body: serde_json::Value,
    ) -> Result<DynamicObject, Error> {
        let api = self.api_for(handle);
        let params = PatchParams::default();
        debug!(
            kind = %handle.id().kind,
            name = %handle.id().name,
            format = ?format,
            "Sending patch"
        );
        let obj = match format {
            PatchFormat::Strategic => {
                api.patch(&handle.id().name, &params, &Patch::Strategic(body))
                    .await?
            }
            PatchFormat::Merge => {
                api.patch(&handle.id().name, &params, &Patch::Merge(body))
                    .await?
            }
        };
        Ok(obj)
    }

    async fn delete(&self, handle: &ResourceHandle) -> Result<(), Error> {
        // Cascading deletion of dependents is asynchronous: the call returns
        // once the delete request is accepted, not once dependents are gone
        self.api_for(handle)
            .delete(&handle.id().name, &DeleteParams::background())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WatchOps for RemoteOps {
    async fn watch(&self, handle: &ResourceHandle) -> Result<WatchStream, Error> {
        let api = self.api_for(handle);
        let wp =
            WatchParams::default().fields(&format!("metadata.name={}", handle.id().name));
        let version = handle
            .object()
            .metadata
            .resource_version
            .clone()
            .unwrap_or_else(|| "0".to_string());
        let stream = api.watch(&wp, &version).await?;
        Ok(stream.boxed())
    }

    async fn watch_pod(&self, name: &str, timeout: Duration) -> Result<WatchStream, Error> {
        let ar = ApiResource::erase::<Pod>(&());
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &self.namespace, &ar);
        let wp = WatchParams::default()
            .fields(&format!("metadata.name={name}"))
            .timeout(timeout.as_secs() as u32);
        let stream = api.watch(&wp, "0").await?;
        Ok(stream.boxed())
    }
}
