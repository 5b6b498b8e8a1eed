//! Shared helpers for unit tests

use kube::api::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use serde_json::{json, Value};

use crate::resource::ResourceHandle;
use crate::Error;

/// Build an [`ApiResource`] mapping for an apiVersion/kind pair
pub(crate) fn mapping(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind))
}

/// Deserialize a JSON value into a [`DynamicObject`]
pub(crate) fn dyn_obj(value: Value) -> DynamicObject {
    serde_json::from_value(value).expect("valid dynamic object")
}

/// Build a [`ResourceHandle`] from identity parts plus optional extra body
/// fields (e.g. `{"spec": ...}`)
pub(crate) fn handle(
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
    body: Option<Value>,
) -> ResourceHandle {
    let mut object = json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {"name": name}
    });
    if let Some(ns) = namespace {
        object["metadata"]["namespace"] = ns.into();
    }
    if let Some(Value::Object(extra)) = body {
        for (key, value) in extra {
            object[key] = value;
        }
    }
    ResourceHandle::new(dyn_obj(object), mapping(api_version, kind)).expect("valid handle")
}

/// A 404 API error as the server would return it
pub(crate) fn not_found_error(msg: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: msg.to_string(),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

/// A 409 conflict API error as the server would return it
pub(crate) fn conflict_error(msg: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: msg.to_string(),
        reason: "Conflict".to_string(),
        code: 409,
    }))
}
