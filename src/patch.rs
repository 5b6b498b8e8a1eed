//! Patch computation: decide whether a patch is needed and in which format
//!
//! Two formats are produced:
//!
//! - **Strategic merge patch** for kinds in the [`crate::schema`] registry: a
//!   schema-aware two-way merge where keyed list fields merge element-wise by
//!   their declared merge key and removed elements carry a `$patch: delete`
//!   directive. This preserves fields set by other actors that the current
//!   request doesn't mention.
//! - **Generic JSON merge patch** (RFC 7396) for everything else — custom
//!   resources, CRDs, any schemaless object: a pure old/new JSON diff where
//!   removed keys become `null` and arrays are replaced wholesale.
//!
//! When the serialized desired and live objects are identical, no patch is
//! produced at all and nothing is written to the server.

use kube::api::DynamicObject;
use serde_json::{json, Map, Value};

use crate::resource::ResourceHandle;
use crate::{schema, Error};

/// Wire format of a computed patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    /// Schema-aware strategic merge patch
    Strategic,
    /// Generic JSON merge patch (RFC 7396)
    Merge,
}

/// A computed patch for one resource: body (if any) plus wire format.
///
/// Computed per resource and consumed immediately, never persisted.
#[derive(Debug, Clone)]
pub struct PatchPlan {
    /// Patch body, `None` when desired and live are identical
    pub body: Option<Value>,
    /// Format the body must be sent as
    pub format: PatchFormat,
}

impl PatchPlan {
    /// Whether the patch is a no-op (nothing to send)
    pub fn is_noop(&self) -> bool {
        self.body.is_none()
    }
}

/// Compute the patch that converges `live` toward the desired object.
///
/// `live` is the diff baseline; passing `None` means "treat the resource as
/// unconditionally overwritten" (the forced-update path) and yields a patch
/// carrying the full desired content.
///
/// Serialization failure is fatal for the resource; an unregistered kind is
/// not an error, it just selects the generic format.
pub fn compute_patch(
    desired: &ResourceHandle,
    live: Option<&DynamicObject>,
) -> Result<PatchPlan, Error> {
    let new = serde_json::to_value(desired.object())
        .map_err(|e| Error::serialization(format!("serializing desired configuration: {e}")))?;

    let format = match schema::lookup(&desired.id().api_version, &desired.id().kind) {
        Some(_) => PatchFormat::Strategic,
        None => PatchFormat::Merge,
    };

    let live = match live {
        Some(live) => live,
        // Forced update: replay the full desired content
        None => {
            return Ok(PatchPlan {
                body: Some(new),
                format,
            })
        }
    };

    let old = serde_json::to_value(live)
        .map_err(|e| Error::serialization(format!("serializing live configuration: {e}")))?;

    if old == new {
        return Ok(PatchPlan { body: None, format });
    }

    let body = match schema::lookup(&desired.id().api_version, &desired.id().kind) {
        Some(kind_schema) => strategic_diff(&old, &new, kind_schema),
        None => json_merge_diff(&old, &new),
    };

    Ok(PatchPlan {
        body: Some(body),
        format,
    })
}

/// RFC 7396 merge-patch diff: recursive on objects, wholesale on everything
/// else, removed keys become `null`.
fn json_merge_diff(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) if old_value != new_value => {
                        patch.insert(key.clone(), json_merge_diff(old_value, new_value));
                    }
                    Some(_) => {}
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// Schema-aware two-way merge diff.
///
/// Like the generic diff, except list fields with a declared merge key merge
/// element-wise on that key instead of being replaced wholesale.
fn strategic_diff(old: &Value, new: &Value, kind_schema: &schema::KindSchema) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) if old_value != new_value => {
                        let entry = match (old_value, new_value, kind_schema.merge_key(key)) {
                            (Value::Array(old_arr), Value::Array(new_arr), Some(merge_key)) => {
                                match keyed_list_diff(old_arr, new_arr, merge_key, kind_schema) {
                                    Some(list_patch) => list_patch,
                                    // Elements without the merge key: replace wholesale
                                    None => new_value.clone(),
                                }
                            }
                            _ => strategic_diff(old_value, new_value, kind_schema),
                        };
                        patch.insert(key.clone(), entry);
                    }
                    Some(_) => {}
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// Element-wise diff of two keyed lists.
///
/// New and changed elements appear in desired order carrying the merge key
/// plus their changed fields; elements present only in the old list carry the
/// merge key plus a `$patch: delete` directive. Returns `None` when either
/// list holds an element the merge key cannot address, in which case the
/// caller replaces the list wholesale.
fn keyed_list_diff(
    old_arr: &[Value],
    new_arr: &[Value],
    merge_key: &str,
    kind_schema: &schema::KindSchema,
) -> Option<Value> {
    let key_of = |elem: &Value| -> Option<Value> { elem.get(merge_key).cloned() };

    if old_arr.iter().chain(new_arr).any(|e| key_of(e).is_none()) {
        return None;
    }

    let mut patch = Vec::new();

    for new_elem in new_arr {
        let key = key_of(new_elem)?;
        match old_arr.iter().find(|e| key_of(e).as_ref() == Some(&key)) {
            None => patch.push(new_elem.clone()),
            Some(old_elem) if old_elem != new_elem => {
                let mut entry = match strategic_diff(old_elem, new_elem, kind_schema) {
                    Value::Object(map) => map,
                    other => return Some(other),
                };
                entry.insert(merge_key.to_string(), key);
                patch.push(Value::Object(entry));
            }
            Some(_) => {}
        }
    }

    for old_elem in old_arr {
        let key = key_of(old_elem)?;
        if !new_arr.iter().any(|e| key_of(e).as_ref() == Some(&key)) {
            patch.push(json!({ merge_key: key, "$patch": "delete" }));
        }
    }

    if patch.is_empty() {
        None
    } else {
        Some(Value::Array(patch))
    }
}
