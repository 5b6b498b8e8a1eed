//! Static registry of known versioned kinds and their list-merge semantics
//!
//! The strategic merge patch consults per-field merge annotations on the
//! versioned schema: some list fields merge element-wise by a declared key
//! instead of being replaced wholesale. This module is the client-side form
//! of those annotations — an immutable table built at compile time, covering
//! the core workload, config, and RBAC kinds.
//!
//! Kinds absent from the table (custom resources, anything schemaless) fall
//! back to the generic JSON merge patch. `CustomResourceDefinition` is
//! deliberately not listed: strategic merge is not supported on CRDs.
//! Extending coverage means adding a table row, nothing else.

/// Merge semantics for one versioned kind
#[derive(Debug)]
pub struct KindSchema {
    /// API group (empty for the core group)
    pub group: &'static str,
    /// Preferred wire version within the group
    pub version: &'static str,
    /// Kind name
    pub kind: &'static str,
    /// (field name, merge key) pairs for list fields that merge by key
    merge_keys: &'static [(&'static str, &'static str)],
}

impl KindSchema {
    /// The merge key for a keyed list field, if the schema declares one
    pub fn merge_key(&self, field: &str) -> Option<&'static str> {
        self.merge_keys
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, k)| *k)
    }
}

/// List-merge keys shared by everything that embeds a pod template
const POD_SPEC_KEYS: &[(&str, &str)] = &[
    ("containers", "name"),
    ("initContainers", "name"),
    ("ephemeralContainers", "name"),
    ("env", "name"),
    ("ports", "containerPort"),
    ("volumes", "name"),
    ("volumeMounts", "mountPath"),
    ("volumeDevices", "devicePath"),
    ("imagePullSecrets", "name"),
    ("hostAliases", "ip"),
    ("topologySpreadConstraints", "topologyKey"),
];

/// Service ports merge by port number, not containerPort
const SERVICE_KEYS: &[(&str, &str)] = &[("ports", "port")];

const SERVICE_ACCOUNT_KEYS: &[(&str, &str)] =
    &[("secrets", "name"), ("imagePullSecrets", "name")];

const NO_KEYS: &[(&str, &str)] = &[];

/// Registered kinds, the client-side equivalent of the typed scheme
static REGISTRY: &[KindSchema] = &[
    KindSchema {
        group: "",
        version: "v1",
        kind: "Pod",
        merge_keys: POD_SPEC_KEYS,
    },
    KindSchema {
        group: "",
        version: "v1",
        kind: "Service",
        merge_keys: SERVICE_KEYS,
    },
    KindSchema {
        group: "",
        version: "v1",
        kind: "ConfigMap",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "",
        version: "v1",
        kind: "Secret",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "",
        version: "v1",
        kind: "ServiceAccount",
        merge_keys: SERVICE_ACCOUNT_KEYS,
    },
    KindSchema {
        group: "",
        version: "v1",
        kind: "Namespace",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "",
        version: "v1",
        kind: "PersistentVolumeClaim",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "apps",
        version: "v1",
        kind: "Deployment",
        merge_keys: POD_SPEC_KEYS,
    },
    KindSchema {
        group: "apps",
        version: "v1",
        kind: "StatefulSet",
        merge_keys: POD_SPEC_KEYS,
    },
    KindSchema {
        group: "apps",
        version: "v1",
        kind: "DaemonSet",
        merge_keys: POD_SPEC_KEYS,
    },
    KindSchema {
        group: "apps",
        version: "v1",
        kind: "ReplicaSet",
        merge_keys: POD_SPEC_KEYS,
    },
    KindSchema {
        group: "batch",
        version: "v1",
        kind: "Job",
        merge_keys: POD_SPEC_KEYS,
    },
    KindSchema {
        group: "batch",
        version: "v1",
        kind: "CronJob",
        merge_keys: POD_SPEC_KEYS,
    },
    KindSchema {
        group: "networking.k8s.io",
        version: "v1",
        kind: "Ingress",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "rbac.authorization.k8s.io",
        version: "v1",
        kind: "Role",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "rbac.authorization.k8s.io",
        version: "v1",
        kind: "RoleBinding",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "rbac.authorization.k8s.io",
        version: "v1",
        kind: "ClusterRole",
        merge_keys: NO_KEYS,
    },
    KindSchema {
        group: "rbac.authorization.k8s.io",
        version: "v1",
        kind: "ClusterRoleBinding",
        merge_keys: NO_KEYS,
    },
];

/// Look up the schema for a (apiVersion, kind) pair.
///
/// Returns `None` when the kind is not registered, which callers treat as
/// "use the generic JSON merge patch".
pub fn lookup(api_version: &str, kind: &str) -> Option<&'static KindSchema> {
    let group = match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    };
    REGISTRY
        .iter()
        .find(|s| s.group == group && s.kind == kind)
}
