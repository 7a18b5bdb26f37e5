// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys used by the operator
pub mod annotations {
    /// When set to "true" on a pod, the flagd sidecar is injected
    pub const ENABLED: &str = "openfeature.dev/enabled";
    /// Comma-separated `[namespace/]name` list of FeatureFlagSources used by a workload
    pub const FEATURE_FLAG_SOURCE: &str = "openfeature.dev/featureflagsource";
    /// Marks a pod whose service account was granted kubernetes sync permissions
    pub const ALLOW_KUBERNETES_SYNC: &str = "openfeature.dev/allowkubernetessync";
    /// Stamped on a pod template to trigger a rolling restart
    pub const RESTARTED_AT: &str = "openfeature.dev/restartedAt";
    /// Generation of a FeatureFlagSource whose dependent workloads were last restarted
    pub const ROLLED_OUT_GENERATION: &str = "openfeature.dev/rolledOutGeneration";
}

/// Labels attached to generated resources
pub mod labels {
    pub const APP: &str = "app";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const VERSION: &str = "app.kubernetes.io/version";
}

/// The operator name used as field manager and managed-by label value
pub const OPERATOR_NAME: &str = "open-feature-operator";

/// API group of the custom resources
pub const API_GROUP: &str = "core.openfeature.dev";

/// Sidecar container layout
pub mod sidecar {
    /// Reserved name of the injected container
    pub const CONTAINER_NAME: &str = "flagd";
    /// Root directory under which file sources are mounted
    pub const SOURCE_MOUNT_ROOT: &str = "/etc/flagd";
    /// Suffix of the flag definition file inside a mounted ConfigMap
    pub const FLAG_FILE_SUFFIX: &str = "flagd.json";
    /// Fixed non-root UID/GID the sidecar runs as
    pub const RUN_AS_ID: i64 = 65532;
    pub const LIVENESS_PATH: &str = "/healthz";
    pub const READINESS_PATH: &str = "/readyz";
    pub const PROBE_INITIAL_DELAY_SECS: i32 = 5;
    pub const PROBE_PERIOD_SECS: i32 = 60;
}

/// Shared flagd-proxy resources
pub mod proxy {
    pub const DEPLOYMENT_NAME: &str = "flagd-proxy";
    pub const SERVICE_NAME: &str = "flagd-proxy-svc";
    pub const SERVICE_ACCOUNT_NAME: &str = "open-feature-operator-flagd-proxy";
    /// A proxy with no ready replica older than this is considered stalled
    pub const STALL_THRESHOLD_SECS: i64 = 180;
}

/// RBAC resources for kubernetes sync
pub mod rbac {
    /// Cluster-wide binding that collects sidecar service accounts
    pub const CLUSTER_ROLE_BINDING_NAME: &str = "open-feature-operator-flagd-kubernetes-sync";
    pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";
    pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";
}

/// Reconciliation timing
pub mod reconcile {
    /// Requeue interval after a hard reconciliation error
    pub const ERROR_REQUEUE_SECS: u64 = 10;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRDs
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
