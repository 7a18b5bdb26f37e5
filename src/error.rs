// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlagdError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Unrecognized sync provider: {0:?}")]
    UnrecognizedProvider(String),

    #[error("Feature flag configuration {namespace}/{name} not found")]
    ConfigNotFound { namespace: String, name: String },

    #[error("flagd-proxy is not ready yet")]
    ProxyNotReady,

    #[error("flagd-proxy has had no ready replicas for too long")]
    ProxyStalled,

    #[error("ServiceAccount {namespace}/{name} not found")]
    ServiceAccountNotFound { namespace: String, name: String },

    #[error("ClusterRoleBinding {0} not found")]
    PermissionBindingNotFound(String),

    #[error("Invalid resource locator: {0:?}")]
    InvalidLocator(String),

    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),

    #[error("Failed to serialize sidecar sources: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlagdError {
    /// Whether a caller may retry the failed operation later
    pub fn is_transient(&self) -> bool {
        matches!(self, FlagdError::ProxyNotReady)
    }
}

pub type Result<T> = std::result::Result<T, FlagdError>;
