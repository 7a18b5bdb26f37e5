// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes sync permissions for sidecar service accounts

use crate::constants::rbac::{
    CLUSTER_ROLE_BINDING_NAME, DEFAULT_SERVICE_ACCOUNT, SERVICE_ACCOUNT_KIND,
};
use crate::error::{FlagdError, Result};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, Subject};
use kube::{api::PostParams, Api, Client};
use tracing::{debug, info, instrument};

/// Build the binding subject for a service account, defaulting to `default`
pub fn service_account_subject(namespace: &str, service_account: Option<&str>) -> Subject {
    let name = service_account
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SERVICE_ACCOUNT);
    Subject {
        kind: SERVICE_ACCOUNT_KIND.to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Subjects with `subject` added, or `None` when it is already present.
/// Subjects are unique by kind, name and namespace.
pub fn with_subject(subjects: &[Subject], subject: &Subject) -> Option<Vec<Subject>> {
    let present = subjects.iter().any(|s| {
        s.kind == subject.kind && s.name == subject.name && s.namespace == subject.namespace
    });
    if present {
        return None;
    }
    let mut updated = subjects.to_vec();
    updated.push(subject.clone());
    Some(updated)
}

/// Ensure the service account is a subject of the kubernetes sync binding.
///
/// Grants are additive only. Returns whether the binding was changed.
#[instrument(skip(client))]
pub async fn enable_cluster_role_binding(
    client: &Client,
    namespace: &str,
    service_account: Option<&str>,
) -> Result<bool> {
    let subject = service_account_subject(namespace, service_account);

    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    if accounts.get_opt(&subject.name).await?.is_none() {
        return Err(FlagdError::ServiceAccountNotFound {
            namespace: namespace.to_string(),
            name: subject.name,
        });
    }

    let bindings: Api<ClusterRoleBinding> = Api::all(client.clone());
    let Some(mut binding) = bindings.get_opt(CLUSTER_ROLE_BINDING_NAME).await? else {
        return Err(FlagdError::PermissionBindingNotFound(
            CLUSTER_ROLE_BINDING_NAME.to_string(),
        ));
    };

    let current = binding.subjects.clone().unwrap_or_default();
    let Some(subjects) = with_subject(&current, &subject) else {
        debug!(
            "ServiceAccount {}/{} already bound to {}",
            namespace, subject.name, CLUSTER_ROLE_BINDING_NAME
        );
        return Ok(false);
    };

    binding.subjects = Some(subjects);
    bindings
        .replace(CLUSTER_ROLE_BINDING_NAME, &PostParams::default(), &binding)
        .await?;

    info!(
        "Bound ServiceAccount {}/{} to {}",
        namespace, subject.name, CLUSTER_ROLE_BINDING_NAME
    );
    Ok(true)
}
