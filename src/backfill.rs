// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup scan that grants kubernetes sync permissions to pods admitted earlier.

use crate::constants::annotations;
use crate::error::Result;
use crate::kubernetes::{enable_cluster_role_binding, ObjectKey};
use k8s_openapi::api::core::v1::Pod;
use kube::{api::ListParams, Api, Client, ResourceExt};
use tracing::{error, info, instrument};

/// Outcome per pod: whether the binding changed, or why it could not be updated
pub type BackfillOutcome = (ObjectKey, Result<bool>);

pub struct PermissionBackfill {
    client: Client,
}

impl PermissionBackfill {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Bind the service account of every pod annotated for kubernetes sync.
    ///
    /// Fails only if pods cannot be listed; per-pod failures are logged and
    /// reported in the returned outcomes.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<Vec<BackfillOutcome>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let pods = pods.list(&ListParams::default()).await?;

        let candidates: Vec<Pod> = pods.items.into_iter().filter(allows_kubernetes_sync).collect();
        info!("Found {} pods using kubernetes sync", candidates.len());

        let mut outcomes = Vec::with_capacity(candidates.len());
        for pod in candidates {
            let key = ObjectKey::new(pod.namespace().unwrap_or_default(), pod.name_any());
            let service_account = pod.spec.as_ref().and_then(|s| s.service_account_name.as_deref());

            let result = enable_cluster_role_binding(&self.client, &key.namespace, service_account).await;
            if let Err(e) = &result {
                error!("Failed to enable kubernetes sync permissions for pod {}: {}", key, e);
            }
            outcomes.push((key, result));
        }

        Ok(outcomes)
    }
}

fn allows_kubernetes_sync(pod: &Pod) -> bool {
    pod.annotations()
        .get(annotations::ALLOW_KUBERNETES_SYNC)
        .is_some_and(|v| v == "true")
}
