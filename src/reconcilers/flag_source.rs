// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! FeatureFlagSource reconciler - provisions the proxy and rolls out dependent workloads.

use crate::config::Config;
use crate::constants::annotations;
use crate::constants::reconcile::ERROR_REQUEUE_SECS;
use crate::error::{FlagdError, Result};
use crate::kubernetes::locator::{parse_key_list, ObjectKey};
use crate::proxy::ProxyManager;
use crate::types::FeatureFlagSource;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::chrono::Utc;
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of restarting one workload
pub type RolloutOutcome = (ObjectKey, Result<()>);

pub struct FlagSourceReconciler {
    client: Client,
    config: Config,
    proxy: ProxyManager,
}

impl FlagSourceReconciler {
    pub fn new(client: Client, config: Config, proxy: ProxyManager) -> Self {
        Self {
            client,
            config,
            proxy,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let sources: Api<FeatureFlagSource> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(sources, WatcherConfig::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled FeatureFlagSource: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Re-read the FeatureFlagSource and act on it.
    ///
    /// Returns one outcome per workload a restart was attempted for. Only
    /// failing to read the source or list workloads is an error.
    #[instrument(skip(self), fields(source = %key))]
    pub async fn reconcile_source(&self, key: &ObjectKey) -> Result<Vec<RolloutOutcome>> {
        let sources: Api<FeatureFlagSource> = Api::namespaced(self.client.clone(), &key.namespace);
        let Some(source) = sources.get_opt(&key.name).await? else {
            debug!("FeatureFlagSource {} no longer exists", key);
            return Ok(Vec::new());
        };

        let fallback_provider = self.config.sidecar.default_sync_provider.as_str();
        if source.spec.uses_flagd_proxy(Some(fallback_provider)) {
            if let Err(e) = self.proxy.ensure().await {
                error!("Failed to ensure flagd-proxy for {}: {}", key, e);
            }
        }

        if !source.spec.rollout_on_change.unwrap_or(false) {
            debug!("Rollout on change disabled for {}", key);
            return Ok(Vec::new());
        }

        let generation = source.metadata.generation;
        if generation.is_some() && rolled_out_generation(&source) == generation {
            debug!("Generation {:?} of {} already rolled out", generation, key);
            return Ok(Vec::new());
        }

        let deployments: Api<Deployment> = Api::all(self.client.clone());
        let candidates = deployments.list(&ListParams::default()).await?;
        let restarted_at = Utc::now().to_rfc3339();

        let mut outcomes = Vec::new();
        for deployment in candidates.items.into_iter().filter(references_flag_sources) {
            let workload = ObjectKey::new(
                deployment.namespace().unwrap_or_default(),
                deployment.name_any(),
            );

            match targets_source(&deployment, key) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!("Skipping {}: {}", workload, e);
                    outcomes.push((workload, Err(e)));
                    continue;
                }
            }

            let result = self.restart(deployment, &restarted_at).await;
            match &result {
                Ok(()) => info!("Restarted {} after change to {}", workload, key),
                Err(e) => error!("Failed to restart {}: {}", workload, e),
            }
            outcomes.push((workload, result));
        }

        if let Some(generation) = generation {
            self.record_rollout(key, generation).await;
        }

        Ok(outcomes)
    }

    /// Remember the rolled out generation so resyncs and metadata-only edits don't restart again
    async fn record_rollout(&self, key: &ObjectKey, generation: i64) {
        let sources: Api<FeatureFlagSource> = Api::namespaced(self.client.clone(), &key.namespace);
        let rolled_out = BTreeMap::from([(annotations::ROLLED_OUT_GENERATION, generation.to_string())]);
        let patch = json!({ "metadata": { "annotations": rolled_out } });
        if let Err(e) = sources
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            warn!("Failed to record rolled out generation {} on {}: {}", generation, key, e);
        }
    }

    async fn restart(&self, mut deployment: Deployment, restarted_at: &str) -> Result<()> {
        let namespace = deployment
            .namespace()
            .ok_or(FlagdError::MissingObjectKey("metadata.namespace"))?;
        let name = deployment.name_any();

        stamp_restart(&mut deployment, restarted_at);

        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &PostParams::default(), &deployment).await?;
        Ok(())
    }
}

fn rolled_out_generation(source: &FeatureFlagSource) -> Option<i64> {
    source
        .annotations()
        .get(annotations::ROLLED_OUT_GENERATION)
        .and_then(|v| v.parse().ok())
}

fn template_annotations(deployment: &Deployment) -> Option<&BTreeMap<String, String>> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.annotations.as_ref())
}

/// Whether the workload's pods opt into flagd injection
pub fn references_flag_sources(deployment: &Deployment) -> bool {
    template_annotations(deployment)
        .and_then(|a| a.get(annotations::ENABLED))
        .is_some_and(|v| v == "true")
}

/// Whether the workload's FeatureFlagSource list names `key`.
/// Bare names resolve against the workload's own namespace.
pub fn targets_source(deployment: &Deployment, key: &ObjectKey) -> Result<bool> {
    let Some(targets) = template_annotations(deployment)
        .and_then(|a| a.get(annotations::FEATURE_FLAG_SOURCE))
    else {
        return Ok(false);
    };
    let namespace = deployment.namespace().unwrap_or_default();
    Ok(parse_key_list(targets, &namespace)?.contains(key))
}

/// Set the restart annotation on the pod template
pub fn stamp_restart(deployment: &mut Deployment, restarted_at: &str) {
    if let Some(spec) = deployment.spec.as_mut() {
        spec.template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(annotations::RESTARTED_AT.to_string(), restarted_at.to_string());
    }
}

async fn reconcile(source: Arc<FeatureFlagSource>, ctx: Arc<FlagSourceReconciler>) -> Result<Action> {
    let namespace = source
        .namespace()
        .ok_or(FlagdError::MissingObjectKey("metadata.namespace"))?;
    let key = ObjectKey::new(namespace, source.name_any());

    let outcomes = ctx.reconcile_source(&key).await?;
    let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        warn!("{} of {} rollouts for {} failed", failed, outcomes.len(), key);
    }

    Ok(Action::await_change())
}

fn error_policy(
    _source: Arc<FeatureFlagSource>,
    error: &FlagdError,
    _ctx: Arc<FlagSourceReconciler>,
) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}
