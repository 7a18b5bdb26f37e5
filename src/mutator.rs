// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admission-time pod mutation: resolve referenced FeatureFlagSources and inject flagd.

use crate::config::Config;
use crate::constants::annotations;
use crate::error::{FlagdError, Result};
use crate::kubernetes::locator::parse_key_list;
use crate::proxy::ProxyManager;
use crate::sidecar::FlagdInjector;
use crate::types::{FeatureFlagSource, FeatureFlagSourceSpec};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct PodMutator {
    client: Client,
    config: Config,
    injector: FlagdInjector,
}

impl PodMutator {
    pub fn new(client: Client, config: Config, proxy: ProxyManager) -> Self {
        let injector = FlagdInjector::new(client.clone(), config.clone(), proxy);
        Self {
            client,
            config,
            injector,
        }
    }

    /// Inject the flagd sidecar into an opted-in pod.
    ///
    /// Returns `false` when the pod did not opt in. On error the pod is left as it was.
    #[instrument(skip_all, fields(pod = ?pod.metadata.name, namespace = ?pod.metadata.namespace))]
    pub async fn mutate(&self, pod: &mut Pod) -> Result<bool> {
        if !is_enabled(pod) {
            debug!("Pod did not opt into flagd injection");
            return Ok(false);
        }

        let namespace = pod
            .namespace()
            .ok_or(FlagdError::MissingObjectKey("metadata.namespace"))?;
        let spec = self.resolve_spec(pod, &namespace).await?;

        let pod_spec = pod
            .spec
            .as_mut()
            .ok_or(FlagdError::MissingObjectKey("spec"))?;
        self.injector
            .inject(&mut pod.metadata, pod_spec, &spec)
            .await?;

        info!("Injected flagd with {} sources", spec.sources.len());
        Ok(true)
    }

    /// Merge every referenced FeatureFlagSource, in annotation order, onto the defaults
    async fn resolve_spec(&self, pod: &Pod, namespace: &str) -> Result<FeatureFlagSourceSpec> {
        let mut spec = self.config.default_flag_source_spec();
        let Some(refs) = pod.annotations().get(annotations::FEATURE_FLAG_SOURCE) else {
            return Ok(spec);
        };

        for key in parse_key_list(refs, namespace)? {
            let sources: Api<FeatureFlagSource> = Api::namespaced(self.client.clone(), &key.namespace);
            let source = sources
                .get_opt(&key.name)
                .await?
                .ok_or_else(|| FlagdError::ConfigNotFound {
                    namespace: key.namespace.clone(),
                    name: key.name.clone(),
                })?;
            spec.merge(&source.spec);
        }

        Ok(spec)
    }
}

fn is_enabled(pod: &Pod) -> bool {
    pod.annotations()
        .get(annotations::ENABLED)
        .is_some_and(|v| v == "true")
}
