// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Translation of declared flag sources into flagd `--sources` entries.

use crate::constants::annotations::ALLOW_KUBERNETES_SYNC;
use crate::constants::sidecar::SOURCE_MOUNT_ROOT;
use crate::constants::API_GROUP;
use crate::error::{FlagdError, Result};
use crate::kubernetes::locator::{flag_file_name, ObjectKey};
use crate::kubernetes::owners::{add_non_controlling_owner, has_owner};
use crate::kubernetes::rbac::enable_cluster_role_binding;
use crate::proxy::ProxyManager;
use crate::types::{FeatureFlag, Source, SyncProvider};
use k8s_openapi::api::core::v1::{ConfigMap, ConfigMapVolumeSource, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::PostParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// One entry of the JSON array passed to flagd via `--sources`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub uri: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tls: bool,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
}

/// Pod-local changes a source needs, applied only after every source resolved
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PodEffects {
    pub annotations: Vec<(String, String)>,
    pub volumes: Vec<Volume>,
    pub mounts: Vec<VolumeMount>,
}

impl PodEffects {
    pub fn extend(&mut self, other: PodEffects) {
        self.annotations.extend(other.annotations);
        self.volumes.extend(other.volumes);
        self.mounts.extend(other.mounts);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub config: SourceConfig,
    pub effects: PodEffects,
}

impl From<SourceConfig> for ResolvedSource {
    fn from(config: SourceConfig) -> Self {
        Self {
            config,
            effects: PodEffects::default(),
        }
    }
}

/// What the resolver needs to know about the pod being mutated
#[derive(Debug, Clone)]
pub struct PodContext {
    pub namespace: String,
    pub service_account: Option<String>,
    /// First owner of the pod, linked to generated ConfigMaps
    pub owner: Option<OwnerReference>,
}

/// Resolves [`Source`] declarations, performing the cluster side effects
/// each provider requires.
#[derive(Clone)]
pub struct SourceResolver {
    client: Client,
    proxy: ProxyManager,
}

impl SourceResolver {
    pub fn new(client: Client, proxy: ProxyManager) -> Self {
        Self { client, proxy }
    }

    /// Resolve one source. `default_provider` applies when the source names none.
    pub async fn resolve(
        &self,
        source: &Source,
        default_provider: Option<&str>,
        pod: &PodContext,
    ) -> Result<ResolvedSource> {
        match source.sync_provider(default_provider)? {
            SyncProvider::Kubernetes => self.kubernetes(source, pod).await,
            SyncProvider::FilePath => self.file(source, pod).await,
            SyncProvider::Http => Ok(http_source(source).into()),
            SyncProvider::Grpc => Ok(grpc_source(source).into()),
            SyncProvider::FlagdProxy => self.flagd_proxy(source, pod).await,
        }
    }

    #[instrument(skip(self, source, pod), fields(source = %source.source))]
    async fn kubernetes(&self, source: &Source, pod: &PodContext) -> Result<ResolvedSource> {
        let key = ObjectKey::parse(&source.source, &pod.namespace)?;
        self.require_feature_flag(&key).await?;

        enable_cluster_role_binding(&self.client, &pod.namespace, pod.service_account.as_deref())
            .await?;

        Ok(ResolvedSource {
            config: SourceConfig {
                uri: key.to_string(),
                provider: SyncProvider::Kubernetes.as_str().to_string(),
                ..Default::default()
            },
            effects: PodEffects {
                annotations: vec![(ALLOW_KUBERNETES_SYNC.to_string(), "true".to_string())],
                ..Default::default()
            },
        })
    }

    #[instrument(skip(self, source, pod), fields(source = %source.source))]
    async fn file(&self, source: &Source, pod: &PodContext) -> Result<ResolvedSource> {
        let key = ObjectKey::parse(&source.source, &pod.namespace)?;
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &key.namespace);

        match config_maps.get_opt(&key.name).await? {
            None => {
                let flag = self.require_feature_flag(&key).await?;
                let pod_owners = pod
                    .owner
                    .iter()
                    .map(|o| OwnerReference {
                        controller: Some(false),
                        ..o.clone()
                    })
                    .collect();
                let cm = flag.generate_config_map(pod_owners)?;
                config_maps.create(&PostParams::default(), &cm).await?;
                info!("Created ConfigMap {}", key);
            }
            Some(mut cm) => {
                let existing = cm.metadata.owner_references.clone().unwrap_or_default();
                if let Some(owner) = pod.owner.as_ref().filter(|o| !has_owner(&existing, o)) {
                    cm.metadata.owner_references = Some(add_non_controlling_owner(&existing, owner));
                    config_maps
                        .replace(&key.name, &PostParams::default(), &cm)
                        .await?;
                    info!("Added owner {} to ConfigMap {}", owner.name, key);
                } else {
                    debug!("ConfigMap {} already shared with pod owner", key);
                }
            }
        }

        let mount_path = format!("{}/{}", SOURCE_MOUNT_ROOT, key.flag_id());
        Ok(ResolvedSource {
            config: SourceConfig {
                uri: format!("{}/{}", mount_path, flag_file_name(&key.namespace, &key.name)),
                provider: SyncProvider::FilePath.as_str().to_string(),
                ..Default::default()
            },
            effects: PodEffects {
                volumes: vec![Volume {
                    name: key.name.clone(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: key.name.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                mounts: vec![VolumeMount {
                    name: key.name.clone(),
                    mount_path,
                    ..Default::default()
                }],
                ..Default::default()
            },
        })
    }

    #[instrument(skip(self, source, pod), fields(source = %source.source))]
    async fn flagd_proxy(&self, source: &Source, pod: &PodContext) -> Result<ResolvedSource> {
        let (exists, ready) = self.proxy.is_ready().await?;
        if !exists || !ready {
            return Err(FlagdError::ProxyNotReady);
        }

        let key = ObjectKey::parse(&source.source, &pod.namespace)?;
        Ok(SourceConfig {
            uri: self.proxy.service_address(),
            provider: SyncProvider::Grpc.as_str().to_string(),
            selector: Some(format!("{}/{}", API_GROUP, key)),
            ..Default::default()
        }
        .into())
    }

    async fn require_feature_flag(&self, key: &ObjectKey) -> Result<FeatureFlag> {
        let flags: Api<FeatureFlag> = Api::namespaced(self.client.clone(), &key.namespace);
        flags
            .get_opt(&key.name)
            .await?
            .ok_or_else(|| FlagdError::ConfigNotFound {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            })
    }
}

fn http_source(source: &Source) -> SourceConfig {
    SourceConfig {
        uri: source.source.clone(),
        provider: SyncProvider::Http.as_str().to_string(),
        bearer_token: source.http_sync_bearer_token.clone(),
        interval: source.interval,
        ..Default::default()
    }
}

fn grpc_source(source: &Source) -> SourceConfig {
    SourceConfig {
        uri: source.source.clone(),
        provider: SyncProvider::Grpc.as_str().to_string(),
        tls: source.tls,
        cert_path: source.cert_path.clone(),
        provider_id: source.provider_id.clone(),
        selector: source.selector.clone(),
        ..Default::default()
    }
}
