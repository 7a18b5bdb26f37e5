// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of the singleton flagd-proxy Deployment and Service.

use crate::backoff::Backoff;
use crate::config::Config;
use crate::constants::proxy::{DEPLOYMENT_NAME, SERVICE_NAME, STALL_THRESHOLD_SECS};
use crate::error::{FlagdError, Result};
use crate::proxy::manifest::{
    build_proxy_deployment, build_proxy_service, is_managed, needs_update, proxy_service_address,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::chrono::{DateTime, Duration as ChronoDuration, Utc};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Derived readiness of the proxy Deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyReadiness {
    /// No Deployment exists
    Absent,
    /// Exists without ready replicas, still inside the stall threshold
    Starting,
    /// Exists without ready replicas past the stall threshold
    Stalled,
    /// At least one replica is ready
    Ready,
}

impl ProxyReadiness {
    pub fn exists(&self) -> bool {
        !matches!(self, ProxyReadiness::Absent)
    }

    /// `(exists, ready)`, or `ProxyStalled` once the proxy stopped making progress.
    /// A stalled proxy still exists.
    pub fn check(self) -> Result<(bool, bool)> {
        match self {
            ProxyReadiness::Stalled => Err(FlagdError::ProxyStalled),
            other => Ok((other.exists(), other == ProxyReadiness::Ready)),
        }
    }
}

/// Classify a proxy Deployment as of `now`
pub fn evaluate_readiness(deployment: Option<&Deployment>, now: DateTime<Utc>) -> ProxyReadiness {
    let Some(deployment) = deployment else {
        return ProxyReadiness::Absent;
    };

    let ready_replicas = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    if ready_replicas > 0 {
        return ProxyReadiness::Ready;
    }

    let stalled = deployment
        .metadata
        .creation_timestamp
        .as_ref()
        .is_some_and(|created| now - created.0 >= ChronoDuration::seconds(STALL_THRESHOLD_SECS));
    if stalled {
        ProxyReadiness::Stalled
    } else {
        ProxyReadiness::Starting
    }
}

#[derive(Clone)]
pub struct ProxyManager {
    client: Client,
    config: Config,
}

impl ProxyManager {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    /// `host:port` of the proxy Service
    pub fn service_address(&self) -> String {
        proxy_service_address(&self.config)
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Make sure the proxy Deployment and Service exist.
    ///
    /// An operator-managed Deployment whose image or args drifted from the
    /// configuration is replaced; anything else that already exists is left alone.
    /// The Service is checked on every call so a half-created pair heals.
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn ensure(&self) -> Result<()> {
        let deployments = self.deployments();
        let owner = self.operator_owner_reference().await;
        let desired = build_proxy_deployment(&self.config, owner.as_ref());

        match deployments.get_opt(DEPLOYMENT_NAME).await? {
            None => {
                info!("Creating {} deployment", DEPLOYMENT_NAME);
                create_if_absent(&deployments, &desired).await?;
            }
            Some(existing) if !is_managed(&existing) => {
                debug!("{} is not managed by the operator, leaving it", DEPLOYMENT_NAME);
            }
            Some(existing) if needs_update(&existing, &desired) => {
                info!("Updating drifted {} deployment", DEPLOYMENT_NAME);
                let mut updated = desired;
                updated.metadata.resource_version = existing.resource_version();
                deployments
                    .replace(DEPLOYMENT_NAME, &PostParams::default(), &updated)
                    .await?;
            }
            Some(_) => debug!("{} is up to date", DEPLOYMENT_NAME),
        }

        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.config.namespace);
        if services.get_opt(SERVICE_NAME).await?.is_none() {
            info!("Creating {} service", SERVICE_NAME);
            create_if_absent(&services, &build_proxy_service(&self.config, owner.as_ref())).await?;
        }

        Ok(())
    }

    /// Current readiness; only remote-call failures are errors here
    pub async fn readiness(&self) -> Result<ProxyReadiness> {
        let deployment = self.deployments().get_opt(DEPLOYMENT_NAME).await?;
        Ok(evaluate_readiness(deployment.as_ref(), Utc::now()))
    }

    /// `(exists, ready)`; fails with `ProxyStalled` when the proxy stopped progressing
    pub async fn is_ready(&self) -> Result<(bool, bool)> {
        self.readiness().await?.check()
    }

    /// Poll until the proxy is ready, sleeping `backoff.next()` between checks
    pub async fn wait_until_ready(&self, backoff: &Backoff) -> Result<()> {
        loop {
            match self.readiness().await? {
                ProxyReadiness::Ready => {
                    backoff.reset();
                    return Ok(());
                }
                ProxyReadiness::Stalled => return Err(FlagdError::ProxyStalled),
                state => {
                    let delay = backoff.next();
                    debug!("{} is {:?}, checking again in {:?}", DEPLOYMENT_NAME, state, delay);
                    sleep(delay).await;
                }
            }
        }
    }

    /// Owner reference to the operator's own Deployment, if it can be resolved
    async fn operator_owner_reference(&self) -> Option<OwnerReference> {
        let name = &self.config.operator_deployment_name;
        match self.deployments().get_opt(name).await {
            Ok(Some(operator)) => Some(OwnerReference {
                api_version: Deployment::api_version(&()).to_string(),
                kind: Deployment::kind(&()).to_string(),
                name: operator.name_any(),
                uid: operator.uid().unwrap_or_default(),
                ..Default::default()
            }),
            Ok(None) => {
                warn!("Operator deployment {} not found, proxy will have no owner", name);
                None
            }
            Err(e) => {
                warn!("Failed to look up operator deployment {}: {}", name, e);
                None
            }
        }
    }
}

/// Create an object, treating "already exists" as success
async fn create_if_absent<K>(api: &Api<K>, obj: &K) -> Result<()>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned,
{
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 409 => {
            debug!("{} already exists", obj.meta().name.clone().unwrap_or_default());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
