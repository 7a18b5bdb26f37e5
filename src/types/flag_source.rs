// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{FlagdError, Result};
use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Describes where and how an injected flagd sidecar obtains its flags.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.openfeature.dev", version = "v1beta1", kind = "FeatureFlagSource")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagSourceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<FlagdEnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_provider_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_var_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sync_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout_on_change: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_logging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otel_collector_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<SidecarResources>,
}

/// A single flag source declaration
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Provider-specific locator: `[namespace/]name`, a path, or a URL
    pub source: String,
    /// Empty falls back to `defaultSyncProvider`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_sync_bearer_token: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<String>,
    #[serde(rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Polling interval in seconds (http only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct FlagdEnvVar {
    pub name: String,
    pub value: String,
}

/// Sidecar compute resources as plain quantity strings keyed by resource name
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct SidecarResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, String>>,
}

impl SidecarResources {
    pub fn to_requirements(&self) -> ResourceRequirements {
        let quantities = |m: &Option<BTreeMap<String, String>>| {
            m.as_ref().map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                    .collect()
            })
        };
        ResourceRequirements {
            limits: quantities(&self.limits),
            requests: quantities(&self.requests),
            ..Default::default()
        }
    }
}

/// The transport a flag source is synced through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProvider {
    Kubernetes,
    FilePath,
    Http,
    Grpc,
    FlagdProxy,
}

impl SyncProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncProvider::Kubernetes => "kubernetes",
            SyncProvider::FilePath => "file",
            SyncProvider::Http => "http",
            SyncProvider::Grpc => "grpc",
            SyncProvider::FlagdProxy => "flagd-proxy",
        }
    }
}

impl FromStr for SyncProvider {
    type Err = FlagdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kubernetes" => Ok(SyncProvider::Kubernetes),
            "file" | "filepath" => Ok(SyncProvider::FilePath),
            "http" => Ok(SyncProvider::Http),
            "grpc" => Ok(SyncProvider::Grpc),
            "flagd-proxy" | "proxy" => Ok(SyncProvider::FlagdProxy),
            other => Err(FlagdError::UnrecognizedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for SyncProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Source {
    /// Resolve the provider, falling back to `default` when none is declared
    pub fn sync_provider(&self, default: Option<&str>) -> Result<SyncProvider> {
        if self.provider.is_empty() {
            default.unwrap_or_default().parse()
        } else {
            self.provider.parse()
        }
    }
}

impl FeatureFlagSourceSpec {
    /// Overlay `other` onto this spec. Set scalars win, lists append.
    pub fn merge(&mut self, other: &FeatureFlagSourceSpec) {
        fn overlay<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        overlay(&mut self.management_port, &other.management_port);
        overlay(&mut self.port, &other.port);
        overlay(&mut self.socket_path, &other.socket_path);
        overlay(&mut self.evaluator, &other.evaluator);
        overlay(&mut self.env_var_prefix, &other.env_var_prefix);
        overlay(&mut self.log_format, &other.log_format);
        overlay(&mut self.default_sync_provider, &other.default_sync_provider);
        overlay(&mut self.rollout_on_change, &other.rollout_on_change);
        overlay(&mut self.probes_enabled, &other.probes_enabled);
        overlay(&mut self.debug_logging, &other.debug_logging);
        overlay(&mut self.otel_collector_uri, &other.otel_collector_uri);
        overlay(&mut self.resources, &other.resources);

        self.sources.extend(other.sources.iter().cloned());
        self.env_vars.extend(other.env_vars.iter().cloned());
        self.sync_provider_args
            .extend(other.sync_provider_args.iter().cloned());
    }

    /// Whether any declared source syncs through the shared proxy.
    /// `fallback_provider` applies when the spec sets no default of its own.
    pub fn uses_flagd_proxy(&self, fallback_provider: Option<&str>) -> bool {
        let default = self.default_sync_provider.as_deref().or(fallback_provider);
        self.sources.iter().any(|s| {
            s.sync_provider(default)
                .is_ok_and(|p| p == SyncProvider::FlagdProxy)
        })
    }

    /// Environment variables the sidecar (and its neighbours) receive
    pub fn to_env_vars(&self) -> Vec<EnvVar> {
        let prefix = self.env_var_prefix.as_deref().unwrap_or("FLAGD");
        let var = |suffix: &str, value: String| EnvVar {
            name: format!("{}_{}", prefix, suffix),
            value: Some(value),
            ..Default::default()
        };

        let mut envs: Vec<EnvVar> = self
            .env_vars
            .iter()
            .map(|e| var(&e.name, e.value.clone()))
            .collect();

        if let Some(port) = self.port {
            envs.push(var("PORT", port.to_string()));
        }
        if let Some(port) = self.management_port {
            envs.push(var("MANAGEMENT_PORT", port.to_string()));
        }
        if let Some(evaluator) = &self.evaluator {
            envs.push(var("EVALUATOR", evaluator.clone()));
        }
        if let Some(format) = &self.log_format {
            envs.push(var("LOG_FORMAT", format.clone()));
        }
        if let Some(path) = self.socket_path.as_ref().filter(|p| !p.is_empty()) {
            envs.push(var("SOCKET_PATH", path.clone()));
        }
        envs
    }
}
