// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::flag_source::{FeatureFlagSourceSpec, SidecarResources};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

/// Defaults for the injected flagd sidecar
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarConfig {
    pub image: String,
    pub tag: String,
    pub port: i32,
    pub management_port: i32,
    pub socket_path: Option<String>,
    pub evaluator: String,
    pub log_format: String,
    pub env_var_prefix: String,
    pub default_sync_provider: String,
    pub provider_args: Vec<String>,
    pub probes_enabled: bool,
    pub cpu_limit: String,
    pub ram_limit: String,
    pub cpu_request: String,
    pub ram_request: String,
}

/// Settings for the shared flagd-proxy deployment
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub image: String,
    pub tag: String,
    pub port: i32,
    pub management_port: i32,
    pub debug_logging: bool,
}

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Namespace the operator (and the shared proxy) runs in
    pub namespace: String,
    /// Name of the operator's own Deployment, used as proxy owner
    pub operator_deployment_name: String,
    pub sidecar: SidecarConfig,
    pub proxy: ProxyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: "open-feature-operator-system".to_string(),
            operator_deployment_name: "open-feature-operator-controller-manager".to_string(),
            sidecar: SidecarConfig {
                image: "ghcr.io/open-feature/flagd".to_string(),
                tag: "v0.11.1".to_string(),
                port: 8013,
                management_port: 8014,
                socket_path: None,
                evaluator: "json".to_string(),
                log_format: "json".to_string(),
                env_var_prefix: "FLAGD".to_string(),
                default_sync_provider: "kubernetes".to_string(),
                provider_args: Vec::new(),
                probes_enabled: true,
                cpu_limit: "500m".to_string(),
                ram_limit: "64M".to_string(),
                cpu_request: "200m".to_string(),
                ram_request: "32M".to_string(),
            },
            proxy: ProxyConfig {
                image: "ghcr.io/open-feature/flagd-proxy".to_string(),
                tag: "v0.6.4".to_string(),
                port: 8015,
                management_port: 8016,
                debug_logging: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let d = Config::default();

        let socket_path = env::var("SIDECAR_SOCKET_PATH")
            .ok()
            .filter(|s| !s.is_empty());
        let provider_args = env::var("SIDECAR_PROVIDER_ARGS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        Ok(Config {
            namespace: string_or("POD_NAMESPACE", d.namespace),
            operator_deployment_name: string_or(
                "OPERATOR_DEPLOYMENT_NAME",
                d.operator_deployment_name,
            ),
            sidecar: SidecarConfig {
                image: string_or("SIDECAR_IMAGE", d.sidecar.image),
                tag: string_or("SIDECAR_TAG", d.sidecar.tag),
                port: parse_or("SIDECAR_PORT", d.sidecar.port)?,
                management_port: parse_or("SIDECAR_MANAGEMENT_PORT", d.sidecar.management_port)?,
                socket_path,
                evaluator: string_or("SIDECAR_EVALUATOR", d.sidecar.evaluator),
                log_format: string_or("SIDECAR_LOG_FORMAT", d.sidecar.log_format),
                env_var_prefix: string_or("SIDECAR_ENV_VAR_PREFIX", d.sidecar.env_var_prefix),
                default_sync_provider: string_or(
                    "SIDECAR_SYNC_PROVIDER",
                    d.sidecar.default_sync_provider,
                ),
                provider_args,
                probes_enabled: parse_or("SIDECAR_PROBES_ENABLED", d.sidecar.probes_enabled)?,
                cpu_limit: string_or("SIDECAR_CPU_LIMIT", d.sidecar.cpu_limit),
                ram_limit: string_or("SIDECAR_RAM_LIMIT", d.sidecar.ram_limit),
                cpu_request: string_or("SIDECAR_CPU_REQUEST", d.sidecar.cpu_request),
                ram_request: string_or("SIDECAR_RAM_REQUEST", d.sidecar.ram_request),
            },
            proxy: ProxyConfig {
                image: string_or("FLAGD_PROXY_IMAGE", d.proxy.image),
                tag: string_or("FLAGD_PROXY_TAG", d.proxy.tag),
                port: parse_or("FLAGD_PROXY_PORT", d.proxy.port)?,
                management_port: parse_or("FLAGD_PROXY_MANAGEMENT_PORT", d.proxy.management_port)?,
                debug_logging: parse_or("FLAGD_PROXY_DEBUG_LOGGING", d.proxy.debug_logging)?,
            },
        })
    }

    /// The fully-populated base spec that FeatureFlagSources are merged onto
    pub fn default_flag_source_spec(&self) -> FeatureFlagSourceSpec {
        let s = &self.sidecar;
        FeatureFlagSourceSpec {
            management_port: Some(s.management_port),
            port: Some(s.port),
            socket_path: s.socket_path.clone(),
            evaluator: Some(s.evaluator.clone()),
            sync_provider_args: s.provider_args.clone(),
            env_var_prefix: Some(s.env_var_prefix.clone()),
            log_format: Some(s.log_format.clone()),
            default_sync_provider: Some(s.default_sync_provider.clone()),
            probes_enabled: Some(s.probes_enabled),
            resources: Some(SidecarResources {
                limits: Some(BTreeMap::from([
                    ("cpu".to_string(), s.cpu_limit.clone()),
                    ("memory".to_string(), s.ram_limit.clone()),
                ])),
                requests: Some(BTreeMap::from([
                    ("cpu".to_string(), s.cpu_request.clone()),
                    ("memory".to_string(), s.ram_request.clone()),
                ])),
            }),
            ..Default::default()
        }
    }
}

fn string_or(key: &str, default: String) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, v)),
        _ => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
