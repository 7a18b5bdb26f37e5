// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Manifests for the shared flagd-proxy Deployment and Service

use crate::config::Config;
use crate::constants::proxy::{DEPLOYMENT_NAME, SERVICE_ACCOUNT_NAME, SERVICE_NAME};
use crate::constants::{labels, OPERATOR_NAME};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub fn proxy_labels(config: &Config) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::APP.to_string(), DEPLOYMENT_NAME.to_string()),
        (labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
        (labels::VERSION.to_string(), config.proxy.tag.clone()),
    ])
}

fn selector_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(labels::APP.to_string(), DEPLOYMENT_NAME.to_string())])
}

pub fn proxy_image(config: &Config) -> String {
    format!("{}:{}", config.proxy.image, config.proxy.tag)
}

pub fn proxy_args(config: &Config) -> Vec<String> {
    let mut args = vec![
        "start".to_string(),
        "--management-port".to_string(),
        config.proxy.management_port.to_string(),
    ];
    if config.proxy.debug_logging {
        args.push("--debug".to_string());
    }
    args
}

/// `host:port` the sidecars use to reach the proxy
pub fn proxy_service_address(config: &Config) -> String {
    format!(
        "{}.{}.svc.cluster.local:{}",
        SERVICE_NAME, config.namespace, config.proxy.port
    )
}

fn metadata(name: &str, config: &Config, owner: Option<&OwnerReference>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(config.namespace.clone()),
        labels: Some(proxy_labels(config)),
        owner_references: owner.map(|o| vec![o.clone()]),
        ..Default::default()
    }
}

pub fn build_proxy_deployment(config: &Config, owner: Option<&OwnerReference>) -> Deployment {
    Deployment {
        metadata: metadata(DEPLOYMENT_NAME, config, owner),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(proxy_labels(config)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
                    containers: vec![Container {
                        name: DEPLOYMENT_NAME.to_string(),
                        image: Some(proxy_image(config)),
                        args: Some(proxy_args(config)),
                        ports: Some(vec![
                            ContainerPort {
                                name: Some("port".to_string()),
                                container_port: config.proxy.port,
                                ..Default::default()
                            },
                            ContainerPort {
                                name: Some("metrics-port".to_string()),
                                container_port: config.proxy.management_port,
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_proxy_service(config: &Config, owner: Option<&OwnerReference>) -> Service {
    Service {
        metadata: metadata(SERVICE_NAME, config, owner),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels()),
            ports: Some(vec![ServicePort {
                name: Some(DEPLOYMENT_NAME.to_string()),
                port: config.proxy.port,
                target_port: Some(IntOrString::Int(config.proxy.port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Whether the operator manages this Deployment
pub fn is_managed(deployment: &Deployment) -> bool {
    deployment
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(labels::MANAGED_BY))
        .is_some_and(|v| v == OPERATOR_NAME)
}

fn first_container(deployment: &Deployment) -> Option<&Container> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.containers.first())
}

/// Whether `existing` drifted from `desired` in image or args
pub fn needs_update(existing: &Deployment, desired: &Deployment) -> bool {
    match (first_container(existing), first_container(desired)) {
        (Some(e), Some(d)) => e.image != d.image || e.args != d.args,
        (None, Some(_)) => true,
        _ => false,
    }
}
