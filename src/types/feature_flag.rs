// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::Result;
use crate::kubernetes::locator::flag_file_name;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{CustomResource, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A set of flag definitions served to flagd.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "core.openfeature.dev", version = "v1beta1", kind = "FeatureFlag")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagSpec {
    pub flag_spec: FlagSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct FlagSpec {
    #[serde(default)]
    pub flags: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "$evaluators", skip_serializing_if = "Option::is_none")]
    pub evaluators: Option<BTreeMap<String, serde_json::Value>>,
}

impl FeatureFlag {
    /// Render the flag definitions as flagd's JSON file format
    pub fn flag_config_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.spec.flag_spec)?)
    }

    /// Build the ConfigMap that carries these flags for file-based sync.
    ///
    /// The FeatureFlag is the controlling owner; `extra_owners` are appended
    /// as given.
    pub fn generate_config_map(&self, extra_owners: Vec<OwnerReference>) -> Result<ConfigMap> {
        let namespace = self.namespace().unwrap_or_default();
        let name = self.name_any();

        let mut owners: Vec<OwnerReference> = self.controller_owner_ref(&()).into_iter().collect();
        owners.extend(extra_owners);

        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.clone()),
                owner_references: Some(owners),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                flag_file_name(&namespace, &name),
                self.flag_config_json()?,
            )])),
            ..Default::default()
        })
    }
}
