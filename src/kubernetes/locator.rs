// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! `[namespace/]name` references and the identifiers derived from them

use crate::constants::sidecar::FLAG_FILE_SUFFIX;
use crate::error::{FlagdError, Result};
use std::fmt;

/// A namespaced object reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `[namespace/]name`; a bare name lives in `default_namespace`
    pub fn parse(locator: &str, default_namespace: &str) -> Result<Self> {
        let locator = locator.trim();
        let (namespace, name) = match locator.split_once('/') {
            None => (default_namespace, locator),
            Some((ns, name)) => (ns, name),
        };

        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(FlagdError::InvalidLocator(locator.to_string()));
        }

        Ok(Self::new(namespace, name))
    }

    /// `namespace_name`, used for mount directories
    pub fn flag_id(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Name of the flag file inside a generated ConfigMap
pub fn flag_file_name(namespace: &str, name: &str) -> String {
    format!("{}_{}.{}", namespace, name, FLAG_FILE_SUFFIX)
}

/// Parse a comma-separated list of `[namespace/]name` tokens.
/// Blank tokens are skipped; malformed ones fail the whole list.
pub fn parse_key_list(value: &str, default_namespace: &str) -> Result<Vec<ObjectKey>> {
    value
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| ObjectKey::parse(t, default_namespace))
        .collect()
}
