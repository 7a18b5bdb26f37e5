// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, object references, ownership and RBAC.

pub mod crd;
pub mod locator;
pub mod owners;
pub mod rbac;

pub use crd::wait_for_crds;
pub use locator::ObjectKey;
pub use owners::add_non_controlling_owner;
pub use rbac::enable_cluster_role_binding;
