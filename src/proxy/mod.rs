// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The shared flagd-proxy that fans kubernetes sync out to sidecars.

pub mod manager;
pub mod manifest;

pub use manager::{evaluate_readiness, ProxyManager, ProxyReadiness};
