// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types served under core.openfeature.dev.

pub mod feature_flag;
pub mod flag_source;

pub use feature_flag::FeatureFlag;
pub use flag_source::{FeatureFlagSource, FeatureFlagSourceSpec, Source, SyncProvider};
