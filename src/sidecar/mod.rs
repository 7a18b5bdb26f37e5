// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! flagd sidecar composition: source resolution and pod merging.

pub mod container;
pub mod sources;

pub use container::FlagdInjector;
pub use sources::{PodContext, SourceConfig, SourceResolver};
