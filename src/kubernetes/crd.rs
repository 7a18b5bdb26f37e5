// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::backoff::Backoff;
use crate::constants::API_GROUP;
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use tokio::time::sleep;
use tracing::{info, warn};

const REQUIRED_KINDS: [&str; 2] = ["FeatureFlag", "FeatureFlagSource"];
const VERSION: &str = "v1beta1";

/// Wait until the FeatureFlag and FeatureFlagSource CRDs are served,
/// sleeping `backoff.next()` between checks.
pub async fn wait_for_crds(client: &Client, backoff: &Backoff) -> Result<()> {
    loop {
        match check_crds_exist(client).await {
            Ok(true) => {
                info!("CRDs ({}/{}) are available", API_GROUP, VERSION);
                backoff.reset();
                return Ok(());
            }
            Ok(false) => {
                let delay = backoff.next();
                info!(
                    "CRDs ({}/{}) not yet available, waiting {:?}...",
                    API_GROUP, VERSION, delay
                );
                sleep(delay).await;
            }
            Err(e) => {
                let delay = backoff.next();
                warn!("Error checking for CRDs: {}, retrying in {:?}...", e, delay);
                sleep(delay).await;
            }
        }
    }
}

async fn check_crds_exist(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[API_GROUP])
        .run()
        .await?;

    let Some(group) = discovery.groups().find(|g| g.name() == API_GROUP) else {
        return Ok(false);
    };

    let served: Vec<String> = group
        .recommended_resources()
        .into_iter()
        .filter(|(ar, _)| ar.version == VERSION)
        .map(|(ar, _)| ar.kind)
        .collect();

    Ok(REQUIRED_KINDS
        .iter()
        .all(|kind| served.iter().any(|s| s == kind)))
}
