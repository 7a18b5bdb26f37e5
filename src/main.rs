// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::time::Duration;
use tracing::{error, info, warn};

use flagd_operator::backfill::PermissionBackfill;
use flagd_operator::backoff::Backoff;
use flagd_operator::config::Config;
use flagd_operator::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use flagd_operator::kubernetes::wait_for_crds;
use flagd_operator::proxy::ProxyManager;
use flagd_operator::reconcilers::FlagSourceReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting flagd operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, sidecar={}:{}",
        config.namespace, config.sidecar.image, config.sidecar.tag
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for FeatureFlag CRDs to become available...");
    let backoff = Backoff::new(
        Duration::from_secs(POLL_INTERVAL_SECS),
        Duration::from_secs(POLL_MAX_INTERVAL_SECS),
    );
    wait_for_crds(&client, &backoff).await?;

    let proxy = ProxyManager::new(client.clone(), config.clone());

    // Backfill runs alongside the reconciler; it never blocks startup
    let backfill = PermissionBackfill::new(client.clone());
    tokio::spawn(async move {
        match backfill.run().await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
                info!("Permission backfill done: {} pods, {} failed", outcomes.len(), failed);
            }
            Err(e) => error!("Permission backfill failed: {}", e),
        }
    });

    info!("Starting reconcilers...");
    FlagSourceReconciler::new(client, config, proxy).run().await?;

    warn!("Reconciler stopped unexpectedly");
    Ok(())
}
