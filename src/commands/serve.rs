//! `backupd serve` - run the HTTP API.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use crate::daemon::backups::{ProcessRestarter, start_schedule};
use crate::daemon::http::{self, metrics};
use crate::daemon::startup::{build_backup_service, build_state};

pub async fn execute(config_path: Option<&Path>, port: Option<u16>) -> Result<()> {
    let (mut config, warnings) = super::load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    super::init_logging(config.server.log_format, &warnings);

    let restarter = Arc::new(ProcessRestarter::new(config.restore.mode));
    let backups = build_backup_service(&config, restarter)?;

    let metrics = if config.server.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = match &config.backups.cron {
        Some(cron) => Some(start_schedule(backups.clone(), cron).await?),
        None => None,
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = build_state(&config, backups, metrics);
    http::serve(state, addr).await
}
