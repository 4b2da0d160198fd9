//! `serve` command: watch sources and push hot updates.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use crossbeam::channel;

use crate::config::Config;
use crate::engine::HmrEngine;
use crate::reload::server::start_ws_server;
use crate::watch::FileWatcher;
use crate::{debug, log};

use super::manifest::Manifest;

/// CLI overrides for the `[serve]` and `[engine]` sections.
pub struct ServeOpts {
    pub manifest: Option<PathBuf>,
    pub interface: Option<IpAddr>,
    pub port: Option<u16>,
    pub debounce_ms: Option<u64>,
}

/// Run the dev server until Ctrl+C.
pub fn run(config: &Config, opts: &ServeOpts) -> Result<()> {
    let mut engine_config = config.engine.to_engine_config();
    if let Some(ms) = opts.debounce_ms {
        engine_config.debounce = std::time::Duration::from_millis(ms);
    }
    let interface = opts.interface.unwrap_or(config.serve.interface);
    let base_port = opts.port.unwrap_or(config.serve.port);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let engine = HmrEngine::new(engine_config);

        if let Some(path) = &opts.manifest {
            let manifest = Manifest::load(path)?;
            manifest.apply(&engine);
            log!("serve"; "loaded {} module(s) from {}", manifest.modules.len(), path.display());
        }

        let ws_port = start_ws_server(interface, base_port, engine.clone())?;
        log!("serve"; "ws://{}:{}", interface, ws_port);

        let roots = config.watch_roots();
        let watcher = FileWatcher::new(&roots, config.watch.ignore.clone(), engine.clone())?;
        for root in &roots {
            debug!("watch"; "watching {}", root.display());
        }
        let watch_task = tokio::spawn(watcher.run());

        // Ctrl+C lands on a sync channel; recv on a blocking thread so the
        // runtime stays free for the engine
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        ctrlc::set_handler(move || {
            let _ = shutdown_tx.try_send(());
        })
        .context("failed to install shutdown handler")?;

        let _ = tokio::task::spawn_blocking(move || shutdown_rx.recv()).await;

        log!("serve"; "shutting down");
        engine.close();
        watch_task.abort();
        Ok(())
    })
}
