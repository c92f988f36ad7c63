//! Agent roster hot-reload.
//!
//! Watches `maestro.toml` and hands the re-parsed `[[agents]]` list to a
//! callback after a debounce window. Backend, server and security settings
//! are read once at startup.

use crate::config::validate_agents;
use maestro_core::{AgentConfig, MaestroError, MaestroResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

/// Part of the config file that may change at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadableConfig {
    #[serde(default)]
    pub agents: Option<Vec<AgentConfig>>,
}

/// Keeps the file watch alive; dropping it stops reloads.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path`. `on_reload` runs on a background thread
    /// for every debounced modification that parses; parse failures are
    /// logged and skipped.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> MaestroResult<Self>
    where
        F: Fn(ReloadableConfig) + Send + Sync + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| MaestroError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(config_path.as_ref(), RecursiveMode::NonRecursive)
            .map_err(|e| MaestroError::Config(format!("Failed to watch config file: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let debounce = Duration::from_millis(debounce_ms);
            let mut last_reload = Instant::now();

            while rx.recv().is_ok() {
                // One reload per burst of writes.
                while rx.try_recv().is_ok() {}

                let elapsed = last_reload.elapsed();
                if elapsed < debounce {
                    std::thread::sleep(debounce - elapsed);
                }
                last_reload = Instant::now();

                match parse_config(&path) {
                    Ok(config) => on_reload(config),
                    Err(e) => tracing::warn!(error = %e, "Failed to reload config"),
                }
            }

            tracing::debug!("Config watcher thread exiting");
        });

        tracing::info!(path = %config_path.display(), "Config hot-reload watcher started");

        Ok(Self { _watcher: watcher })
    }
}

/// Read the reloadable part of a config file.
pub fn parse_config(path: &Path) -> MaestroResult<ReloadableConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MaestroError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    let config: ReloadableConfig = toml::from_str(&content).map_err(|e| {
        MaestroError::Config(format!("Failed to parse config '{}': {e}", path.display()))
    })?;
    if let Some(agents) = &config.agents {
        validate_agents(agents)?;
    }
    Ok(config)
}
