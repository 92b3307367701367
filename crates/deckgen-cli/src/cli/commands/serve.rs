//! Serve command handler.

use std::path::Path;

use anyhow::{Context, Result};
use deckgen_core::config::Config;
use deckgen_core::store::DeckStore;

use crate::server;

pub struct ServeOptions<'a> {
    pub config_path: Option<&'a str>,
    pub host: Option<&'a str>,
    pub port: Option<u16>,
    pub storage_dir: Option<&'a str>,
}

pub fn run(options: &ServeOptions<'_>) -> Result<()> {
    let mut config = match options.config_path {
        Some(path) => Config::load_from(Path::new(path))
            .with_context(|| format!("load config from {path}"))?,
        None => Config::load().context("load config")?,
    };

    // Flags win over file config
    if let Some(host) = options.host {
        config.server.host = host.to_string();
    }
    if let Some(port) = options.port {
        config.server.port = port;
    }
    if let Some(dir) = options.storage_dir {
        config.storage.dir = dir.to_string();
    }

    // one tokio runtime for everything; request threads reach it by handle
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    let store = DeckStore::from_env(&config.storage).context("initialize deck store")?;

    server::serve(config, store, rt.handle().clone())
}
