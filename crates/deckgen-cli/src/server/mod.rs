//! HTTP front end: threaded accept loop over a shared async runtime.
//!
//! Each request is handled on its own thread. Async work (provider
//! streams, storage I/O) runs on the runtime owned by the serve command
//! and is reached through its `Handle`; streaming responses bridge back
//! to the synchronous response body via [`sse::FrameReader`].

use std::sync::Arc;
use std::thread;

use anyhow::{Result, anyhow};
use deckgen_core::config::Config;
use deckgen_core::store::DeckStore;
use tiny_http::Server;
use tokio::runtime::Handle;
use tracing::info;

mod routes;
mod sse;

/// Shared state handed to every request thread.
pub struct ServerState {
    pub config: Config,
    pub store: DeckStore,
    pub handle: Handle,
}

/// Binds the listen address and serves requests until the process exits.
pub fn serve(config: Config, store: DeckStore, handle: Handle) -> Result<()> {
    let addr = config.server.addr();
    let server = Server::http(&addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
    info!(%addr, backend = store.backend_name(), "deckgen listening");

    let state = Arc::new(ServerState {
        config,
        store,
        handle,
    });

    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        thread::spawn(move || routes::handle(&state, request));
    }

    Ok(())
}
