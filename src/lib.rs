//! # Todo App Core
//!
//! A small to-do list service. Items live in a document store and requests
//! are authenticated by an upstream proxy that injects a client principal
//! header.
//!
//! ## Pieces
//!
//! - [`todo_service::TodoService`]: create, get, list, update (upsert) and
//!   delete over one collection of [`todo_item::TodoItem`] documents.
//! - [`document_store::DocumentStore`]: the store seam, addressed by
//!   (partition key, id), with paged queries in the dialect of [`query`].
//!   [`lmdb_store::LmdbStore`] is the shipped implementation.
//! - [`principal::PrincipalDecoder`]: turns `X-MS-CLIENT-PRINCIPAL` into an
//!   [`principal::Identity`]; any failure yields an anonymous identity.
//! - [`routes`]: the HTTP surface, started by [`start_server`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use todo_app_core::lmdb_store::LmdbStore;
//! use todo_app_core::todo_item::TodoItem;
//! use todo_app_core::todo_service::TodoService;
//!
//! let store = LmdbStore::open("./data", "todos", "items")?;
//! let todos = TodoService::new(Arc::new(store));
//!
//! let created = todos.create(TodoItem::new("Buy milk", ""))?;
//! let open = todos.list(Some("SELECT * FROM c WHERE c.isCompleted = false"))?;
//! assert!(open.iter().any(|item| item.id == created.id));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod app_response;
pub mod config;
pub mod document_store;
pub mod error;
pub mod lmdb_store;
pub mod principal;
pub mod query;
pub mod routes;
pub mod state;
pub mod todo_item;
pub mod todo_service;
mod test;

use std::sync::Arc;

use log::{info, warn};
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::Config;
use crate::lmdb_store::LmdbStore;
use crate::state::AppState;

/// Opens the store, serves until Ctrl+C or SIGTERM, then flushes the store.
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Initializing state...");
    let store = Arc::new(LmdbStore::open(
        &config.data_dir,
        &config.database_name,
        &config.container_name,
    )?);
    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(config, store.clone());

    let app = routes::router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    if let Err(e) = store.close_database() {
        warn!("Failed to flush database on shutdown: {e}");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => warn!("Failed to install Ctrl+C handler: {e}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
