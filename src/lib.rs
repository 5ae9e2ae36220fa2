//! # Stagehand
//!
//! Identity, session and room-membership core for a video meeting service,
//! usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! stagehand = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stagehand::config::Config;
//! use stagehand::rooms::LiveKitClient;
//! use stagehand::server::{AppState, create_router};
//! use stagehand::store::{SqliteStore, Store};
//!
//! let config = Config::load("stagehand.toml").unwrap();
//! let store = SqliteStore::new(config.server.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let media = Arc::new(LiveKitClient::new(&config.media).unwrap());
//! let state = Arc::new(AppState::new(config, Arc::new(store), media).unwrap());
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `stagehand` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod rooms;
pub mod server;
pub mod store;
pub mod sweeper;
pub mod types;

pub use error::{Error, Result};
