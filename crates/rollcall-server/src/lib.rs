//! # rollcall-server
//!
//! Realtime-database style JSON tree served over HTTP. Every node is
//! addressed as `/db/{path}` and supports read, replace, push, merge and
//! delete. Writes resolve `{".sv": "timestamp"}` placeholders with the
//! server clock. The tree can be snapshotted to a JSON file so it survives
//! restarts.

pub mod api;
pub mod config;
pub mod error;
pub mod tree_store;

pub use api::{build_router, serve, serve_on, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
pub use tree_store::TreeStore;
