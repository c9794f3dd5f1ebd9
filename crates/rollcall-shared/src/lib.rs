//! # rollcall-shared
//!
//! Types shared by every Rollcall crate: attendance enums, the remote wire
//! records, and the JSON [`tree::DataTree`] that backs the realtime database
//! both on the server and in the in-memory remote used by tests.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod tree;
pub mod types;

pub use error::{SharedError, TreeError};
