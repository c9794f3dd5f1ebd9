//! # rollcall-store
//!
//! Local relational storage for Rollcall, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for attendance records,
//! rosters (teachers, students, subject classes) and the academic calendar.
//! Attendance rows carry a `synced` flag that only the sync reconciler flips.

pub mod attendance;
pub mod calendar;
pub mod classes;
pub mod database;
pub mod export;
pub mod migrations;
pub mod models;
pub mod students;
pub mod teachers;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use export::{AttendanceExport, ImportStats};
pub use models::*;
