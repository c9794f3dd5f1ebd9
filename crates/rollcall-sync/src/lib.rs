//! # rollcall-sync
//!
//! Best-effort two-way synchronization between the on-device store and the
//! remote realtime database.
//!
//! One [`Reconciler::run_sync_cycle`] call:
//! 1. pulls the authoritative collections (teachers, students, events,
//!    academic periods, subject classes) and replaces local rows by id,
//! 2. pushes every unsynced attendance row to a new remote slot, marking
//!    each row synced only after its own write succeeded,
//! 3. overwrites the remote teacher and student collections with the local
//!    rows, keyed by id,
//! 4. records the time of the successful cycle in the [`SyncCursor`].
//!
//! A cycle is not transactional. Any error aborts the remaining steps and
//! leaves earlier progress in place; repeating the cycle is always safe.
//! Single-flight execution, connectivity gating and retry backoff belong to
//! the [`Scheduler`], not to the reconciler.

pub mod config;
pub mod cursor;
pub mod error;
pub mod http;
pub mod memory;
pub mod notifier;
pub mod reconciler;
pub mod remote;
pub mod scheduler;
pub mod session;

pub use config::{RetryConfig, SyncConfig};
pub use cursor::SyncCursor;
pub use error::{SyncError, SyncResult};
pub use http::HttpRemote;
pub use memory::MemoryRemote;
pub use notifier::{BroadcastNotifier, LogNotifier, Notifier, SyncEvent};
pub use reconciler::{CycleReport, PullCounts, Reconciler};
pub use remote::RemoteStore;
pub use scheduler::{
    AlwaysOnline, Connectivity, Enqueue, Scheduler, SchedulerConfig, SchedulerStats, SyncJob, Trigger,
};
pub use session::{SessionContext, SessionGuard, SessionPolicy, SessionStatus};
