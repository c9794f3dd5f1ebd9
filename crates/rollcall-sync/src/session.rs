//! Signed-in identity and the single-device session check.
//!
//! The identity of the person using the device is an explicit
//! [`SessionContext`] handed to whoever needs it. [`SessionGuard`] checks the
//! remote `sessions/{user_id}` marker; what happens when the remote cannot be
//! reached is decided by [`SessionPolicy`].

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use rollcall_shared::constants::SESSIONS_PATH;
use rollcall_shared::protocol::{server_timestamp, RemoteSession};
use rollcall_shared::types::Role;

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub role: Role,
    /// Stamped on every attendance record pushed from this device.
    pub device_label: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, role: Role, device_label: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            device_label: device_label.into(),
        }
    }

    fn remote_path(&self) -> String {
        format!("{SESSIONS_PATH}/{}", self.user_id)
    }
}

/// What to do when the session marker cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// Treat the session as valid while offline.
    #[default]
    FailOpen,
    /// Treat the session as invalid until the remote confirms it.
    FailClosed,
}

impl FromStr for SessionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            other => Err(format!("unknown session policy: {other}")),
        }
    }
}

impl fmt::Display for SessionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailOpen => f.write_str("fail-open"),
            Self::FailClosed => f.write_str("fail-closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// The remote marker names this device, or there is no marker.
    Valid,
    /// The remote could not be asked; allowed by [`SessionPolicy::FailOpen`].
    Unverified,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionGuard {
    policy: SessionPolicy,
}

impl SessionGuard {
    pub fn new(policy: SessionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Record this device as the active one for the user.
    pub async fn claim(&self, remote: &dyn RemoteStore, ctx: &SessionContext) -> SyncResult<()> {
        remote
            .set(
                &ctx.remote_path(),
                serde_json::json!({ "device": ctx.device_label, "since": server_timestamp() }),
            )
            .await?;
        tracing::info!(user = %ctx.user_id, device = %ctx.device_label, "session claimed");
        Ok(())
    }

    /// Check that the user is still signed in on this device.
    ///
    /// A marker naming another device is always [`SyncError::SessionRejected`].
    /// A remote failure is decided by the policy.
    pub async fn verify(
        &self,
        remote: &dyn RemoteStore,
        ctx: &SessionContext,
    ) -> SyncResult<SessionStatus> {
        let marker = match remote.read(&ctx.remote_path()).await {
            Ok(marker) => marker,
            Err(e) => {
                return match self.policy {
                    SessionPolicy::FailOpen => {
                        tracing::warn!(error = %e, "session check failed, allowing (fail-open)");
                        Ok(SessionStatus::Unverified)
                    }
                    SessionPolicy::FailClosed => {
                        tracing::warn!(error = %e, "session check failed, denying (fail-closed)");
                        Err(e)
                    }
                };
            }
        };

        let Some(marker) = marker else {
            return Ok(SessionStatus::Valid);
        };

        let session: RemoteSession = decode_session(&ctx.remote_path(), marker)?;
        if session.device == ctx.device_label {
            Ok(SessionStatus::Valid)
        } else {
            Err(SyncError::SessionRejected(session.device))
        }
    }
}

fn decode_session(path: &str, value: Value) -> SyncResult<RemoteSession> {
    serde_json::from_value(value).map_err(|source| SyncError::Decode {
        path: path.to_string(),
        key: String::new(),
        source,
    })
}
