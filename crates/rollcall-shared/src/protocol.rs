//! Records exchanged with the remote realtime database.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{SERVER_TIMESTAMP, SERVER_VALUE_KEY};
use crate::types::{AttendanceStatus, Classification};

/// Attendance record as written to a new slot under the remote
/// `attendance` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAttendance {
    pub student_id: String,
    /// Occurrence instant, epoch millis.
    pub timestamp: i64,
    pub status: AttendanceStatus,
    pub classification: Classification,
    /// Empty for homeroom attendance.
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Server-assigned write time. Sent as a [`server_timestamp`] placeholder.
    pub updated_at: Value,
    /// Label of the device that recorded the entry.
    pub device: String,
}

/// Active session marker stored at `sessions/{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub device: String,
    #[serde(default)]
    pub since: Option<i64>,
}

/// Placeholder the remote replaces with its own clock on write.
pub fn server_timestamp() -> Value {
    json!({ SERVER_VALUE_KEY: SERVER_TIMESTAMP })
}

/// Returns `true` if `value` is exactly the server-timestamp placeholder.
pub fn is_server_timestamp(value: &Value) -> bool {
    match value.as_object() {
        Some(map) if map.len() == 1 => {
            map.get(SERVER_VALUE_KEY).and_then(Value::as_str) == Some(SERVER_TIMESTAMP)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homeroom_record_serializes_without_period() {
        let record = RemoteAttendance {
            student_id: "S001".into(),
            timestamp: 1_700_000_000_000,
            status: AttendanceStatus::Present,
            classification: Classification::Homeroom,
            subject: String::new(),
            period: None,
            updated_at: server_timestamp(),
            device: "tablet-1".into(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["subject"], "");
        assert_eq!(value["status"], "present");
        assert!(value.get("period").is_none());
        assert!(is_server_timestamp(&value["updated_at"]));
    }

    #[test]
    fn placeholder_detection_is_exact() {
        assert!(is_server_timestamp(&server_timestamp()));
        assert!(!is_server_timestamp(&json!({ ".sv": "increment" })));
        assert!(!is_server_timestamp(&json!({ ".sv": "timestamp", "x": 1 })));
        assert!(!is_server_timestamp(&json!(42)));
    }
}
