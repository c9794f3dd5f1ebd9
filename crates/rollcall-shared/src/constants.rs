/// Application name
pub const APP_NAME: &str = "Rollcall";

/// Remote collection holding teacher roster entries, keyed by teacher id
pub const TEACHERS_PATH: &str = "teachers";

/// Remote collection holding student roster entries, keyed by student id
pub const STUDENTS_PATH: &str = "students";

/// Remote collection holding school calendar events
pub const EVENTS_PATH: &str = "events";

/// Remote collection holding academic period configuration
pub const PERIODS_PATH: &str = "config/academic_periods";

/// Remote collection holding subject classes
pub const SUBJECT_CLASSES_PATH: &str = "subject_classes";

/// Remote collection attendance records are pushed into
pub const ATTENDANCE_PATH: &str = "attendance";

/// Remote node prefix for per-user active sessions
pub const SESSIONS_PATH: &str = "sessions";

/// Placeholder key the server replaces with its own clock
pub const SERVER_VALUE_KEY: &str = ".sv";

/// Placeholder value for "server timestamp"
pub const SERVER_TIMESTAMP: &str = "timestamp";

/// Default periodic sync interval in seconds (1 hour)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60 * 60;

/// Default initial retry backoff in seconds
pub const DEFAULT_RETRY_INITIAL_SECS: u64 = 30;

/// Default retry backoff ceiling in seconds (5 hours)
pub const DEFAULT_RETRY_MAX_SECS: u64 = 5 * 60 * 60;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
