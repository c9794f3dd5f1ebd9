//! The sync cycle: pull rosters, push unsynced attendance, push rosters.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use rollcall_shared::constants::{
    ATTENDANCE_PATH, EVENTS_PATH, PERIODS_PATH, STUDENTS_PATH, SUBJECT_CLASSES_PATH, TEACHERS_PATH,
};
use rollcall_shared::protocol::{server_timestamp, RemoteAttendance};
use rollcall_shared::types::Classification;
use rollcall_store::{
    AcademicPeriod, AttendanceRecord, Database, SchoolEvent, Student, SubjectClass, Teacher,
};

use crate::cursor::SyncCursor;
use crate::error::{SyncError, SyncResult};
use crate::notifier::{Notifier, SyncEvent};
use crate::remote::{fetch_collection, keyed_entries, RemoteStore};
use crate::scheduler::SyncJob;
use crate::session::SessionContext;

/// Rows written locally by the pull step, per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullCounts {
    pub teachers: usize,
    pub students: usize,
    pub events: usize,
    pub periods: usize,
    pub subject_classes: usize,
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub pulled: PullCounts,
    pub pushed_attendance: usize,
    pub pushed_teachers: usize,
    pub pushed_students: usize,
    /// Epoch millis written to the cursor.
    pub finished_at: i64,
}

impl CycleReport {
    fn summary(&self) -> String {
        format!(
            "{} attendance record(s) uploaded, {} teacher(s) and {} student(s) refreshed",
            self.pushed_attendance, self.pulled.teachers, self.pulled.students
        )
    }
}

/// Reconciles the local store with a remote store.
///
/// Holds no lock of its own across a cycle: callers must not run two cycles
/// at once (the [`crate::Scheduler`] guarantees this).
pub struct Reconciler {
    db: Arc<Mutex<Database>>,
    remote: Arc<dyn RemoteStore>,
    cursor: SyncCursor,
    notifier: Arc<dyn Notifier>,
    session: SessionContext,
}

impl Reconciler {
    pub fn new(
        db: Arc<Mutex<Database>>,
        remote: Arc<dyn RemoteStore>,
        cursor: SyncCursor,
        notifier: Arc<dyn Notifier>,
        session: SessionContext,
    ) -> Self {
        Self {
            db,
            remote,
            cursor,
            notifier,
            session,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Time of the last fully successful cycle.
    pub async fn last_sync(&self) -> SyncResult<Option<i64>> {
        self.cursor.load().await
    }

    /// Run one full cycle, emitting started / succeeded / failed events.
    ///
    /// On error nothing is rolled back: rows marked synced stay synced and
    /// pulled collections stay pulled. The caller decides whether to retry.
    pub async fn run_sync_cycle(&self) -> SyncResult<CycleReport> {
        self.notifier.notify(SyncEvent::Started);
        tracing::info!(device = %self.session.device_label, "sync cycle started");

        match self.cycle().await {
            Ok(report) => {
                tracing::info!(
                    pushed_attendance = report.pushed_attendance,
                    pushed_teachers = report.pushed_teachers,
                    pushed_students = report.pushed_students,
                    "sync cycle finished"
                );
                self.notifier.notify(SyncEvent::Succeeded {
                    summary: report.summary(),
                });
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sync cycle aborted");
                self.notifier.notify(SyncEvent::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> SyncResult<CycleReport> {
        let pulled = self.pull_authoritative().await?;
        let pushed_attendance = self.push_unsynced_attendance().await?;
        let (pushed_teachers, pushed_students) = self.push_rosters().await?;

        let finished_at = chrono::Utc::now().timestamp_millis();
        self.cursor.store(finished_at).await?;

        Ok(CycleReport {
            pulled,
            pushed_attendance,
            pushed_teachers,
            pushed_students,
            finished_at,
        })
    }

    /// Step 1: replace each local collection with the remote snapshot.
    ///
    /// Each collection is fetched and applied before the next one is read,
    /// so a failure part-way leaves the earlier collections pulled.
    pub async fn pull_authoritative(&self) -> SyncResult<PullCounts> {
        let remote = self.remote.as_ref();
        let mut counts = PullCounts::default();

        let teachers: Vec<Teacher> = fetch_collection(remote, TEACHERS_PATH).await?;
        counts.teachers = self.with_db(|db| db.replace_teachers(&teachers))?;

        let students: Vec<Student> = fetch_collection(remote, STUDENTS_PATH).await?;
        counts.students = self.with_db(|db| db.replace_students(&students))?;

        let events: Vec<SchoolEvent> = fetch_collection(remote, EVENTS_PATH).await?;
        counts.events = self.with_db(|db| db.replace_events(&events))?;

        let periods: Vec<AcademicPeriod> = fetch_collection(remote, PERIODS_PATH).await?;
        counts.periods = self.with_db(|db| db.replace_academic_periods(&periods))?;

        let classes: Vec<SubjectClass> = fetch_collection(remote, SUBJECT_CLASSES_PATH).await?;
        counts.subject_classes = self.with_db(|db| db.replace_subject_classes(&classes))?;

        tracing::debug!(?counts, "pulled authoritative collections");
        Ok(counts)
    }

    /// Step 2: push unsynced attendance one row at a time.
    ///
    /// A row is marked synced only after its own remote write succeeded.
    /// The first failure stops the step; later rows wait for the next cycle.
    pub async fn push_unsynced_attendance(&self) -> SyncResult<usize> {
        let pending = self.with_db(|db| db.list_unsynced_attendance())?;
        if pending.is_empty() {
            return Ok(0);
        }

        tracing::debug!(count = pending.len(), "pushing unsynced attendance");
        let mut pushed = 0;
        for record in &pending {
            let payload = serde_json::to_value(self.remote_record(record))?;
            let key = self.remote.push(ATTENDANCE_PATH, payload).await?;
            self.with_db(|db| db.mark_attendance_synced(&[record.id]))?;
            pushed += 1;
            tracing::trace!(id = record.id, %key, "attendance row synced");
        }
        Ok(pushed)
    }

    /// Step 3: overwrite the remote teacher and student collections with
    /// every local row, keyed by id. An empty local collection is not pushed.
    pub async fn push_rosters(&self) -> SyncResult<(usize, usize)> {
        let teachers = self.with_db(|db| db.list_teachers())?;
        if !teachers.is_empty() {
            self.remote
                .update(TEACHERS_PATH, keyed_entries(&teachers)?)
                .await?;
        }

        let students = self.with_db(|db| db.list_students())?;
        if !students.is_empty() {
            self.remote
                .update(STUDENTS_PATH, keyed_entries(&students)?)
                .await?;
        }

        Ok((teachers.len(), students.len()))
    }

    fn remote_record(&self, record: &AttendanceRecord) -> RemoteAttendance {
        let subject = match record.classification {
            Classification::Homeroom => String::new(),
            Classification::Subject => record.subject.clone().unwrap_or_default(),
        };

        RemoteAttendance {
            student_id: record.student_id.clone(),
            timestamp: record.timestamp,
            status: record.status,
            classification: record.classification,
            subject,
            period: record.period.clone(),
            updated_at: server_timestamp(),
            device: self.session.device_label.clone(),
        }
    }

    /// Run `f` against the local store. The lock is released before return,
    /// so it is never held across an await point.
    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> rollcall_store::Result<T>,
    ) -> SyncResult<T> {
        let db = self.db.lock().map_err(|_| SyncError::LockPoisoned)?;
        Ok(f(&db)?)
    }
}

#[async_trait]
impl SyncJob for Reconciler {
    async fn run(&self) -> SyncResult<()> {
        self.run_sync_cycle().await.map(|_| ())
    }
}
