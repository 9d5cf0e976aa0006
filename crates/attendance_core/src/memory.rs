//! crates/attendance_core/src/memory.rs
//!
//! In-process implementations of every port. They back the test-suite and the
//! service's `memory` storage backend, and honour the same atomicity contracts
//! as the database adapter: each conditional write happens under one lock.

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    AttendanceRecord, Course, FinalizationResult, RosterEntry, Session, SessionStatus,
};
use crate::ports::{
    AttendanceStore, Clock, CourseCatalog, FeedEvent, InsertOutcome, PortError, PortResult,
    RecordFilter, RecordStream, RosterProvider, SessionRepository,
};

const FEED_CAPACITY: usize = 256;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//=========================================================================================
// Clock
//=========================================================================================

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *locked(&self.now) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = locked(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *locked(&self.now)
    }
}

//=========================================================================================
// Courses and Rosters
//=========================================================================================

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    courses: Mutex<HashMap<String, Course>>,
    classes: Mutex<HashMap<String, Vec<RosterEntry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_course(
        &self,
        course_id: &str,
        name: Option<&str>,
        class_name: Option<&str>,
        owner_id: Option<&str>,
    ) {
        let course = Course {
            id: course_id.to_string(),
            name: name.map(str::to_string),
            class_name: class_name.map(str::to_string),
            owner_id: owner_id.map(str::to_string),
        };
        locked(&self.courses).insert(course.id.clone(), course);
    }

    /// Adds a student to a class. Enrolling the same student twice replaces the name.
    pub fn enroll(&self, class_name: &str, student_id: &str, display_name: &str) {
        let mut classes = locked(&self.classes);
        let roster = classes.entry(class_name.to_string()).or_default();
        roster.retain(|entry| entry.student_id != student_id);
        roster.push(RosterEntry {
            student_id: student_id.to_string(),
            display_name: display_name.to_string(),
        });
    }
}

#[async_trait]
impl CourseCatalog for InMemoryDirectory {
    async fn get_course(&self, course_id: &str) -> PortResult<Course> {
        locked(&self.courses)
            .get(course_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("course {}", course_id)))
    }
}

#[async_trait]
impl RosterProvider for InMemoryDirectory {
    async fn students_in_class(&self, class_name: &str) -> PortResult<Vec<RosterEntry>> {
        Ok(locked(&self.classes)
            .get(class_name)
            .cloned()
            .unwrap_or_default())
    }
}

//=========================================================================================
// Attendance Records
//=========================================================================================

pub struct InMemoryAttendanceStore {
    records: Mutex<Vec<AttendanceRecord>>,
    feed: broadcast::Sender<AttendanceRecord>,
    batch_failures: AtomicU32,
}

impl Default for InMemoryAttendanceStore {
    fn default() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            records: Mutex::new(Vec::new()),
            feed,
            batch_failures: AtomicU32::new(0),
        }
    }
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record in insertion order.
    pub fn records(&self) -> Vec<AttendanceRecord> {
        locked(&self.records).clone()
    }

    /// Makes the next `count` batch writes fail as if the store were unreachable.
    pub fn inject_batch_failures(&self, count: u32) {
        self.batch_failures.store(count, Ordering::SeqCst);
    }

    fn publish(&self, records: &[AttendanceRecord]) {
        for record in records {
            // No receivers is fine.
            let _ = self.feed.send(record.clone());
        }
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn insert_if_absent(&self, record: AttendanceRecord) -> PortResult<InsertOutcome> {
        {
            let mut records = locked(&self.records);
            let key = record.key();
            if records.iter().any(|r| r.key() == key) {
                return Ok(InsertOutcome::Conflict);
            }
            records.push(record.clone());
        }
        self.publish(std::slice::from_ref(&record));
        Ok(InsertOutcome::Inserted)
    }

    async fn query(&self, filter: &RecordFilter) -> PortResult<Vec<AttendanceRecord>> {
        Ok(locked(&self.records)
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn batch_write(&self, batch: Vec<AttendanceRecord>) -> PortResult<()> {
        let failing = self
            .batch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PortError::Unavailable("injected batch failure".into()));
        }

        {
            let mut records = locked(&self.records);
            let existing: HashSet<_> = records.iter().map(AttendanceRecord::key).collect();
            let mut incoming = HashSet::new();
            for record in &batch {
                let key = record.key();
                if existing.contains(&key) || !incoming.insert(key) {
                    return Err(PortError::Conflict(format!(
                        "attendance for {} in {} on {} already exists",
                        record.user_id, record.course_id, record.day
                    )));
                }
            }
            records.extend(batch.iter().cloned());
        }
        self.publish(&batch);
        Ok(())
    }

    async fn subscribe(&self, filter: RecordFilter) -> PortResult<RecordStream> {
        let mut rx = self.feed.subscribe();
        Ok(Box::pin(stream! {
            loop {
                match rx.recv().await {
                    Ok(record) => {
                        if filter.matches(&record) {
                            yield FeedEvent::Record(record);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Record feed subscriber lagged behind");
                        yield FeedEvent::Gap;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: Uuid) -> Option<Session> {
        locked(&self.sessions).get(&session_id).cloned()
    }

    fn filtered(&self, keep: impl Fn(&Session) -> bool) -> Vec<Session> {
        let mut sessions: Vec<Session> = locked(&self.sessions)
            .values()
            .filter(|s| keep(s))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert_active(&self, session: Session) -> PortResult<()> {
        let mut sessions = locked(&self.sessions);
        if sessions
            .values()
            .any(|s| s.course_id == session.course_id && s.is_active())
        {
            return Err(PortError::Conflict(format!(
                "course {} already has an active session",
                session.course_id
            )));
        }
        sessions.insert(session.id, session);
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        self.get(session_id)
            .ok_or_else(|| PortError::NotFound(format!("session {}", session_id)))
    }

    async fn find_active_for_course(&self, course_id: &str) -> PortResult<Option<Session>> {
        Ok(self
            .filtered(|s| s.course_id == course_id && s.is_active())
            .into_iter()
            .next())
    }

    async fn find_active_for_owner(&self, owner_id: &str) -> PortResult<Vec<Session>> {
        Ok(self.filtered(|s| s.owner_id == owner_id && s.is_active()))
    }

    async fn list_by_status(&self, status: SessionStatus) -> PortResult<Vec<Session>> {
        Ok(self.filtered(|s| s.status == status))
    }

    async fn transition(
        &self,
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> PortResult<bool> {
        let mut sessions = locked(&self.sessions);
        match sessions.get_mut(&session_id) {
            Some(session) if session.status == from => {
                session.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PortError::NotFound(format!("session {}", session_id))),
        }
    }

    async fn mark_finalized(
        &self,
        session_id: Uuid,
        outcome: FinalizationResult,
    ) -> PortResult<bool> {
        let mut sessions = locked(&self.sessions);
        match sessions.get_mut(&session_id) {
            Some(session) if session.status == SessionStatus::Expired => {
                session.status = SessionStatus::Finalized;
                session.outcome = Some(outcome);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PortError::NotFound(format!("session {}", session_id))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{AttendanceEngine, Ports};
    use crate::finalization::FinalizationEngine;
    use chrono::{Offset, TimeZone};
    use std::sync::Arc;

    pub const COURSE: &str = "math101";

    /// A fully wired in-memory world: one course "Mathematics" for class
    /// TI-23-KA owned by dosen1, with students s1, s2 and s3 enrolled.
    pub struct Harness {
        pub clock: Arc<ManualClock>,
        pub directory: Arc<InMemoryDirectory>,
        pub store: Arc<InMemoryAttendanceStore>,
        pub repo: Arc<InMemorySessionRepository>,
    }

    impl Harness {
        pub fn new() -> Self {
            let start = Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap();
            let directory = InMemoryDirectory::new();
            directory.add_course(COURSE, Some("Mathematics"), Some("TI-23-KA"), Some("dosen1"));
            directory.enroll("TI-23-KA", "s1", "Andi");
            directory.enroll("TI-23-KA", "s2", "Budi");
            directory.enroll("TI-23-KA", "s3", "Citra");
            Self {
                clock: Arc::new(ManualClock::new(start)),
                directory: Arc::new(directory),
                store: Arc::new(InMemoryAttendanceStore::new()),
                repo: Arc::new(InMemorySessionRepository::new()),
            }
        }

        pub fn config() -> EngineConfig {
            EngineConfig::new(
                Duration::seconds(20),
                Utc.fix(),
                3,
                std::time::Duration::ZERO,
            )
            .unwrap()
        }

        pub fn ports(&self) -> Ports {
            Ports {
                clock: self.clock.clone(),
                roster: self.directory.clone(),
                courses: self.directory.clone(),
                records: self.store.clone(),
                sessions: self.repo.clone(),
            }
        }

        pub fn engine(&self) -> AttendanceEngine {
            AttendanceEngine::new(self.ports(), Self::config())
        }

        pub fn finalizer(&self) -> FinalizationEngine {
            FinalizationEngine::new(self.ports(), Self::config())
        }

        pub async fn open_session(&self) -> Session {
            self.engine()
                .sessions
                .create_session(COURSE, "dosen1")
                .await
                .unwrap()
        }

        /// Claims the session for finalization without running it.
        pub async fn expire(&self, session: &Session) {
            assert!(self
                .repo
                .transition(session.id, SessionStatus::Active, SessionStatus::Expired)
                .await
                .unwrap());
        }

        /// An unsaved active session starting now.
        pub fn session_fixture(&self) -> Session {
            let now = self.clock.now();
            Session {
                id: Uuid::new_v4(),
                course_id: COURSE.to_string(),
                course_name: "Mathematics".to_string(),
                class_name: "TI-23-KA".to_string(),
                owner_id: "dosen1".to_string(),
                created_at: now,
                expires_at: now + Duration::seconds(20),
                day: now.date_naive(),
                status: SessionStatus::Active,
                outcome: None,
            }
        }
    }

    #[tokio::test]
    async fn batch_write_is_all_or_nothing() {
        let harness = Harness::new();
        let session = harness.session_fixture();
        let t0 = session.created_at;
        let first = AttendanceRecord::for_session(&session, "s1", crate::domain::AttendanceStatus::Present, t0);
        harness.store.insert_if_absent(first).await.unwrap();

        let batch = vec![
            AttendanceRecord::for_session(&session, "s2", crate::domain::AttendanceStatus::Absent, t0),
            AttendanceRecord::for_session(&session, "s1", crate::domain::AttendanceStatus::Absent, t0),
        ];
        assert!(matches!(
            harness.store.batch_write(batch).await,
            Err(PortError::Conflict(_))
        ));
        assert_eq!(harness.store.records().len(), 1);
    }

    #[tokio::test]
    async fn only_one_active_session_per_course() {
        let harness = Harness::new();
        harness.repo.insert_active(harness.session_fixture()).await.unwrap();
        assert!(matches!(
            harness.repo.insert_active(harness.session_fixture()).await,
            Err(PortError::Conflict(_))
        ));
    }
}
