//! crates/attendance_core/src/ports.rs
//!
//! Defines the service contracts (traits) the attendance engine depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store, roster source and clock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    AttendanceRecord, AttendanceStatus, Course, FinalizationResult, RosterEntry, Session,
    SessionStatus,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The backing service is temporarily unreachable; the whole operation may be retried.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// One item of the live record feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Record(AttendanceRecord),
    /// Records were written that this subscriber never saw. Anything derived
    /// from the feed must be reloaded from the store.
    Gap,
}

/// A live feed of newly written attendance records. Dropping it unsubscribes.
pub type RecordStream = Pin<Box<dyn Stream<Item = FeedEvent> + Send>>;

//=========================================================================================
// Query Filters
//=========================================================================================

/// Conjunctive filter over attendance records; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub session_id: Option<Uuid>,
    pub course_id: Option<String>,
    pub user_id: Option<String>,
    pub owner_id: Option<String>,
    pub day: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
}

impl RecordFilter {
    pub fn session(session_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    pub fn course_day(course_id: &str, day: NaiveDate) -> Self {
        Self {
            course_id: Some(course_id.to_string()),
            day: Some(day),
            ..Default::default()
        }
    }

    pub fn student(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        }
    }

    pub fn owner(owner_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: AttendanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.session_id.map_or(true, |id| record.session_id == Some(id))
            && self.course_id.as_ref().map_or(true, |c| &record.course_id == c)
            && self.user_id.as_ref().map_or(true, |u| &record.user_id == u)
            && self.owner_id.as_ref().map_or(true, |o| &record.owner_id == o)
            && self.day.map_or(true, |d| record.day == d)
            && self.status.map_or(true, |s| record.status == s)
    }
}

/// Result of a conditional insert keyed on `(user_id, course_id, day)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same key already exists; nothing was written.
    Conflict,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Supplies the current instant. Abstracted so tests can drive time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait RosterProvider: Send + Sync {
    /// Returns every student enrolled in the given class.
    async fn students_in_class(&self, class_name: &str) -> PortResult<Vec<RosterEntry>>;
}

#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Looks up a course. Returns `PortError::NotFound` if it does not exist.
    async fn get_course(&self, course_id: &str) -> PortResult<Course>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Writes the record unless one already exists for its `(user_id, course_id, day)` key.
    /// The check and the write must be a single atomic step.
    async fn insert_if_absent(&self, record: AttendanceRecord) -> PortResult<InsertOutcome>;

    async fn query(&self, filter: &RecordFilter) -> PortResult<Vec<AttendanceRecord>>;

    /// Writes all records or none. Fails with `PortError::Conflict` if any key already exists.
    async fn batch_write(&self, records: Vec<AttendanceRecord>) -> PortResult<()>;

    /// Streams records written after the call that match `filter`. Missed records
    /// are reported as a `FeedEvent::Gap`, never skipped silently.
    async fn subscribe(&self, filter: RecordFilter) -> PortResult<RecordStream>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persists a new active session. Fails with `PortError::Conflict` if the course
    /// already has an active one.
    async fn insert_active(&self, session: Session) -> PortResult<()>;

    /// Returns `PortError::NotFound` if no such session exists.
    async fn get_session(&self, session_id: Uuid) -> PortResult<Session>;

    async fn find_active_for_course(&self, course_id: &str) -> PortResult<Option<Session>>;

    async fn find_active_for_owner(&self, owner_id: &str) -> PortResult<Vec<Session>>;

    async fn list_by_status(&self, status: SessionStatus) -> PortResult<Vec<Session>>;

    /// Atomically moves the session from `from` to `to`. Returns `false` if the
    /// session was not in `from`, i.e. another caller won the transition.
    async fn transition(
        &self,
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> PortResult<bool>;

    /// Atomically moves an `Expired` session to `Finalized`, storing its outcome.
    async fn mark_finalized(
        &self,
        session_id: Uuid,
        outcome: FinalizationResult,
    ) -> PortResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(user: &str, status: AttendanceStatus) -> AttendanceRecord {
        let ts = Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap();
        AttendanceRecord {
            id: Uuid::new_v4(),
            user_id: user.into(),
            course_id: "math101".into(),
            course_name: "Math".into(),
            owner_id: "dosen1".into(),
            session_id: None,
            timestamp: ts,
            day: ts.date_naive(),
            status,
            notes: None,
        }
    }

    #[test]
    fn filter_fields_are_conjunctive() {
        let rec = record("s1", AttendanceStatus::ExcusedSick);
        let day = rec.day;

        assert!(RecordFilter::default().matches(&rec));
        assert!(RecordFilter::course_day("math101", day).matches(&rec));
        assert!(!RecordFilter::course_day("math101", day)
            .with_status(AttendanceStatus::Present)
            .matches(&rec));
        assert!(!RecordFilter::course_day("math101", day)
            .with_user("s2")
            .matches(&rec));
        assert!(!RecordFilter::session(Uuid::new_v4()).matches(&rec));
    }
}
