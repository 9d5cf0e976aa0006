//! crates/attendance_core/src/domain.rs
//!
//! Defines the pure, core data structures for the attendance engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Courses and Rosters
//=========================================================================================

/// A course as supplied by the external course catalog.
///
/// Fields are optional because the catalog is not trusted to be complete;
/// session creation refuses a course with any of them missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: String,
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub owner_id: Option<String>,
}

/// A course whose required metadata has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseInfo {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub owner_id: String,
}

/// One enrolled student, as returned by the roster provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub student_id: String,
    pub display_name: String,
}

//=========================================================================================
// Sessions
//=========================================================================================

/// Lifecycle state of an attendance session.
///
/// `Active -> Expired -> Finalized`, or `Active -> Cancelled`. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Active,
    /// The window closed and the session was claimed for finalization, which
    /// has not completed yet.
    Expired,
    Finalized,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Finalized => "finalized",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Finalized | SessionStatus::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            "finalized" => Ok(SessionStatus::Finalized),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// A time-boxed window during which students may check in for one course meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub course_id: String,
    pub course_name: String,
    pub class_name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Calendar day the session belongs to; every record it produces uses this day.
    pub day: NaiveDate,
    pub status: SessionStatus,
    pub outcome: Option<FinalizationResult>,
}

impl Session {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// True once `now` has reached the end of the window, whatever the stored status.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether a scan at `now` may still be accepted.
    pub fn accepts_scans_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now <= self.expires_at
    }

    /// Remaining whole seconds, derived from the stored expiry and never cached.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_active() {
            return 0;
        }
        (self.expires_at - now).num_seconds().max(0)
    }
}

//=========================================================================================
// Attendance Records
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttendanceStatus {
    Present,
    Absent,
    ExcusedLeave,
    ExcusedSick,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::ExcusedLeave => "excused_leave",
            AttendanceStatus::ExcusedSick => "excused_sick",
        }
    }

    pub fn is_excused(&self) -> bool {
        matches!(
            self,
            AttendanceStatus::ExcusedLeave | AttendanceStatus::ExcusedSick
        )
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "excused_leave" => Ok(AttendanceStatus::ExcusedLeave),
            "excused_sick" => Ok(AttendanceStatus::ExcusedSick),
            other => Err(format!("unknown attendance status '{}'", other)),
        }
    }
}

/// The uniqueness key of an attendance record: one record per student, course and day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttendanceKey {
    pub user_id: String,
    pub course_id: String,
    pub day: NaiveDate,
}

/// An immutable attendance entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub course_name: String,
    pub owner_id: String,
    /// `None` for manual entries made outside any live session.
    pub session_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub day: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
}

impl AttendanceRecord {
    pub fn key(&self) -> AttendanceKey {
        AttendanceKey {
            user_id: self.user_id.clone(),
            course_id: self.course_id.clone(),
            day: self.day,
        }
    }

    /// Builds a session-scoped record (present or absent) for one student.
    pub fn for_session(
        session: &Session,
        user_id: &str,
        status: AttendanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            course_id: session.course_id.clone(),
            course_name: session.course_name.clone(),
            owner_id: session.owner_id.clone(),
            session_id: Some(session.id),
            timestamp,
            day: session.day,
            status,
            notes: None,
        }
    }
}

//=========================================================================================
// Results and Projections
//=========================================================================================

/// Counts produced by reconciling a roster against check-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinalizationResult {
    pub present_count: usize,
    pub absent_count: usize,
    /// Enrolled students skipped because they already had another record that day.
    pub excused_count: usize,
}

/// A student shown in a presence list or a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentEntry {
    pub student_id: String,
    pub display_name: String,
    pub recorded_at: DateTime<Utc>,
}

/// Live projection of who has checked in for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub session_id: Uuid,
    pub present: Vec<StudentEntry>,
}

impl PresenceSnapshot {
    pub fn count(&self) -> usize {
        self.present.len()
    }
}

/// A session together with its countdown, as shown to an instructor view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub session: Session,
    pub remaining_secs: i64,
}

impl SessionView {
    pub fn at(session: Session, now: DateTime<Utc>) -> Self {
        let remaining_secs = session.remaining_secs(now);
        Self {
            session,
            remaining_secs,
        }
    }
}

/// Per-session attendance overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub course_id: String,
    pub course_name: String,
    pub held_at: DateTime<Utc>,
    pub present: Vec<StudentEntry>,
    pub absent: Vec<StudentEntry>,
}
