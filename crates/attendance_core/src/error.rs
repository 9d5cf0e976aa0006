//! crates/attendance_core/src/error.rs
//!
//! Typed outcomes for every rejected engine operation.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::ports::PortError;

/// Coarse category of an [`AttendanceError`], deciding how callers react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or incomplete input. Shown to the user, never retried.
    Validation,
    /// Duplicate session or duplicate attendance. Informative, not retried.
    Conflict,
    /// The session is no longer live. Terminal for that scan.
    Expired,
    /// A session or course is missing.
    NotFound,
    /// The store is unavailable. The whole operation may be retried.
    Transient,
    /// Coordination bug. Surfaced to operators.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("Course {course_id} is missing its {missing}")]
    IncompleteCourseData {
        course_id: String,
        missing: &'static str,
    },

    #[error("User {user_id} does not own course {course_id}")]
    NotCourseOwner { course_id: String, user_id: String },

    #[error("Student {student_id} is not enrolled in class {class_name}")]
    NotEnrolled {
        student_id: String,
        class_name: String,
    },

    #[error("Status {0} cannot be entered manually")]
    NotExcusable(String),

    #[error("The scanned code is not a valid attendance code")]
    MalformedToken(String),

    #[error("Course {course_id} already has an active session")]
    DuplicateSession { course_id: String },

    #[error("Attendance for course {course_id} was already taken on {day}")]
    AlreadyRecorded { course_id: String, day: NaiveDate },

    #[error("Attendance for {student_id} in course {course_id} is already recorded for {day}")]
    DuplicateCheckIn {
        student_id: String,
        course_id: String,
        day: NaiveDate,
    },

    #[error("Session {0} is no longer accepting check-ins")]
    SessionExpired(Uuid),

    #[error("Session {0} is not active")]
    SessionNotActive(Uuid),

    #[error("Session {0} already has check-ins and can only run to expiry")]
    CheckInsRecorded(Uuid),

    #[error("Session {0} is still accepting check-ins")]
    SessionStillOpen(Uuid),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Course {0} not found")]
    CourseNotFound(String),

    #[error("Coordination failure: {0}")]
    FatalCoordination(String),

    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

impl AttendanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::IncompleteCourseData { .. }
            | AttendanceError::NotCourseOwner { .. }
            | AttendanceError::NotEnrolled { .. }
            | AttendanceError::NotExcusable(_)
            | AttendanceError::MalformedToken(_) => ErrorKind::Validation,
            AttendanceError::DuplicateSession { .. }
            | AttendanceError::AlreadyRecorded { .. }
            | AttendanceError::DuplicateCheckIn { .. }
            | AttendanceError::SessionNotActive(_)
            | AttendanceError::CheckInsRecorded(_)
            | AttendanceError::SessionStillOpen(_) => ErrorKind::Conflict,
            AttendanceError::SessionExpired(_) => ErrorKind::Expired,
            AttendanceError::SessionNotFound(_) | AttendanceError::CourseNotFound(_) => {
                ErrorKind::NotFound
            }
            AttendanceError::FatalCoordination(_) => ErrorKind::Fatal,
            AttendanceError::Store(e) => match e {
                PortError::NotFound(_) => ErrorKind::NotFound,
                PortError::Conflict(_) => ErrorKind::Conflict,
                PortError::Unavailable(_) => ErrorKind::Transient,
                PortError::Unexpected(_) => ErrorKind::Fatal,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Stable identifier handed to the display layer.
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::IncompleteCourseData { .. } => "incomplete_course_data",
            AttendanceError::NotCourseOwner { .. } => "not_course_owner",
            AttendanceError::NotEnrolled { .. } => "not_enrolled",
            AttendanceError::NotExcusable(_) => "not_excusable",
            AttendanceError::MalformedToken(_) => "malformed_token",
            AttendanceError::DuplicateSession { .. } => "duplicate_session",
            AttendanceError::AlreadyRecorded { .. } => "already_recorded",
            AttendanceError::DuplicateCheckIn { .. } => "duplicate_check_in",
            AttendanceError::SessionExpired(_) => "session_expired",
            AttendanceError::SessionNotActive(_) => "session_not_active",
            AttendanceError::CheckInsRecorded(_) => "check_ins_recorded",
            AttendanceError::SessionStillOpen(_) => "session_still_open",
            AttendanceError::SessionNotFound(_) => "session_not_found",
            AttendanceError::CourseNotFound(_) => "course_not_found",
            AttendanceError::FatalCoordination(_) => "fatal_coordination",
            AttendanceError::Store(PortError::Unavailable(_)) => "store_unavailable",
            AttendanceError::Store(_) => "store_error",
        }
    }
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;
