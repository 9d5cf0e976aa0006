//! crates/attendance_core/src/check_in.rs
//!
//! Validates scanned tokens against live sessions and records presence.

use tracing::{info, warn};

use crate::domain::{AttendanceRecord, AttendanceStatus};
use crate::engine::Ports;
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::{InsertOutcome, PortError};
use crate::token;

pub struct CheckInProcessor {
    ports: Ports,
}

impl CheckInProcessor {
    pub fn new(ports: Ports) -> Self {
        Self { ports }
    }

    /// Records `student_id` as present for the session encoded in `token`.
    ///
    /// Checks run in order token, session, liveness, enrolment, duplicate, so the caller
    /// always gets the most specific reason. The duplicate check and the write
    /// are one conditional insert; concurrent scans by the same student yield a
    /// single record.
    pub async fn submit_scan(
        &self,
        token: &str,
        student_id: &str,
    ) -> AttendanceResult<AttendanceRecord> {
        let session_id = token::decode(token)?;

        let session = match self.ports.sessions.get_session(session_id).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => {
                warn!(%session_id, student_id, "Scan for unknown session");
                return Err(AttendanceError::SessionNotFound(session_id));
            }
            Err(e) => return Err(e.into()),
        };

        // The stored expiry wins even if no observer has flipped the status yet.
        let now = self.ports.clock.now();
        if !session.accepts_scans_at(now) {
            warn!(%session_id, student_id, status = %session.status, "Scan after session closed");
            return Err(AttendanceError::SessionExpired(session_id));
        }

        let enrolled = self
            .ports
            .roster
            .students_in_class(&session.class_name)
            .await?
            .iter()
            .any(|s| s.student_id == student_id);
        if !enrolled {
            warn!(%session_id, student_id, class_name = %session.class_name, "Scan from a student outside the class");
            return Err(AttendanceError::NotEnrolled {
                student_id: student_id.to_string(),
                class_name: session.class_name,
            });
        }

        let record = AttendanceRecord::for_session(&session, student_id, AttendanceStatus::Present, now);
        match self.ports.records.insert_if_absent(record.clone()).await? {
            InsertOutcome::Inserted => {
                info!(%session_id, student_id, course_id = %session.course_id, "Check-in recorded");
                Ok(record)
            }
            InsertOutcome::Conflict => {
                warn!(%session_id, student_id, "Duplicate check-in rejected");
                Err(AttendanceError::DuplicateCheckIn {
                    student_id: student_id.to_string(),
                    course_id: session.course_id,
                    day: session.day,
                })
            }
        }
    }
}
