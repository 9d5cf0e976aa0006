//! crates/attendance_core/src/excused.rs
//!
//! Manual leave and sick entries made by an instructor outside any live session.

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{AttendanceRecord, AttendanceStatus};
use crate::engine::{load_course, Ports};
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::InsertOutcome;

/// An excused absence as submitted by the course owner.
#[derive(Debug, Clone)]
pub struct ExcusedEntry {
    pub student_id: String,
    pub course_id: String,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
}

pub struct ManualEntryRecorder {
    ports: Ports,
    config: EngineConfig,
}

impl ManualEntryRecorder {
    pub fn new(ports: Ports, config: EngineConfig) -> Self {
        Self { ports, config }
    }

    /// Writes an excused record for today, unless the student already has any
    /// record for the course today.
    pub async fn record_excused(
        &self,
        owner_id: &str,
        entry: ExcusedEntry,
    ) -> AttendanceResult<AttendanceRecord> {
        if !entry.status.is_excused() {
            return Err(AttendanceError::NotExcusable(entry.status.to_string()));
        }

        let course = load_course(&self.ports, &entry.course_id).await?;
        if course.owner_id != owner_id {
            return Err(AttendanceError::NotCourseOwner {
                course_id: course.id,
                user_id: owner_id.to_string(),
            });
        }

        let enrolled = self
            .ports
            .roster
            .students_in_class(&course.class_name)
            .await?
            .iter()
            .any(|s| s.student_id == entry.student_id);
        if !enrolled {
            return Err(AttendanceError::NotEnrolled {
                student_id: entry.student_id,
                class_name: course.class_name,
            });
        }

        let now = self.ports.clock.now();
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            user_id: entry.student_id,
            course_id: course.id,
            course_name: course.name,
            owner_id: course.owner_id,
            session_id: None,
            timestamp: now,
            day: self.config.day_of(now),
            status: entry.status,
            notes: entry
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };

        match self.ports.records.insert_if_absent(record.clone()).await? {
            InsertOutcome::Inserted => {
                info!(
                    student_id = %record.user_id,
                    course_id = %record.course_id,
                    status = %record.status,
                    "Excused attendance recorded"
                );
                Ok(record)
            }
            InsertOutcome::Conflict => {
                warn!(student_id = %record.user_id, course_id = %record.course_id, "Student already has a record today");
                Err(AttendanceError::DuplicateCheckIn {
                    student_id: record.user_id,
                    course_id: record.course_id,
                    day: record.day,
                })
            }
        }
    }
}
