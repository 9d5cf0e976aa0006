//! crates/attendance_core/src/finalization.rs
//!
//! Reconciles a class roster against the day's attendance records and writes an
//! absence record for every enrolled student who has none.

use std::collections::{BTreeMap, HashSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{
    AttendanceRecord, AttendanceStatus, FinalizationResult, RosterEntry, Session, SessionStatus,
};
use crate::engine::Ports;
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::{PortError, RecordFilter};

/// What a single reconciliation pass intends to write.
#[derive(Debug)]
struct Plan {
    absentees: Vec<AttendanceRecord>,
    present_count: usize,
    already_absent: usize,
    excused_count: usize,
}

pub struct FinalizationEngine {
    ports: Ports,
    config: EngineConfig,
}

impl FinalizationEngine {
    pub fn new(ports: Ports, config: EngineConfig) -> Self {
        Self { ports, config }
    }

    /// Writes the absence records for an expired session.
    ///
    /// Safe to call again for the same session: absentees are re-derived from a
    /// fresh read on every attempt, and the store refuses a batch whose keys
    /// already exist, so no student is ever recorded twice.
    pub async fn finalize(&self, session_id: Uuid) -> AttendanceResult<FinalizationResult> {
        let session = match self.ports.sessions.get_session(session_id).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => {
                error!(%session_id, "Finalization requested for a session that does not exist");
                return Err(AttendanceError::FatalCoordination(format!(
                    "finalize called for missing session {}",
                    session_id
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if session.is_active() || session.status == SessionStatus::Cancelled {
            error!(%session_id, status = %session.status, "Finalization requested out of order");
            return Err(AttendanceError::FatalCoordination(format!(
                "session {} is {}, not expired",
                session_id, session.status
            )));
        }

        let roster = self
            .ports
            .roster
            .students_in_class(&session.class_name)
            .await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let plan = self.plan(&session, &roster).await?;
            let written = plan.absentees.len();
            if written == 0 {
                return Ok(plan.result(0));
            }

            let result = plan.result(written);
            match self.ports.records.batch_write(plan.absentees).await {
                Ok(()) => {
                    info!(
                        %session_id,
                        course_id = %session.course_id,
                        present = result.present_count,
                        absent = written,
                        "Session finalized"
                    );
                    return Ok(result);
                }
                Err(PortError::Conflict(reason)) if attempt < self.config.finalize_max_attempts => {
                    warn!(%session_id, attempt, %reason, "Absence batch conflicted, re-deriving");
                }
                Err(PortError::Unavailable(reason))
                    if attempt < self.config.finalize_max_attempts =>
                {
                    warn!(%session_id, attempt, %reason, "Store unavailable, retrying absence batch");
                    tokio::time::sleep(self.config.finalize_retry_delay).await;
                }
                Err(e) => {
                    error!(%session_id, attempt, error = %e, "Absence batch failed");
                    return Err(e.into());
                }
            }
        }
    }

    async fn plan(&self, session: &Session, roster: &[RosterEntry]) -> AttendanceResult<Plan> {
        let day_records = self
            .ports
            .records
            .query(&RecordFilter::course_day(&session.course_id, session.day))
            .await?;

        let enrolled: BTreeMap<&str, &RosterEntry> = roster
            .iter()
            .map(|entry| (entry.student_id.as_str(), entry))
            .collect();

        // Counts cover the roster only, so present and absent always partition it.
        let in_session = |r: &&AttendanceRecord| {
            r.session_id == Some(session.id) && enrolled.contains_key(r.user_id.as_str())
        };
        let present_count = day_records
            .iter()
            .filter(in_session)
            .filter(|r| r.status == AttendanceStatus::Present)
            .count();
        let already_absent = day_records
            .iter()
            .filter(in_session)
            .filter(|r| r.status == AttendanceStatus::Absent)
            .count();

        // Anyone holding a record for the day is left alone, not just those present here.
        let recorded: HashSet<&str> = day_records.iter().map(|r| r.user_id.as_str()).collect();

        let now = self.ports.clock.now();
        let absentees = enrolled
            .keys()
            .filter(|id| !recorded.contains(*id))
            .map(|id| AttendanceRecord::for_session(session, id, AttendanceStatus::Absent, now))
            .collect();

        let excused_count = day_records
            .iter()
            .filter(|r| r.session_id != Some(session.id))
            .filter(|r| enrolled.contains_key(r.user_id.as_str()))
            .count();

        Ok(Plan {
            absentees,
            present_count,
            already_absent,
            excused_count,
        })
    }
}

impl Plan {
    fn result(&self, written: usize) -> FinalizationResult {
        FinalizationResult {
            present_count: self.present_count,
            absent_count: self.already_absent + written,
            excused_count: self.excused_count,
        }
    }
}
