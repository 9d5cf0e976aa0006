//! crates/attendance_core/src/reports.rs
//!
//! Read-side views over finished attendance: per-session summaries, an
//! instructor's overview and a student's history.

use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::domain::{AttendanceRecord, AttendanceStatus, SessionSummary, StudentEntry};
use crate::engine::{display_names, name_for, Ports};
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::{PortError, RecordFilter};

pub struct AttendanceReports {
    ports: Ports,
}

impl AttendanceReports {
    pub fn new(ports: Ports) -> Self {
        Self { ports }
    }

    /// Present and absent lists of one session.
    pub async fn session_summary(&self, session_id: Uuid) -> AttendanceResult<SessionSummary> {
        let session = match self.ports.sessions.get_session(session_id).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => return Err(AttendanceError::SessionNotFound(session_id)),
            Err(e) => return Err(e.into()),
        };
        let records = self
            .ports
            .records
            .query(&RecordFilter::session(session_id))
            .await?;
        let roster = self
            .ports
            .roster
            .students_in_class(&session.class_name)
            .await?;

        let mut summary = summarize(session_id, &records, &display_names(&roster));
        summary.course_id = session.course_id;
        summary.course_name = session.course_name;
        summary.held_at = session.created_at;
        Ok(summary)
    }

    /// Every session-produced record written under `owner_id`, grouped per session,
    /// newest first. Manual entries carry no session and are left out.
    pub async fn owner_summaries(&self, owner_id: &str) -> AttendanceResult<Vec<SessionSummary>> {
        let records = self
            .ports
            .records
            .query(&RecordFilter::owner(owner_id))
            .await?;

        let mut by_session: BTreeMap<Uuid, Vec<AttendanceRecord>> = BTreeMap::new();
        for record in records {
            if let Some(session_id) = record.session_id {
                by_session.entry(session_id).or_default().push(record);
            }
        }

        let mut rosters: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut summaries = Vec::with_capacity(by_session.len());
        for (session_id, records) in by_session {
            let session = match self.ports.sessions.get_session(session_id).await {
                Ok(session) => Some(session),
                Err(PortError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };
            let names = match &session {
                Some(session) => {
                    if !rosters.contains_key(&session.class_name) {
                        let roster = self
                            .ports
                            .roster
                            .students_in_class(&session.class_name)
                            .await?;
                        rosters.insert(session.class_name.clone(), display_names(&roster));
                    }
                    rosters.get(&session.class_name).cloned().unwrap_or_default()
                }
                None => HashMap::new(),
            };

            let mut summary = summarize(session_id, &records, &names);
            if let Some(session) = session {
                summary.held_at = session.created_at;
            }
            summaries.push(summary);
        }

        summaries.sort_by(|a, b| b.held_at.cmp(&a.held_at));
        Ok(summaries)
    }

    /// All records of a student, newest first.
    pub async fn student_history(&self, student_id: &str) -> AttendanceResult<Vec<AttendanceRecord>> {
        let mut records = self
            .ports
            .records
            .query(&RecordFilter::student(student_id))
            .await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

/// Splits a session's records into present and absent lists.
///
/// Course fields and the timestamp come from the first record; callers holding the
/// session itself overwrite them.
fn summarize(
    session_id: Uuid,
    records: &[AttendanceRecord],
    names: &HashMap<String, String>,
) -> SessionSummary {
    let first = records.iter().min_by_key(|r| r.timestamp);
    let mut summary = SessionSummary {
        session_id,
        course_id: first.map(|r| r.course_id.clone()).unwrap_or_default(),
        course_name: first.map(|r| r.course_name.clone()).unwrap_or_default(),
        held_at: first.map(|r| r.timestamp).unwrap_or_default(),
        present: Vec::new(),
        absent: Vec::new(),
    };

    for record in records {
        let entry = StudentEntry {
            student_id: record.user_id.clone(),
            display_name: name_for(names, &record.user_id),
            recorded_at: record.timestamp,
        };
        match record.status {
            AttendanceStatus::Present => summary.present.push(entry),
            AttendanceStatus::Absent => summary.absent.push(entry),
            AttendanceStatus::ExcusedLeave | AttendanceStatus::ExcusedSick => {}
        }
    }
    summary.present.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
    summary.absent.sort_by(|a, b| a.student_id.cmp(&b.student_id));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excused::ExcusedEntry;
    use crate::memory::test_support::{Harness, COURSE};
    use crate::token;
    use chrono::Duration;

    #[tokio::test]
    async fn summary_lists_present_and_absent_students_by_name() {
        let harness = Harness::new();
        let engine = harness.engine();
        let session = harness.open_session().await;
        engine
            .check_in
            .submit_scan(&token::encode(session.id), "s2")
            .await
            .unwrap();
        harness.clock.advance(Duration::seconds(21));
        engine.sessions.tick().await.unwrap();

        let summary = engine.reports.session_summary(session.id).await.unwrap();
        assert_eq!(summary.course_name, "Mathematics");
        assert_eq!(summary.held_at, session.created_at);
        let present: Vec<_> = summary.present.iter().map(|s| s.display_name.as_str()).collect();
        let absent: Vec<_> = summary.absent.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(present, vec!["Budi"]);
        assert_eq!(absent, vec!["Andi", "Citra"]);
    }

    #[tokio::test]
    async fn owner_overview_skips_manual_entries_and_history_includes_them() {
        let harness = Harness::new();
        let engine = harness.engine();
        engine
            .manual
            .record_excused(
                "dosen1",
                ExcusedEntry {
                    student_id: "s3".into(),
                    course_id: COURSE.into(),
                    status: AttendanceStatus::ExcusedLeave,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let session = harness.open_session().await;
        harness.clock.advance(Duration::seconds(1));
        engine
            .check_in
            .submit_scan(&token::encode(session.id), "s3")
            .await
            .unwrap_err();
        harness.clock.advance(Duration::seconds(30));
        engine.sessions.tick().await.unwrap();

        let overview = engine.reports.owner_summaries("dosen1").await.unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].session_id, session.id);
        assert_eq!(overview[0].absent.len(), 2);

        let history = engine.reports.student_history("s3").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, AttendanceStatus::ExcusedLeave);
    }
}
