//! crates/attendance_core/src/session_manager.rs
//!
//! Owns the lifecycle of attendance sessions: creation, countdown lookups,
//! expiry detection and the single hand-off to finalization.
//!
//! No session state is cached in the process. Every lookup is a query against
//! the session repository, and every state change goes through its atomic
//! `transition`, so any number of observers may detect the same expiry while
//! exactly one of them finalizes.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{AttendanceStatus, FinalizationResult, Session, SessionStatus, SessionView};
use crate::engine::{load_course, Ports};
use crate::error::{AttendanceError, AttendanceResult};
use crate::finalization::FinalizationEngine;
use crate::ports::{PortError, RecordFilter};

/// What one sweep over the session repository achieved.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub finalized: Vec<(Uuid, FinalizationResult)>,
    /// Sessions whose finalization failed; they stay `Expired` and are retried later.
    pub failed: Vec<Uuid>,
}

pub struct SessionManager {
    ports: Ports,
    config: EngineConfig,
    finalizer: Arc<FinalizationEngine>,
}

impl SessionManager {
    pub fn new(ports: Ports, config: EngineConfig, finalizer: Arc<FinalizationEngine>) -> Self {
        Self {
            ports,
            config,
            finalizer,
        }
    }

    /// Opens a new attendance window for a course.
    pub async fn create_session(
        &self,
        course_id: &str,
        owner_id: &str,
    ) -> AttendanceResult<Session> {
        let course = load_course(&self.ports, course_id).await?;
        if course.owner_id != owner_id {
            return Err(AttendanceError::NotCourseOwner {
                course_id: course_id.to_string(),
                user_id: owner_id.to_string(),
            });
        }

        let now = self.ports.clock.now();
        if let Some(existing) = self.ports.sessions.find_active_for_course(course_id).await? {
            if !existing.is_due(now) {
                warn!(course_id, session_id = %existing.id, "Refusing a second active session");
                return Err(AttendanceError::DuplicateSession {
                    course_id: course_id.to_string(),
                });
            }
            // Nobody observed the old window closing; settle it before going on.
            self.expire_if_due(&existing).await?;
        }

        let day = self.config.day_of(now);
        if self.attendance_taken(course_id, day).await? {
            return Err(AttendanceError::AlreadyRecorded {
                course_id: course_id.to_string(),
                day,
            });
        }

        let session = Session {
            id: Uuid::new_v4(),
            course_id: course.id,
            course_name: course.name,
            class_name: course.class_name,
            owner_id: course.owner_id,
            created_at: now,
            expires_at: now + self.config.session_duration,
            day,
            status: SessionStatus::Active,
            outcome: None,
        };

        match self.ports.sessions.insert_active(session.clone()).await {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    course_id,
                    expires_at = %session.expires_at,
                    "Attendance session created"
                );
                Ok(session)
            }
            Err(PortError::Conflict(_)) => {
                warn!(course_id, "Lost the race to open a session");
                Err(AttendanceError::DuplicateSession {
                    course_id: course_id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Finds the live session of a course so an instructor view can resume it.
    ///
    /// A session whose window already closed is settled on the spot and not returned.
    pub async fn get_active_session(
        &self,
        course_id: &str,
        owner_id: &str,
    ) -> AttendanceResult<Option<SessionView>> {
        let Some(session) = self.ports.sessions.find_active_for_course(course_id).await? else {
            return Ok(None);
        };
        if session.owner_id != owner_id {
            return Ok(None);
        }
        self.live_view(session).await
    }

    /// The live session of any course owned by `owner_id`, if there is one.
    pub async fn active_session_for_owner(
        &self,
        owner_id: &str,
    ) -> AttendanceResult<Option<SessionView>> {
        for session in self.ports.sessions.find_active_for_owner(owner_id).await? {
            if let Some(view) = self.live_view(session).await? {
                return Ok(Some(view));
            }
        }
        Ok(None)
    }

    /// Current countdown of a session, recomputed from its stored expiry.
    pub async fn countdown(&self, session_id: Uuid) -> AttendanceResult<SessionView> {
        let session = self.load(session_id).await?;
        let now = self.ports.clock.now();
        if session.is_active() && session.is_due(now) {
            self.expire_if_due(&session).await?;
            return Ok(SessionView::at(self.load(session_id).await?, now));
        }
        Ok(SessionView::at(session, now))
    }

    /// Pairs a session with its countdown as of now.
    pub fn view_of(&self, session: Session) -> SessionView {
        SessionView::at(session, self.ports.clock.now())
    }

    /// Claims a due session and finalizes it. Returns `None` when the session is
    /// not due yet or another observer already claimed it.
    pub async fn expire_if_due(
        &self,
        session: &Session,
    ) -> AttendanceResult<Option<FinalizationResult>> {
        let now = self.ports.clock.now();
        if !session.is_active() || !session.is_due(now) {
            return Ok(None);
        }
        let claimed = self
            .ports
            .sessions
            .transition(session.id, SessionStatus::Active, SessionStatus::Expired)
            .await?;
        if !claimed {
            debug!(session_id = %session.id, "Expiry already claimed by another observer");
            return Ok(None);
        }
        info!(session_id = %session.id, course_id = %session.course_id, "Session expired");
        self.complete(session.id).await.map(Some)
    }

    /// Finalizes a session whose window has closed, or returns the stored outcome
    /// if that already happened.
    pub async fn finalize_session(&self, session_id: Uuid) -> AttendanceResult<FinalizationResult> {
        let session = self.load(session_id).await?;
        match session.status {
            SessionStatus::Finalized => Ok(session.outcome.unwrap_or_default()),
            SessionStatus::Expired => self.complete(session_id).await,
            SessionStatus::Cancelled => Err(AttendanceError::SessionNotActive(session_id)),
            SessionStatus::Active => {
                if !session.is_due(self.ports.clock.now()) {
                    return Err(AttendanceError::SessionStillOpen(session_id));
                }
                if let Some(result) = self.expire_if_due(&session).await? {
                    return Ok(result);
                }
                // Someone else claimed it between our read and our transition.
                let session = self.load(session_id).await?;
                match session.outcome {
                    Some(result) => Ok(result),
                    None => self.complete(session_id).await,
                }
            }
        }
    }

    /// Ends an active session without finalizing it.
    pub async fn cancel_session(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> AttendanceResult<Session> {
        let mut session = self.load(session_id).await?;
        if session.owner_id != owner_id {
            return Err(AttendanceError::NotCourseOwner {
                course_id: session.course_id,
                user_id: owner_id.to_string(),
            });
        }
        if session.is_active() && session.is_due(self.ports.clock.now()) {
            return Err(AttendanceError::SessionExpired(session_id));
        }
        let checked_in = self
            .ports
            .records
            .query(&RecordFilter::session(session_id).with_status(AttendanceStatus::Present))
            .await?;
        if !checked_in.is_empty() {
            warn!(%session_id, present = checked_in.len(), "Refusing to cancel a session with check-ins");
            return Err(AttendanceError::CheckInsRecorded(session_id));
        }
        let cancelled = self
            .ports
            .sessions
            .transition(session_id, SessionStatus::Active, SessionStatus::Cancelled)
            .await?;
        if !cancelled {
            return Err(AttendanceError::SessionNotActive(session_id));
        }
        info!(%session_id, course_id = %session.course_id, "Session cancelled");
        session.status = SessionStatus::Cancelled;
        Ok(session)
    }

    /// One sweep of expiry detection: claims and finalizes every due session, then
    /// retries sessions left unfinalized by an earlier failure.
    pub async fn tick(&self) -> AttendanceResult<TickReport> {
        let now = self.ports.clock.now();
        let mut report = TickReport::default();
        let mut attempted = HashSet::new();

        let due = self
            .ports
            .sessions
            .list_by_status(SessionStatus::Active)
            .await?
            .into_iter()
            .filter(|s| s.is_due(now));
        for session in due {
            attempted.insert(session.id);
            match self.expire_if_due(&session).await {
                Ok(Some(result)) => report.finalized.push((session.id, result)),
                Ok(None) => {}
                Err(e) => {
                    error!(session_id = %session.id, error = %e, "Finalization failed");
                    report.failed.push(session.id);
                }
            }
        }

        let stranded = self
            .ports
            .sessions
            .list_by_status(SessionStatus::Expired)
            .await?
            .into_iter()
            .filter(|s| !attempted.contains(&s.id));
        for session in stranded {
            match self.complete(session.id).await {
                Ok(result) => report.finalized.push((session.id, result)),
                Err(e) => {
                    error!(session_id = %session.id, error = %e, "Retrying finalization failed");
                    report.failed.push(session.id);
                }
            }
        }

        Ok(report)
    }

    /// Whether a session other than a cancelled one already recorded attendance
    /// for the course on `day`. Records left by a cancelled session do not count;
    /// the next session's finalization leaves those students alone.
    async fn attendance_taken(&self, course_id: &str, day: NaiveDate) -> AttendanceResult<bool> {
        let sessions: BTreeSet<Uuid> = self
            .ports
            .records
            .query(&RecordFilter::course_day(course_id, day))
            .await?
            .iter()
            .filter_map(|record| record.session_id)
            .collect();
        for session_id in sessions {
            match self.ports.sessions.get_session(session_id).await {
                Ok(session) if session.status == SessionStatus::Cancelled => continue,
                Ok(_) | Err(PortError::NotFound(_)) => return Ok(true),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    async fn complete(&self, session_id: Uuid) -> AttendanceResult<FinalizationResult> {
        let result = self.finalizer.finalize(session_id).await?;
        if !self.ports.sessions.mark_finalized(session_id, result).await? {
            debug!(%session_id, "Session was already marked finalized");
        }
        Ok(result)
    }

    async fn live_view(&self, session: Session) -> AttendanceResult<Option<SessionView>> {
        let now = self.ports.clock.now();
        if session.is_due(now) {
            self.expire_if_due(&session).await?;
            return Ok(None);
        }
        Ok(Some(SessionView::at(session, now)))
    }

    async fn load(&self, session_id: Uuid) -> AttendanceResult<Session> {
        match self.ports.sessions.get_session(session_id).await {
            Ok(session) => Ok(session),
            Err(PortError::NotFound(_)) => Err(AttendanceError::SessionNotFound(session_id)),
            Err(e) => Err(e.into()),
        }
    }
}
