//! crates/attendance_core/src/engine.rs
//!
//! Wires the engine components around one shared set of ports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::check_in::CheckInProcessor;
use crate::config::EngineConfig;
use crate::domain::{CourseInfo, RosterEntry};
use crate::error::{AttendanceError, AttendanceResult};
use crate::excused::ManualEntryRecorder;
use crate::finalization::FinalizationEngine;
use crate::ports::{
    AttendanceStore, Clock, CourseCatalog, PortError, RosterProvider, SessionRepository,
};
use crate::presence::PresenceView;
use crate::reports::AttendanceReports;
use crate::session_manager::SessionManager;

/// The external collaborators every component reads from or writes to.
#[derive(Clone)]
pub struct Ports {
    pub clock: Arc<dyn Clock>,
    pub roster: Arc<dyn RosterProvider>,
    pub courses: Arc<dyn CourseCatalog>,
    pub records: Arc<dyn AttendanceStore>,
    pub sessions: Arc<dyn SessionRepository>,
}

/// All engine components, built once at startup and shared by every request.
pub struct AttendanceEngine {
    pub sessions: SessionManager,
    pub check_in: CheckInProcessor,
    pub presence: PresenceView,
    pub reports: AttendanceReports,
    pub manual: ManualEntryRecorder,
    config: EngineConfig,
}

impl AttendanceEngine {
    pub fn new(ports: Ports, config: EngineConfig) -> Self {
        let finalizer = Arc::new(FinalizationEngine::new(ports.clone(), config.clone()));
        Self {
            sessions: SessionManager::new(ports.clone(), config.clone(), finalizer),
            check_in: CheckInProcessor::new(ports.clone()),
            presence: PresenceView::new(ports.clone()),
            reports: AttendanceReports::new(ports.clone()),
            manual: ManualEntryRecorder::new(ports, config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Loads a course and checks that every field a session needs is present.
pub(crate) async fn load_course(ports: &Ports, course_id: &str) -> AttendanceResult<CourseInfo> {
    let course = match ports.courses.get_course(course_id).await {
        Ok(course) => course,
        Err(PortError::NotFound(_)) => {
            return Err(AttendanceError::CourseNotFound(course_id.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let missing = |field: &'static str| AttendanceError::IncompleteCourseData {
        course_id: course_id.to_string(),
        missing: field,
    };
    let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    Ok(CourseInfo {
        name: non_blank(course.name).ok_or_else(|| missing("name"))?,
        class_name: non_blank(course.class_name).ok_or_else(|| missing("class name"))?,
        owner_id: non_blank(course.owner_id).ok_or_else(|| missing("owner"))?,
        id: course.id,
    })
}

/// Maps student ids to display names, falling back to the id itself.
pub(crate) fn display_names(roster: &[RosterEntry]) -> HashMap<String, String> {
    roster
        .iter()
        .map(|entry| {
            let name = if entry.display_name.trim().is_empty() {
                entry.student_id.clone()
            } else {
                entry.display_name.clone()
            };
            (entry.student_id.clone(), name)
        })
        .collect()
}

pub(crate) fn name_for(names: &HashMap<String, String>, student_id: &str) -> String {
    names
        .get(student_id)
        .cloned()
        .unwrap_or_else(|| student_id.to_string())
}
