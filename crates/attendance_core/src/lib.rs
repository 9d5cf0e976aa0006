pub mod check_in;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod excused;
pub mod finalization;
pub mod memory;
pub mod ports;
pub mod presence;
pub mod reports;
pub mod session_manager;
pub mod token;

pub use config::{EngineConfig, EngineConfigError};
pub use domain::{
    AttendanceKey, AttendanceRecord, AttendanceStatus, Course, CourseInfo, FinalizationResult,
    PresenceSnapshot, RosterEntry, Session, SessionStatus, SessionSummary, SessionView,
    StudentEntry,
};
pub use engine::{AttendanceEngine, Ports};
pub use error::{AttendanceError, AttendanceResult, ErrorKind};
pub use excused::ExcusedEntry;
pub use ports::{
    AttendanceStore, Clock, CourseCatalog, FeedEvent, InsertOutcome, PortError, PortResult, RecordFilter,
    RecordStream, RosterProvider, SessionRepository, SystemClock,
};
pub use presence::PresenceStream;
pub use session_manager::TickReport;
