#![allow(dead_code)]

use attendance_core::memory::{
    InMemoryAttendanceStore, InMemoryDirectory, InMemorySessionRepository, ManualClock,
};
use attendance_core::{AttendanceEngine, EngineConfig, Ports};
use chrono::{DateTime, Duration, Offset, TimeZone, Utc};
use std::sync::Arc;

pub const COURSE: &str = "Math101";
pub const CLASS: &str = "TI-23-KA";
pub const OWNER: &str = "dosen1";

/// An engine over in-memory adapters with a clock the test moves by hand.
pub struct World {
    pub clock: Arc<ManualClock>,
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<InMemoryAttendanceStore>,
    pub sessions: Arc<InMemorySessionRepository>,
    pub engine: Arc<AttendanceEngine>,
    pub t0: DateTime<Utc>,
}

impl World {
    /// Course Math101 with students S1, S2 and S3, and a 20 second window.
    pub fn new() -> Self {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_course(COURSE, Some("Mathematics"), Some(CLASS), Some(OWNER));
        for (id, name) in [("S1", "Andi"), ("S2", "Budi"), ("S3", "Citra")] {
            directory.enroll(CLASS, id, name);
        }
        let store = Arc::new(InMemoryAttendanceStore::new());
        let sessions = Arc::new(InMemorySessionRepository::new());

        let ports = Ports {
            clock: clock.clone(),
            roster: directory.clone(),
            courses: directory.clone(),
            records: store.clone(),
            sessions: sessions.clone(),
        };
        let config =
            EngineConfig::new(Duration::seconds(20), Utc.fix(), 3, std::time::Duration::ZERO)
                .unwrap();

        Self {
            clock,
            directory,
            store,
            sessions,
            engine: Arc::new(AttendanceEngine::new(ports, config)),
            t0,
        }
    }

    /// Moves the clock to `secs` seconds after the start of the test.
    pub fn at(&self, secs: i64) {
        self.clock.set(self.t0 + Duration::seconds(secs));
    }
}
