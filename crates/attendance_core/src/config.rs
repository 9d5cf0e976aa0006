//! crates/attendance_core/src/config.rs
//!
//! Tunables of the attendance engine.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

/// Engine settings, built by the hosting service from its own configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed length of every attendance window.
    pub session_duration: Duration,
    /// Offset used to decide which calendar day an instant belongs to.
    pub day_offset: FixedOffset,
    /// How many times a finalization batch is attempted before giving up.
    pub finalize_max_attempts: u32,
    /// Pause between attempts after a transient store failure.
    pub finalize_retry_delay: std::time::Duration,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineConfigError {
    #[error("Session duration must be positive, got {0} seconds")]
    NonPositiveDuration(i64),
    #[error("Finalization needs at least one attempt")]
    NoAttempts,
}

impl EngineConfig {
    pub fn new(
        session_duration: Duration,
        day_offset: FixedOffset,
        finalize_max_attempts: u32,
        finalize_retry_delay: std::time::Duration,
    ) -> Result<Self, EngineConfigError> {
        if session_duration <= Duration::zero() {
            return Err(EngineConfigError::NonPositiveDuration(
                session_duration.num_seconds(),
            ));
        }
        if finalize_max_attempts == 0 {
            return Err(EngineConfigError::NoAttempts);
        }
        Ok(Self {
            session_duration,
            day_offset,
            finalize_max_attempts,
            finalize_retry_delay,
        })
    }

    /// The calendar day `instant` falls on under the configured offset.
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.day_offset).date_naive()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_duration: Duration::minutes(15),
            day_offset: Utc.fix(),
            finalize_max_attempts: 3,
            finalize_retry_delay: std::time::Duration::from_millis(250),
        }
    }
}
