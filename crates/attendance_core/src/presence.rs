//! crates/attendance_core/src/presence.rs
//!
//! Read-only projection of who has checked in for a session. It holds no
//! authoritative state: a snapshot rebuilt from the store at any time equals
//! one maintained incrementally from the live feed.

use async_stream::stream;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{AttendanceRecord, AttendanceStatus, PresenceSnapshot, StudentEntry};
use crate::engine::{display_names, name_for, Ports};
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::{FeedEvent, PortError, RecordFilter};

/// A feed of presence snapshots, starting with the current one.
pub type PresenceStream = Pin<Box<dyn Stream<Item = PresenceSnapshot> + Send>>;

#[derive(Clone)]
pub struct PresenceView {
    ports: Ports,
}

impl PresenceView {
    pub fn new(ports: Ports) -> Self {
        Self { ports }
    }

    /// Rebuilds the present list of a session from the store.
    pub async fn snapshot(&self, session_id: Uuid) -> AttendanceResult<PresenceSnapshot> {
        let (snapshot, _) = self.load(session_id).await?;
        Ok(snapshot)
    }

    /// Subscribes to the present list of a session. The first item is the current
    /// snapshot; each later item follows a new check-in.
    pub async fn subscribe(&self, session_id: Uuid) -> AttendanceResult<PresenceStream> {
        // Subscribe before reading so no check-in falls between the two.
        let filter = RecordFilter::session(session_id).with_status(AttendanceStatus::Present);
        let mut feed = self.ports.records.subscribe(filter).await?;
        let (mut snapshot, mut names) = self.load(session_id).await?;
        let view = self.clone();

        Ok(Box::pin(stream! {
            yield snapshot.clone();
            while let Some(event) = feed.next().await {
                match event {
                    FeedEvent::Record(record) => {
                        if apply(&mut snapshot, &record, &names) {
                            yield snapshot.clone();
                        } else {
                            debug!(%session_id, student_id = %record.user_id, "Check-in already in snapshot");
                        }
                    }
                    // Check-ins may have been missed; start over from the store.
                    FeedEvent::Gap => match view.load(session_id).await {
                        Ok((reloaded, reloaded_names)) => {
                            debug!(%session_id, "Presence reloaded after a feed gap");
                            snapshot = reloaded;
                            names = reloaded_names;
                            yield snapshot.clone();
                        }
                        Err(e) => {
                            warn!(%session_id, error = %e, "Presence reload failed");
                            break;
                        }
                    },
                }
            }
            warn!(%session_id, "Presence feed closed");
        }))
    }

    async fn load(
        &self,
        session_id: Uuid,
    ) -> AttendanceResult<(PresenceSnapshot, HashMap<String, String>)> {
        let session = match self.ports.sessions.get_session(session_id).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => return Err(AttendanceError::SessionNotFound(session_id)),
            Err(e) => return Err(e.into()),
        };
        let records = self
            .ports
            .records
            .query(&RecordFilter::session(session_id).with_status(AttendanceStatus::Present))
            .await?;
        let roster = self
            .ports
            .roster
            .students_in_class(&session.class_name)
            .await?;
        let names = display_names(&roster);
        Ok((project(session_id, &records, &names), names))
    }
}

/// Builds a snapshot from scratch.
pub fn project(
    session_id: Uuid,
    records: &[AttendanceRecord],
    names: &HashMap<String, String>,
) -> PresenceSnapshot {
    let mut snapshot = PresenceSnapshot {
        session_id,
        present: Vec::new(),
    };
    for record in records {
        apply(&mut snapshot, record, names);
    }
    snapshot
}

/// Folds one record into a snapshot. Returns whether the snapshot changed.
pub fn apply(
    snapshot: &mut PresenceSnapshot,
    record: &AttendanceRecord,
    names: &HashMap<String, String>,
) -> bool {
    if record.session_id != Some(snapshot.session_id)
        || record.status != AttendanceStatus::Present
        || snapshot.present.iter().any(|s| s.student_id == record.user_id)
    {
        return false;
    }
    let entry = StudentEntry {
        student_id: record.user_id.clone(),
        display_name: name_for(names, &record.user_id),
        recorded_at: record.timestamp,
    };
    let at = snapshot
        .present
        .partition_point(|s| (s.recorded_at, &s.student_id) < (entry.recorded_at, &entry.student_id));
    snapshot.present.insert(at, entry);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttendanceRecord;
    use crate::memory::test_support::Harness;
    use crate::ports::AttendanceStore;
    use crate::token;
    use chrono::Duration;

    #[tokio::test]
    async fn snapshot_uses_roster_names_in_check_in_order() {
        let harness = Harness::new();
        let engine = harness.engine();
        let session = harness.open_session().await;
        let token = token::encode(session.id);

        harness.clock.advance(Duration::seconds(2));
        engine.check_in.submit_scan(&token, "s3").await.unwrap();
        harness.clock.advance(Duration::seconds(2));
        engine.check_in.submit_scan(&token, "s1").await.unwrap();

        let snapshot = engine.presence.snapshot(session.id).await.unwrap();
        let names: Vec<_> = snapshot.present.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["Citra", "Andi"]);
    }

    #[test]
    fn incremental_updates_match_a_full_rebuild() {
        let harness = Harness::new();
        let session = harness.session_fixture();
        let names = HashMap::from([("s1".to_string(), "Andi".to_string())]);
        let t0 = session.created_at;

        let records = vec![
            AttendanceRecord::for_session(&session, "s2", AttendanceStatus::Present, t0 + Duration::seconds(3)),
            AttendanceRecord::for_session(&session, "s1", AttendanceStatus::Present, t0 + Duration::seconds(1)),
            AttendanceRecord::for_session(&session, "s3", AttendanceStatus::Absent, t0 + Duration::seconds(2)),
        ];

        let rebuilt = project(session.id, &records, &names);
        let mut incremental = project(session.id, &[], &names);
        for record in records.iter().rev() {
            apply(&mut incremental, record, &names);
        }
        assert_eq!(rebuilt, incremental);
        assert_eq!(rebuilt.count(), 2);
        assert_eq!(rebuilt.present[0].display_name, "Andi");
        assert_eq!(rebuilt.present[1].display_name, "s2");
        assert!(!apply(&mut incremental, &records[0], &names));
    }

    #[tokio::test]
    async fn subscription_starts_with_current_state_and_follows_check_ins() {
        let harness = Harness::new();
        let engine = harness.engine();
        let session = harness.open_session().await;
        let token = token::encode(session.id);
        engine.check_in.submit_scan(&token, "s1").await.unwrap();

        let mut feed = engine.presence.subscribe(session.id).await.unwrap();
        assert_eq!(feed.next().await.unwrap().count(), 1);

        engine.check_in.submit_scan(&token, "s2").await.unwrap();
        let next = feed.next().await.unwrap();
        assert_eq!(next.count(), 2);
        assert_eq!(next, engine.presence.snapshot(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn a_lagging_subscription_reloads_from_the_store() {
        let harness = Harness::new();
        let engine = harness.engine();
        let session = harness.open_session().await;

        let mut feed = engine.presence.subscribe(session.id).await.unwrap();
        assert_eq!(feed.next().await.unwrap().count(), 0);

        engine
            .check_in
            .submit_scan(&token::encode(session.id), "s1")
            .await
            .unwrap();
        // Enough traffic from another course to overrun the feed buffer.
        let mut other = harness.session_fixture();
        other.course_id = "phys201".to_string();
        let noise: Vec<_> = (0..300)
            .map(|i| {
                AttendanceRecord::for_session(&other, &format!("x{i}"), AttendanceStatus::Absent, other.created_at)
            })
            .collect();
        harness.store.batch_write(noise).await.unwrap();

        let next = tokio::time::timeout(std::time::Duration::from_secs(1), feed.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.count(), 1);
        assert_eq!(next, engine.presence.snapshot(session.id).await.unwrap());
    }
}
