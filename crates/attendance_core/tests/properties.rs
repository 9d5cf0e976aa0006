mod common;

use attendance_core::token;
use attendance_core::{AttendanceError, AttendanceStatus, SessionStatus};
use common::{World, COURSE, OWNER};
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashSet;

#[tokio::test]
async fn at_most_one_active_session_per_course() {
    let world = World::new();
    let engine = &world.engine;

    let results = join_all((0..8).map(|_| engine.sessions.create_session(COURSE, OWNER))).await;
    let created = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(AttendanceError::DuplicateSession { .. })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(duplicates, 7);
}

#[tokio::test]
async fn concurrent_scans_by_one_student_write_one_record() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    let code = token::encode(session.id);

    let results = join_all((0..10).map(|_| engine.check_in.submit_scan(&code, "S1"))).await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AttendanceError::DuplicateCheckIn { .. })))
            .count(),
        9
    );
    assert_eq!(world.store.records().len(), 1);
}

#[tokio::test]
async fn finalization_covers_exactly_the_roster() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    let code = token::encode(session.id);
    engine.check_in.submit_scan(&code, "S1").await.unwrap();
    engine.check_in.submit_scan(&code, "S3").await.unwrap();

    world.at(21);
    let result = engine.sessions.finalize_session(session.id).await.unwrap();
    assert_eq!(result.present_count + result.absent_count, 3);

    let records = world.store.records();
    let students: HashSet<_> = records.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(students, HashSet::from(["S1", "S2", "S3"]));
    let absent: Vec<_> = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Absent)
        .map(|r| r.user_id.as_str())
        .collect();
    assert_eq!(absent, vec!["S2"]);
}

#[tokio::test]
async fn finalizing_twice_changes_nothing() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();

    world.at(21);
    let first = engine.sessions.finalize_session(session.id).await.unwrap();
    let after_first = world.store.records();
    let second = engine.sessions.finalize_session(session.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(world.store.records(), after_first);
    assert_eq!(after_first.len(), 3);
}

#[tokio::test]
async fn many_observers_finalize_exactly_once() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();

    world.at(21);
    let reports = join_all((0..6).map(|_| engine.sessions.tick())).await;
    let finalized: usize = reports
        .into_iter()
        .map(|r| r.unwrap().finalized.len())
        .sum();
    assert_eq!(finalized, 1);
    assert_eq!(world.store.records().len(), 3);
    assert_eq!(
        world.sessions.get(session.id).map(|s| s.status),
        Some(SessionStatus::Finalized)
    );
}

#[tokio::test]
async fn late_scans_fail_even_before_any_observer_runs() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();

    world.at(20);
    engine
        .check_in
        .submit_scan(&token::encode(session.id), "S1")
        .await
        .unwrap();

    world.at(21);
    assert_eq!(
        world.sessions.get(session.id).map(|s| s.status),
        Some(SessionStatus::Active)
    );
    let err = engine
        .check_in
        .submit_scan(&token::encode(session.id), "S2")
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::SessionExpired(_)));
    assert_eq!(world.store.records().len(), 1);
}

#[tokio::test]
async fn live_presence_matches_a_rebuilt_snapshot() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    let code = token::encode(session.id);

    let mut live = engine.presence.subscribe(session.id).await.unwrap();
    assert_eq!(live.next().await.unwrap().count(), 0);

    for (secs, student) in [(2, "S2"), (4, "S1")] {
        world.at(secs);
        engine.check_in.submit_scan(&code, student).await.unwrap();
    }
    live.next().await.unwrap();
    let latest = live.next().await.unwrap();

    let rebuilt = engine.presence.snapshot(session.id).await.unwrap();
    assert_eq!(latest, rebuilt);
    let names: Vec<_> = rebuilt.present.iter().map(|s| s.display_name.as_str()).collect();
    assert_eq!(names, vec!["Budi", "Andi"]);
}
