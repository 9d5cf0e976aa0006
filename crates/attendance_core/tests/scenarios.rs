mod common;

use attendance_core::token;
use attendance_core::{
    AttendanceError, AttendanceStatus, ExcusedEntry, FinalizationResult, SessionStatus,
};
use common::{World, COURSE, OWNER};

#[tokio::test]
async fn single_scan_then_expiry_partitions_the_roster() {
    let world = World::new();
    let engine = &world.engine;

    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    world.at(5);
    engine
        .check_in
        .submit_scan(&token::encode(session.id), "S1")
        .await
        .unwrap();

    world.at(21);
    let report = engine.sessions.tick().await.unwrap();
    assert_eq!(
        report.finalized,
        vec![(
            session.id,
            FinalizationResult {
                present_count: 1,
                absent_count: 2,
                excused_count: 0,
            }
        )]
    );

    let summary = engine.reports.session_summary(session.id).await.unwrap();
    let present: Vec<_> = summary.present.iter().map(|s| s.student_id.as_str()).collect();
    let absent: Vec<_> = summary.absent.iter().map(|s| s.student_id.as_str()).collect();
    assert_eq!(present, vec!["S1"]);
    assert_eq!(absent, vec!["S2", "S3"]);
    assert_eq!(world.store.records().len(), 3);
    assert_eq!(
        world.sessions.get(session.id).map(|s| s.status),
        Some(SessionStatus::Finalized)
    );
}

#[tokio::test]
async fn two_devices_opening_the_same_course_get_one_session() {
    let world = World::new();
    let engine = &world.engine;

    let (first, second) = futures::join!(
        engine.sessions.create_session(COURSE, OWNER),
        engine.sessions.create_session(COURSE, OWNER)
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AttendanceError::DuplicateSession { .. }))));
}

#[tokio::test]
async fn rescanning_the_same_code_is_a_duplicate() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    let code = token::encode(session.id);

    world.at(3);
    engine.check_in.submit_scan(&code, "S1").await.unwrap();
    world.at(4);
    let err = engine.check_in.submit_scan(&code, "S1").await.unwrap_err();
    assert!(matches!(err, AttendanceError::DuplicateCheckIn { .. }));

    let records: Vec<_> = world
        .store
        .records()
        .into_iter()
        .filter(|r| r.user_id == "S1" && r.course_id == COURSE)
        .collect();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn excused_students_are_not_marked_absent_later_that_day() {
    let world = World::new();
    let engine = &world.engine;

    engine
        .manual
        .record_excused(
            OWNER,
            ExcusedEntry {
                student_id: "S2".into(),
                course_id: COURSE.into(),
                status: AttendanceStatus::ExcusedSick,
                notes: Some("flu".into()),
            },
        )
        .await
        .unwrap();

    world.at(60);
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    world.at(90);
    let result = engine.sessions.finalize_session(session.id).await.unwrap();
    assert_eq!(result.absent_count, 2);
    assert_eq!(result.excused_count, 1);

    let s2: Vec<_> = world
        .store
        .records()
        .into_iter()
        .filter(|r| r.user_id == "S2")
        .collect();
    assert_eq!(s2.len(), 1);
    assert_eq!(s2[0].status, AttendanceStatus::ExcusedSick);
}

#[tokio::test]
async fn a_second_session_the_same_day_is_refused_after_finalization() {
    let world = World::new();
    let engine = &world.engine;
    let session = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    world.at(30);
    engine.sessions.finalize_session(session.id).await.unwrap();

    world.at(60);
    assert!(matches!(
        engine.sessions.create_session(COURSE, OWNER).await,
        Err(AttendanceError::AlreadyRecorded { .. })
    ));
}

#[tokio::test]
async fn an_unobserved_expired_session_is_settled_before_a_new_one_opens() {
    let world = World::new();
    let engine = &world.engine;
    let stale = engine.sessions.create_session(COURSE, OWNER).await.unwrap();

    // Next day: the old window was never observed closing.
    world.at(24 * 60 * 60);
    let fresh = engine.sessions.create_session(COURSE, OWNER).await.unwrap();
    assert_ne!(fresh.id, stale.id);
    assert_ne!(fresh.day, stale.day);
    assert_eq!(
        world.sessions.get(stale.id).map(|s| s.status),
        Some(SessionStatus::Finalized)
    );
    let absences = world
        .store
        .records()
        .into_iter()
        .filter(|r| r.session_id == Some(stale.id) && r.day == stale.day)
        .count();
    assert_eq!(absences, 3);
}
