use api_lib::config::Config;
use api_lib::web::{router, state::AppState};
use attendance_core::memory::{
    InMemoryAttendanceStore, InMemoryDirectory, InMemorySessionRepository,
};
use attendance_core::{AttendanceEngine, Ports, SystemClock};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let config = Config::from_lookup(|key| match key {
        "STORAGE_BACKEND" => Some("memory".to_string()),
        _ => None,
    })
    .unwrap();

    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_course("math101", Some("Mathematics"), Some("TI-23-KA"), Some("dosen1"));
    directory.enroll("TI-23-KA", "s1", "Andi");
    directory.enroll("TI-23-KA", "s2", "Budi");

    let ports = Ports {
        clock: Arc::new(SystemClock),
        roster: directory.clone(),
        courses: directory,
        records: Arc::new(InMemoryAttendanceStore::new()),
        sessions: Arc::new(InMemorySessionRepository::new()),
    };
    let engine = Arc::new(AttendanceEngine::new(ports, config.engine_config().unwrap()));
    router(Arc::new(AppState { engine }))
}

async fn call(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn requests_without_identity_are_rejected() {
    let app = app();
    let (status, body) = call(&app, "POST", "/sessions", None, Some(json!({ "course_id": "math101" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn session_check_in_and_presence_flow() {
    let app = app();

    let (status, session) = call(
        &app,
        "POST",
        "/sessions",
        Some("dosen1"),
        Some(json!({ "course_id": "math101" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["status"], "active");
    let session_id = session["session_id"].as_str().unwrap().to_string();
    let token = session["token"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "POST", "/sessions", Some("dosen1"), Some(json!({ "course_id": "math101" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "duplicate_session");

    let (status, record) = call(&app, "POST", "/check-ins", Some("s1"), Some(json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["status"], "present");

    let (status, body) = call(&app, "POST", "/check-ins", Some("s1"), Some(json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "duplicate_check_in");

    let (status, body) = call(&app, "POST", "/check-ins", Some("s2"), Some(json!({ "token": "garbage" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "malformed_token");

    let (status, presence) = call(&app, "GET", &format!("/sessions/{}/presence", session_id), Some("dosen1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(presence["count"], 1);
    assert_eq!(presence["present"][0]["display_name"], "Andi");

    let (status, active) = call(&app, "GET", "/courses/math101/active-session", Some("dosen1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["session"]["session_id"], session_id.as_str());

    let (status, body) = call(&app, "POST", "/check-ins", Some("s7"), Some(json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "not_enrolled");

    let (status, body) = call(&app, "POST", &format!("/sessions/{}/cancel", session_id), Some("dosen1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "check_ins_recorded");

    let (status, body) = call(&app, "POST", &format!("/sessions/{}/finalize", session_id), Some("dosen1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "session_still_open");
}

#[tokio::test]
async fn excused_entries_are_validated_and_show_in_history() {
    let app = app();

    let (status, body) = call(
        &app,
        "POST",
        "/excused",
        Some("dosen1"),
        Some(json!({ "student_id": "s2", "course_id": "math101", "status": "present" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "not_excusable");

    let (status, record) = call(
        &app,
        "POST",
        "/excused",
        Some("dosen1"),
        Some(json!({ "student_id": "s2", "course_id": "math101", "status": "excused_sick", "notes": "flu" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["notes"], "flu");

    let (status, history) = call(&app, "GET", "/reports/history", Some("s2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "excused_sick");
}

#[tokio::test]
async fn unknown_sessions_are_not_found() {
    let app = app();
    let (status, body) = call(
        &app,
        "GET",
        "/sessions/00000000-0000-0000-0000-000000000000",
        Some("dosen1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "session_not_found");
}
