//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ApiError, ErrorBody};
use crate::web::middleware::Identity;
use crate::web::state::AppState;
use attendance_core::{
    token, AttendanceRecord, AttendanceStatus, ExcusedEntry, FinalizationResult,
    PresenceSnapshot, SessionSummary, SessionView, StudentEntry,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_handler,
        active_session_for_course_handler,
        active_session_for_owner_handler,
        countdown_handler,
        cancel_session_handler,
        finalize_session_handler,
        check_in_handler,
        presence_handler,
        session_summary_handler,
        owner_summaries_handler,
        student_history_handler,
        excused_entry_handler,
    ),
    components(
        schemas(
            CreateSessionRequest, SessionResponse, ActiveSessionResponse, FinalizationResponse,
            CheckInRequest, RecordResponse, StudentResponse, PresenceResponse,
            SummaryResponse, ExcusedEntryRequest, ErrorBody
        )
    ),
    tags(
        (name = "Attendance API", description = "Time-boxed attendance sessions, check-ins and reconciliation.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub course_id: String,
}

/// A session with its live countdown. `token` is the payload of the QR code.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    session_id: Uuid,
    token: String,
    course_id: String,
    course_name: String,
    class_name: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    day: NaiveDate,
    status: String,
    remaining_secs: i64,
    outcome: Option<FinalizationResponse>,
}

impl From<SessionView> for SessionResponse {
    fn from(view: SessionView) -> Self {
        let session = view.session;
        Self {
            session_id: session.id,
            token: token::encode(session.id),
            course_id: session.course_id,
            course_name: session.course_name,
            class_name: session.class_name,
            created_at: session.created_at,
            expires_at: session.expires_at,
            day: session.day,
            status: session.status.to_string(),
            remaining_secs: view.remaining_secs,
            outcome: session.outcome.map(FinalizationResponse::from),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ActiveSessionResponse {
    session: Option<SessionResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct FinalizationResponse {
    present_count: usize,
    absent_count: usize,
    excused_count: usize,
}

impl From<FinalizationResult> for FinalizationResponse {
    fn from(result: FinalizationResult) -> Self {
        Self {
            present_count: result.present_count,
            absent_count: result.absent_count,
            excused_count: result.excused_count,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    /// The scanned QR payload.
    pub token: String,
}

#[derive(Serialize, ToSchema)]
pub struct RecordResponse {
    id: Uuid,
    student_id: String,
    course_id: String,
    course_name: String,
    session_id: Option<Uuid>,
    recorded_at: DateTime<Utc>,
    day: NaiveDate,
    status: String,
    notes: Option<String>,
}

impl From<AttendanceRecord> for RecordResponse {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            id: record.id,
            student_id: record.user_id,
            course_id: record.course_id,
            course_name: record.course_name,
            session_id: record.session_id,
            recorded_at: record.timestamp,
            day: record.day,
            status: record.status.to_string(),
            notes: record.notes,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StudentResponse {
    student_id: String,
    display_name: String,
    recorded_at: DateTime<Utc>,
}

impl From<StudentEntry> for StudentResponse {
    fn from(entry: StudentEntry) -> Self {
        Self {
            student_id: entry.student_id,
            display_name: entry.display_name,
            recorded_at: entry.recorded_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PresenceResponse {
    session_id: Uuid,
    count: usize,
    present: Vec<StudentResponse>,
}

impl From<PresenceSnapshot> for PresenceResponse {
    fn from(snapshot: PresenceSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            count: snapshot.count(),
            present: snapshot.present.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    session_id: Uuid,
    course_id: String,
    course_name: String,
    held_at: DateTime<Utc>,
    present: Vec<StudentResponse>,
    absent: Vec<StudentResponse>,
}

impl From<SessionSummary> for SummaryResponse {
    fn from(summary: SessionSummary) -> Self {
        Self {
            session_id: summary.session_id,
            course_id: summary.course_id,
            course_name: summary.course_name,
            held_at: summary.held_at,
            present: summary.present.into_iter().map(Into::into).collect(),
            absent: summary.absent.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ExcusedEntryRequest {
    pub student_id: String,
    pub course_id: String,
    /// `excused_leave` or `excused_sick`.
    pub status: String,
    pub notes: Option<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Open a new attendance session for a course owned by the caller.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
        (status = 403, description = "Caller does not own the course", body = ErrorBody),
        (status = 409, description = "An active session exists or attendance was already taken today", body = ErrorBody),
        (status = 422, description = "Course metadata is incomplete", body = ErrorBody)
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(owner_id)): Extension<Identity>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = &app_state.engine;
    let session = engine
        .sessions
        .create_session(payload.course_id.trim(), &owner_id)
        .await?;
    let view = engine.sessions.view_of(session);
    Ok((StatusCode::CREATED, Json(SessionResponse::from(view))))
}

/// The caller's live session for a course, if any.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/active-session",
    responses((status = 200, description = "The live session, or null", body = ActiveSessionResponse)),
    params(
        ("course_id" = String, Path, description = "Course id"),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    )
)]
pub async fn active_session_for_course_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(owner_id)): Extension<Identity>,
    Path(course_id): Path<String>,
) -> Result<Json<ActiveSessionResponse>, ApiError> {
    let view = app_state
        .engine
        .sessions
        .get_active_session(&course_id, &owner_id)
        .await?;
    Ok(Json(ActiveSessionResponse {
        session: view.map(SessionResponse::from),
    }))
}

/// The caller's live session in any of their courses, if any.
#[utoipa::path(
    get,
    path = "/sessions/active",
    responses((status = 200, description = "The live session, or null", body = ActiveSessionResponse)),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn active_session_for_owner_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(owner_id)): Extension<Identity>,
) -> Result<Json<ActiveSessionResponse>, ApiError> {
    let view = app_state
        .engine
        .sessions
        .active_session_for_owner(&owner_id)
        .await?;
    Ok(Json(ActiveSessionResponse {
        session: view.map(SessionResponse::from),
    }))
}

/// Current state and remaining seconds of a session.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}",
    responses(
        (status = 200, description = "Session with countdown", body = SessionResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    ),
    params(("session_id" = Uuid, Path, description = "Session id"))
)]
pub async fn countdown_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let view = app_state.engine.sessions.countdown(session_id).await?;
    Ok(Json(view.into()))
}

/// End a live session without marking anyone absent.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/cancel",
    responses(
        (status = 200, description = "Session cancelled", body = SessionResponse),
        (status = 409, description = "Session is no longer active or already has check-ins", body = ErrorBody),
        (status = 410, description = "Session window already closed", body = ErrorBody)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session id"),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    )
)]
pub async fn cancel_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(owner_id)): Extension<Identity>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let sessions = &app_state.engine.sessions;
    let session = sessions.cancel_session(session_id, &owner_id).await?;
    Ok(Json(sessions.view_of(session).into()))
}

/// Reconcile a closed session against its roster. Repeat calls return the same counts.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/finalize",
    responses(
        (status = 200, description = "Finalization counts", body = FinalizationResponse),
        (status = 409, description = "Session still open or cancelled", body = ErrorBody),
        (status = 503, description = "Store unavailable, retry later", body = ErrorBody)
    ),
    params(("session_id" = Uuid, Path, description = "Session id"))
)]
pub async fn finalize_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<FinalizationResponse>, ApiError> {
    let result = app_state
        .engine
        .sessions
        .finalize_session(session_id)
        .await?;
    Ok(Json(result.into()))
}

/// Submit a scanned code on behalf of the calling student.
#[utoipa::path(
    post,
    path = "/check-ins",
    request_body = CheckInRequest,
    responses(
        (status = 201, description = "Marked present", body = RecordResponse),
        (status = 400, description = "Not a valid attendance code", body = ErrorBody),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Already recorded today", body = ErrorBody),
        (status = 410, description = "Session no longer accepting check-ins", body = ErrorBody),
        (status = 422, description = "Student is not enrolled in the session's class", body = ErrorBody)
    ),
    params(("x-user-id" = String, Header, description = "The student's user id."))
)]
pub async fn check_in_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(student_id)): Extension<Identity>,
    Json(payload): Json<CheckInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = app_state
        .engine
        .check_in
        .submit_scan(&payload.token, &student_id)
        .await?;
    Ok((StatusCode::CREATED, Json(RecordResponse::from(record))))
}

/// Students checked in so far, in check-in order.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/presence",
    responses((status = 200, description = "Present list", body = PresenceResponse)),
    params(("session_id" = Uuid, Path, description = "Session id"))
)]
pub async fn presence_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let snapshot = app_state.engine.presence.snapshot(session_id).await?;
    Ok(Json(snapshot.into()))
}

/// Present and absent lists of a session.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/summary",
    responses((status = 200, description = "Session summary", body = SummaryResponse)),
    params(("session_id" = Uuid, Path, description = "Session id"))
)]
pub async fn session_summary_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = app_state.engine.reports.session_summary(session_id).await?;
    Ok(Json(summary.into()))
}

/// Every session the caller has run, newest first.
#[utoipa::path(
    get,
    path = "/reports/sessions",
    responses((status = 200, description = "Session summaries", body = Vec<SummaryResponse>)),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn owner_summaries_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(owner_id)): Extension<Identity>,
) -> Result<Json<Vec<SummaryResponse>>, ApiError> {
    let summaries = app_state.engine.reports.owner_summaries(&owner_id).await?;
    Ok(Json(summaries.into_iter().map(Into::into).collect()))
}

/// The calling student's attendance records, newest first.
#[utoipa::path(
    get,
    path = "/reports/history",
    responses((status = 200, description = "Attendance history", body = Vec<RecordResponse>)),
    params(("x-user-id" = String, Header, description = "The student's user id."))
)]
pub async fn student_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(student_id)): Extension<Identity>,
) -> Result<Json<Vec<RecordResponse>>, ApiError> {
    let records = app_state
        .engine
        .reports
        .student_history(&student_id)
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Record a leave or sick day for a student of one of the caller's courses.
#[utoipa::path(
    post,
    path = "/excused",
    request_body = ExcusedEntryRequest,
    responses(
        (status = 201, description = "Entry recorded", body = RecordResponse),
        (status = 400, description = "Status is not an excused status", body = ErrorBody),
        (status = 409, description = "Student already has a record today", body = ErrorBody),
        (status = 422, description = "Student is not enrolled in the course's class", body = ErrorBody)
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn excused_entry_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(owner_id)): Extension<Identity>,
    Json(payload): Json<ExcusedEntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = payload
        .status
        .parse::<AttendanceStatus>()
        .map_err(ApiError::BadRequest)?;
    let entry = ExcusedEntry {
        student_id: payload.student_id,
        course_id: payload.course_id,
        status,
        notes: payload.notes,
    };
    let record = app_state
        .engine
        .manual
        .record_excused(&owner_id, entry)
        .await?;
    Ok((StatusCode::CREATED, Json(RecordResponse::from(record))))
}
