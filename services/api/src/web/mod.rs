pub mod expiry_task;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use expiry_task::spawn_expiry_watcher;
pub use middleware::require_identity;
pub use ws_handler::ws_handler;

use rest::*;
use state::AppState;

/// Every attendance route. All of them require the `x-user-id` header.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", post(create_session_handler))
        .route("/sessions/active", get(active_session_for_owner_handler))
        .route("/sessions/{session_id}", get(countdown_handler))
        .route("/sessions/{session_id}/cancel", post(cancel_session_handler))
        .route("/sessions/{session_id}/finalize", post(finalize_session_handler))
        .route("/sessions/{session_id}/presence", get(presence_handler))
        .route("/sessions/{session_id}/summary", get(session_summary_handler))
        .route("/sessions/{session_id}/live", get(ws_handler))
        .route(
            "/courses/{course_id}/active-session",
            get(active_session_for_course_handler),
        )
        .route("/check-ins", post(check_in_handler))
        .route("/excused", post(excused_entry_handler))
        .route("/reports/sessions", get(owner_summaries_handler))
        .route("/reports/history", get(student_history_handler))
        .layer(axum_middleware::from_fn(require_identity))
        .with_state(app_state)
}
