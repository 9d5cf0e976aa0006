//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the storage ports from the `core` crate. It handles all interactions with
//! the PostgreSQL database using `sqlx`.
//!
//! Atomicity lives in the schema: a partial unique index allows one active session
//! per course, a unique constraint allows one record per student, course and day,
//! and status changes are conditional `UPDATE`s.

use async_stream::stream;
use async_trait::async_trait;
use attendance_core::domain::{
    AttendanceRecord, AttendanceStatus, Course, FinalizationResult, RosterEntry, Session,
    SessionStatus,
};
use attendance_core::ports::{
    AttendanceStore, CourseCatalog, FeedEvent, InsertOutcome, PortError, PortResult,
    RecordFilter, RecordStream, RosterProvider, SessionRepository,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const RECORD_CHANNEL: &str = "attendance_records";
const FEED_CAPACITY: usize = 1024;
const UNIQUE_VIOLATION: &str = "23505";

const RECORD_COLUMNS: &str = "id, user_id, course_id, course_name, owner_id, session_id, \
     recorded_at, day, status, notes";
const SESSION_COLUMNS: &str = "id, course_id, course_name, class_name, owner_id, created_at, \
     expires_at, day, status, present_count, absent_count, excused_count";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter implementing every storage port on one connection pool.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
    feed: broadcast::Sender<FeedEvent>,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { pool, feed }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Forwards committed record inserts from `LISTEN/NOTIFY` to local subscribers
    /// until `shutdown` fires.
    pub async fn spawn_record_listener(
        &self,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(RECORD_CHANNEL).await?;
        info!(channel = RECORD_CHANNEL, "Listening for attendance record notifications");

        let adapter = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = listener.recv() => received,
                };
                match notification {
                    Ok(notification) => adapter.forward(notification.payload()).await,
                    // The listener reconnects on the next recv; notifications sent
                    // in between are lost.
                    Err(e) => {
                        warn!(error = %e, "Record notification stream interrupted");
                        let _ = adapter.feed.send(FeedEvent::Gap);
                    }
                }
            }
            info!("Record listener stopped");
        }))
    }

    async fn forward(&self, payload: &str) {
        let Ok(record_id) = Uuid::parse_str(payload) else {
            warn!(payload, "Ignoring malformed record notification");
            return;
        };
        if self.feed.receiver_count() == 0 {
            return;
        }
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM attendance_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await;
        match row.map_err(map_sqlx_error) {
            Ok(Some(row)) => match row.to_domain() {
                Ok(record) => {
                    let _ = self.feed.send(FeedEvent::Record(record));
                }
                Err(e) => error!(%record_id, error = %e, "Stored record is unreadable"),
            },
            Ok(None) => debug!(%record_id, "Notified record no longer exists"),
            Err(e) => {
                error!(%record_id, error = %e, "Failed to load notified record");
                let _ = self.feed.send(FeedEvent::Gap);
            }
        }
    }
}

/// Classifies driver errors into port errors.
fn map_sqlx_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            PortError::Conflict(db.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => PortError::Unavailable(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CourseRow {
    id: String,
    name: Option<String>,
    class_name: Option<String>,
    owner_id: Option<String>,
}
impl CourseRow {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            name: self.name,
            class_name: self.class_name,
            owner_id: self.owner_id,
        }
    }
}

#[derive(FromRow)]
struct EnrollmentRow {
    student_id: String,
    display_name: String,
}
impl EnrollmentRow {
    fn to_domain(self) -> RosterEntry {
        RosterEntry {
            student_id: self.student_id,
            display_name: self.display_name,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    course_id: String,
    course_name: String,
    class_name: String,
    owner_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    day: NaiveDate,
    status: String,
    present_count: Option<i32>,
    absent_count: Option<i32>,
    excused_count: Option<i32>,
}
impl SessionRow {
    fn to_domain(self) -> PortResult<Session> {
        let status = self.status.parse::<SessionStatus>().map_err(PortError::Unexpected)?;
        let outcome = match (self.present_count, self.absent_count, self.excused_count) {
            (Some(present), Some(absent), excused) => Some(FinalizationResult {
                present_count: present as usize,
                absent_count: absent as usize,
                excused_count: excused.unwrap_or(0) as usize,
            }),
            _ => None,
        };
        Ok(Session {
            id: self.id,
            course_id: self.course_id,
            course_name: self.course_name,
            class_name: self.class_name,
            owner_id: self.owner_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
            day: self.day,
            status,
            outcome,
        })
    }
}

#[derive(FromRow)]
struct RecordRow {
    id: Uuid,
    user_id: String,
    course_id: String,
    course_name: String,
    owner_id: String,
    session_id: Option<Uuid>,
    recorded_at: DateTime<Utc>,
    day: NaiveDate,
    status: String,
    notes: Option<String>,
}
impl RecordRow {
    fn to_domain(self) -> PortResult<AttendanceRecord> {
        Ok(AttendanceRecord {
            id: self.id,
            user_id: self.user_id,
            course_id: self.course_id,
            course_name: self.course_name,
            owner_id: self.owner_id,
            session_id: self.session_id,
            timestamp: self.recorded_at,
            day: self.day,
            status: self
                .status
                .parse::<AttendanceStatus>()
                .map_err(PortError::Unexpected)?,
            notes: self.notes,
        })
    }
}

fn insert_record_sql(on_conflict: &str) -> String {
    format!(
        "INSERT INTO attendance_records ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) {}",
        RECORD_COLUMNS, on_conflict
    )
}

fn bind_record<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    record: &'q AttendanceRecord,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.course_id)
        .bind(&record.course_name)
        .bind(&record.owner_id)
        .bind(record.session_id)
        .bind(record.timestamp)
        .bind(record.day)
        .bind(record.status.as_str())
        .bind(&record.notes)
}

//=========================================================================================
// Course Catalog and Roster
//=========================================================================================

#[async_trait]
impl CourseCatalog for DbAdapter {
    async fn get_course(&self, course_id: &str) -> PortResult<Course> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, name, class_name, owner_id FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(CourseRow::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))
    }
}

#[async_trait]
impl RosterProvider for DbAdapter {
    async fn students_in_class(&self, class_name: &str) -> PortResult<Vec<RosterEntry>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(
            "SELECT student_id, display_name FROM enrollments WHERE class_name = $1 ORDER BY student_id",
        )
        .bind(class_name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(EnrollmentRow::to_domain).collect())
    }
}

//=========================================================================================
// `AttendanceStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AttendanceStore for DbAdapter {
    async fn insert_if_absent(&self, record: AttendanceRecord) -> PortResult<InsertOutcome> {
        let sql = insert_record_sql("ON CONFLICT (user_id, course_id, day) DO NOTHING");
        let result = bind_record(sqlx::query(&sql), &record)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(if result.rows_affected() == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Conflict
        })
    }

    async fn query(&self, filter: &RecordFilter) -> PortResult<Vec<AttendanceRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM attendance_records WHERE TRUE",
            RECORD_COLUMNS
        ));
        if let Some(session_id) = filter.session_id {
            builder.push(" AND session_id = ").push_bind(session_id);
        }
        if let Some(course_id) = &filter.course_id {
            builder.push(" AND course_id = ").push_bind(course_id.clone());
        }
        if let Some(user_id) = &filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(owner_id) = &filter.owner_id {
            builder.push(" AND owner_id = ").push_bind(owner_id.clone());
        }
        if let Some(day) = filter.day {
            builder.push(" AND day = ").push_bind(day);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY recorded_at, user_id");

        let rows = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(RecordRow::to_domain).collect()
    }

    async fn batch_write(&self, records: Vec<AttendanceRecord>) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for record in &records {
            let sql = insert_record_sql("");
            // A unique violation aborts the transaction; dropping `tx` rolls it back.
            bind_record(sqlx::query(&sql), record)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(count = records.len(), "Attendance batch committed");
        Ok(())
    }

    async fn subscribe(&self, filter: RecordFilter) -> PortResult<RecordStream> {
        let mut rx = self.feed.subscribe();
        Ok(Box::pin(stream! {
            loop {
                match rx.recv().await {
                    Ok(FeedEvent::Record(record)) => {
                        if filter.matches(&record) {
                            yield FeedEvent::Record(record);
                        }
                    }
                    Ok(FeedEvent::Gap) => yield FeedEvent::Gap,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Record subscriber lagged behind");
                        yield FeedEvent::Gap;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

//=========================================================================================
// `SessionRepository` Trait Implementation
//=========================================================================================

impl DbAdapter {
    async fn sessions_where(&self, condition: &str, value: &str) -> PortResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM sessions WHERE {} ORDER BY created_at DESC",
            SESSION_COLUMNS, condition
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(SessionRow::to_domain).collect()
    }

    async fn session_exists(&self, session_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM sessions WHERE id = $1)")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl SessionRepository for DbAdapter {
    async fn insert_active(&self, session: Session) -> PortResult<()> {
        sqlx::query(&format!(
            "INSERT INTO sessions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, NULL, NULL)",
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .bind(&session.course_id)
        .bind(&session.course_name)
        .bind(&session.class_name)
        .bind(&session.owner_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.day)
        .bind(SessionStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        match row {
            Some(row) => row.to_domain(),
            None => Err(PortError::NotFound(format!("Session {} not found", session_id))),
        }
    }

    async fn find_active_for_course(&self, course_id: &str) -> PortResult<Option<Session>> {
        Ok(self
            .sessions_where("course_id = $1 AND status = 'active'", course_id)
            .await?
            .into_iter()
            .next())
    }

    async fn find_active_for_owner(&self, owner_id: &str) -> PortResult<Vec<Session>> {
        self.sessions_where("owner_id = $1 AND status = 'active'", owner_id)
            .await
    }

    async fn list_by_status(&self, status: SessionStatus) -> PortResult<Vec<Session>> {
        self.sessions_where("status = $1", status.as_str()).await
    }

    async fn transition(
        &self,
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> PortResult<bool> {
        let result = sqlx::query("UPDATE sessions SET status = $3 WHERE id = $1 AND status = $2")
            .bind(session_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.session_exists(session_id).await? {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(false)
    }

    async fn mark_finalized(
        &self,
        session_id: Uuid,
        outcome: FinalizationResult,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'finalized', present_count = $2, absent_count = $3, \
             excused_count = $4 WHERE id = $1 AND status = 'expired'",
        )
        .bind(session_id)
        .bind(outcome.present_count as i32)
        .bind(outcome.absent_count as i32)
        .bind(outcome.excused_count as i32)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.session_exists(session_id).await? {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(false)
    }
}
