//! `/sends` routes — whether each student's weekly timetable went out.
//!
//! * `GET   /sends?weekStart=YYYY-MM-DD` — send records, newest week first
//! * `POST  /sends`                      — record a send for `(studentId, weekStart)`
//! * `PATCH /sends/{id}`                 — flip between ENVIADO and PENDIENTE

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{ensure_student, required_week_param};
use crate::{
    errors::{AppError, AppResult},
    models::{ScheduleSend, SendStatus},
    schedule::time,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sends",      get(list_sends).post(record_send))
        .route("/sends/{id}", patch(update_send))
}

const SEND_COLUMNS: &str = "id, student_id, week_start, status, sent_at, created_at";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    week_start: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordSendBody {
    #[serde(default)]
    student_id: String,
    week_start: Option<String>,
    #[serde(default = "sent")]
    status:     SendStatus,
}

fn sent() -> SendStatus {
    SendStatus::Enviado
}

#[derive(Deserialize)]
struct UpdateSendBody {
    status: Option<SendStatus>,
}

async fn list_sends(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<ScheduleSend>>> {
    let week_start = match query.week_start.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
        Some(raw) => Some(
            time::parse_date(raw)
                .map(time::week_anchor)
                .ok_or_else(|| AppError::BadRequest("weekStart must be YYYY-MM-DD".into()))?,
        ),
        None => None,
    };

    let rows = sqlx::query_as::<_, ScheduleSend>(&format!(
        "SELECT {SEND_COLUMNS}
         FROM schedule_sends
         WHERE (? IS NULL OR week_start = ?)
         ORDER BY week_start DESC, created_at DESC"
    ))
    .bind(week_start)
    .bind(week_start)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

/// Upsert keyed by student and week. ENVIADO stamps `sentAt`; PENDIENTE
/// keeps whatever stamp the row already had.
async fn record_send(
    State(state): State<AppState>,
    Json(body): Json<RecordSendBody>,
) -> AppResult<Json<ScheduleSend>> {
    let student_id = body.student_id.trim();
    if student_id.is_empty() {
        return Err(AppError::BadRequest("studentId is required".into()));
    }
    let week_start = required_week_param("weekStart", body.week_start.as_deref())?;

    let pool = &state.pool;
    ensure_student(pool, student_id).await?;

    let sent_at = (body.status == SendStatus::Enviado).then(|| Utc::now().naive_utc());
    sqlx::query(
        "INSERT INTO schedule_sends (id, student_id, week_start, status, sent_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (student_id, week_start) DO UPDATE
         SET status  = excluded.status,
             sent_at = COALESCE(excluded.sent_at, schedule_sends.sent_at)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(student_id)
    .bind(week_start)
    .bind(body.status)
    .bind(sent_at)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, ScheduleSend>(&format!(
        "SELECT {SEND_COLUMNS} FROM schedule_sends WHERE student_id = ? AND week_start = ?"
    ))
    .bind(student_id)
    .bind(week_start)
    .fetch_one(pool)
    .await?;

    tracing::info!(send_id = %row.id, %student_id, %week_start, status = ?row.status, "Timetable send recorded");
    Ok(Json(row))
}

/// ENVIADO stamps `sentAt`, PENDIENTE clears it.
async fn update_send(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateSendBody>,
) -> AppResult<Json<ScheduleSend>> {
    let pool = &state.pool;

    if let Some(status) = body.status {
        let sent_at = (status == SendStatus::Enviado).then(|| Utc::now().naive_utc());
        let affected = sqlx::query("UPDATE schedule_sends SET status = ?, sent_at = ? WHERE id = ?")
            .bind(status)
            .bind(sent_at)
            .bind(&id)
            .execute(pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::NotFound);
        }
        tracing::info!(send_id = %id, ?status, "Timetable send updated");
    }

    let row = sqlx::query_as::<_, ScheduleSend>(&format!("SELECT {SEND_COLUMNS} FROM schedule_sends WHERE id = ?"))
        .bind(&id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(row))
}
