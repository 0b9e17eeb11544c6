use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::{
    db::Db,
    errors::{AppError, AppResult},
    schedule::time,
    state::AppState,
};

mod invoices;
mod lessons;
mod sends;
mod students;
mod weeks;

/// Build the full `/api` router.
pub fn all_routes() -> Router<AppState> {
    Router::new()
        .merge(students::router())
        .merge(lessons::router())
        .merge(weeks::router())
        .merge(invoices::router())
        .merge(sends::router())
}

// ── Shared extractor helpers ─────────────────────────────────

/// Week anchor for an optional `YYYY-MM-DD` parameter; absent means this week.
fn week_param(raw: Option<&str>) -> AppResult<NaiveDate> {
    time::parse_week_anchor(raw).ok_or_else(|| AppError::BadRequest("weekStart must be YYYY-MM-DD".into()))
}

/// Week anchor for a parameter that must be present.
fn required_week_param(name: &str, raw: Option<&str>) -> AppResult<NaiveDate> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(time::parse_date)
        .map(time::week_anchor)
        .ok_or_else(|| AppError::BadRequest(format!("{name} must be YYYY-MM-DD")))
}

/// `400` unless `student_id` names a stored student.
async fn ensure_student(pool: &Db, student_id: &str) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM students WHERE id = ?)")
        .bind(student_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(AppError::BadRequest("studentId does not match any student".into()));
    }
    Ok(())
}

/// Lets `Option<Option<T>>` tell an omitted field (`None`) from an explicit
/// `null` (`Some(None)`). Pair with `#[serde(default)]`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
