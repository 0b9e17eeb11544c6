//! `/students` routes — student profiles with their extracurriculars,
//! school timetable and subjects.
//!
//! Child collections are replaced wholesale on edit: when a list is present
//! in the body, the stored rows are deleted and recreated in the same
//! transaction; an absent list is left untouched.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::Db,
    errors::{AppError, AppResult},
    models::{Extracurricular, SchoolBlock, Student, Subject},
    schedule::{conflict::overlaps, time},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/students",      get(list_students).post(create_student))
        .route("/students/{id}", get(get_student).put(update_student).delete(delete_student))
}

pub(super) const STUDENT_COLUMNS: &str = "id, full_name, phone, address, guardian_name, guardian_phone, school, course,
     specialty, referral_source, desired_hours, session_minutes, hourly_rate, notes, created_at";

// ── Views ────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentDetail {
    #[serde(flatten)]
    student:       Student,
    extras:        Vec<Extracurricular>,
    school_blocks: Vec<SchoolBlock>,
    subjects:      Vec<Subject>,
}

// ── Request bodies ───────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    q:      Option<String>,
    course: Option<String>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct StudentBody {
    #[validate(length(min = 1, message = "fullName is required"))]
    full_name:       String,
    phone:           Option<String>,
    address:         Option<String>,
    guardian_name:   Option<String>,
    guardian_phone:  Option<String>,
    school:          Option<String>,
    course:          Option<String>,
    specialty:       Option<String>,
    referral_source: Option<String>,
    #[validate(range(min = 0.0, message = "desiredHours cannot be negative"))]
    desired_hours:   Option<f64>,
    #[validate(range(min = 1, message = "sessionMinutes must be positive"))]
    session_minutes: Option<i32>,
    #[validate(range(min = 0.0, message = "hourlyRate cannot be negative"))]
    hourly_rate:     Option<f64>,
    notes:           Option<String>,
    #[validate(nested)]
    extras:          Option<Vec<ExtraBody>>,
    #[validate(nested)]
    school_blocks:   Option<Vec<SchoolBlockBody>>,
    subjects:        Option<Vec<SubjectBody>>,
}

#[derive(Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct ExtraBody {
    #[serde(default)]
    label:       String,
    #[validate(range(min = 0, max = 7, message = "dayOfWeek must be 1–7 (0 is accepted as Sunday)"))]
    day_of_week: i32,
    #[validate(range(min = 0, max = 1439, message = "startMin must be within 0–1439"))]
    start_min:   i32,
    #[validate(range(min = 1, message = "durMin must be positive"))]
    dur_min:     i32,
}

#[derive(Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct SchoolBlockBody {
    #[validate(range(min = 1, max = 7, message = "fromDay must be 1–7"))]
    from_day:  i32,
    #[validate(range(min = 1, max = 7, message = "toDay must be 1–7"))]
    to_day:    i32,
    #[validate(range(min = 0, max = 1440, message = "startMin must be within 0–1440"))]
    start_min: i32,
    #[validate(range(min = 0, max = 1440, message = "endMin must be within 0–1440"))]
    end_min:   i32,
}

#[derive(Deserialize)]
struct SubjectBody {
    name: String,
}

// ── Validation ───────────────────────────────────────────────

/// Field checks plus the per-list rules: school blocks must run forward and
/// extracurricular days are stored as ISO weekdays.
fn validate_student(body: &mut StudentBody) -> AppResult<()> {
    body.validate()?;

    body.full_name = body.full_name.trim().to_string();
    if body.full_name.is_empty() {
        return Err(AppError::BadRequest("fullName is required".into()));
    }

    for block in body.school_blocks.as_deref().unwrap_or_default() {
        if block.to_day < block.from_day {
            return Err(AppError::BadRequest("school block cannot end on a day before it starts".into()));
        }
        if block.end_min <= block.start_min {
            return Err(AppError::BadRequest("school block must end after it starts".into()));
        }
    }

    for extra in body.extras.iter_mut().flatten() {
        extra.day_of_week = time::normalize_day(extra.day_of_week)
            .ok_or_else(|| AppError::BadRequest("dayOfWeek must be 1–7".into()))?;
    }
    Ok(())
}

/// No extracurricular may sit inside school hours.
fn check_school_hours(extras: &[ExtraBody], blocks: &[SchoolBlockBody]) -> AppResult<()> {
    for extra in extras {
        let clash = blocks.iter().find(|b| {
            (b.from_day..=b.to_day).contains(&extra.day_of_week)
                && overlaps(extra.start_min, extra.dur_min, b.start_min, b.end_min - b.start_min)
        });
        if let Some(block) = clash {
            return Err(AppError::BadRequest(format!(
                "extracurricular \"{}\" ({}–{}) overlaps school hours ({}–{})",
                extra.label,
                time::to_clock(extra.start_min),
                time::to_clock(extra.start_min + extra.dur_min),
                time::to_clock(block.start_min),
                time::to_clock(block.end_min),
            )));
        }
    }
    Ok(())
}

/// Check the lists an update carries against whichever of the two is kept
/// from storage.
async fn check_school_hours_on_update(
    conn: &mut SqliteConnection,
    student_id: &str,
    body: &StudentBody,
) -> AppResult<()> {
    let stored_extras;
    let extras = match &body.extras {
        Some(extras) => extras.as_slice(),
        None if body.school_blocks.is_none() => return Ok(()),
        None => {
            stored_extras = sqlx::query_as::<_, ExtraBody>(
                "SELECT label, day_of_week, start_min, dur_min FROM extracurriculars WHERE student_id = ?",
            )
            .bind(student_id)
            .fetch_all(&mut *conn)
            .await?;
            stored_extras.as_slice()
        }
    };

    let stored_blocks;
    let blocks = match &body.school_blocks {
        Some(blocks) => blocks.as_slice(),
        None => {
            stored_blocks = sqlx::query_as::<_, SchoolBlockBody>(
                "SELECT from_day, to_day, start_min, end_min FROM school_blocks WHERE student_id = ?",
            )
            .bind(student_id)
            .fetch_all(&mut *conn)
            .await?;
            stored_blocks.as_slice()
        }
    };

    check_school_hours(extras, blocks)
}

// ── Persistence helpers ──────────────────────────────────────

async fn load_detail(pool: &Db, id: &str) -> AppResult<StudentDetail> {
    let student: Student = sqlx::query_as::<_, Student>(&format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;

    let extras: Vec<Extracurricular> = sqlx::query_as::<_, Extracurricular>(
        "SELECT id, student_id, label, day_of_week, start_min, dur_min
         FROM extracurriculars WHERE student_id = ? ORDER BY day_of_week, start_min",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let school_blocks: Vec<SchoolBlock> = sqlx::query_as::<_, SchoolBlock>(
        "SELECT id, student_id, from_day, to_day, start_min, end_min
         FROM school_blocks WHERE student_id = ? ORDER BY from_day, start_min",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let subjects: Vec<Subject> = sqlx::query_as::<_, Subject>(
        "SELECT id, student_id, name FROM student_subjects WHERE student_id = ? ORDER BY name",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(StudentDetail { student, extras, school_blocks, subjects })
}

/// Replace whichever child collections the body carries.
async fn replace_children(conn: &mut SqliteConnection, student_id: &str, body: &StudentBody) -> AppResult<()> {
    if let Some(extras) = &body.extras {
        sqlx::query("DELETE FROM extracurriculars WHERE student_id = ?")
            .bind(student_id)
            .execute(&mut *conn)
            .await?;
        for e in extras {
            sqlx::query(
                "INSERT INTO extracurriculars (id, student_id, label, day_of_week, start_min, dur_min)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(student_id)
            .bind(&e.label)
            .bind(e.day_of_week)
            .bind(e.start_min)
            .bind(e.dur_min)
            .execute(&mut *conn)
            .await?;
        }
    }

    if let Some(blocks) = &body.school_blocks {
        sqlx::query("DELETE FROM school_blocks WHERE student_id = ?")
            .bind(student_id)
            .execute(&mut *conn)
            .await?;
        for b in blocks {
            sqlx::query(
                "INSERT INTO school_blocks (id, student_id, from_day, to_day, start_min, end_min)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(student_id)
            .bind(b.from_day)
            .bind(b.to_day)
            .bind(b.start_min)
            .bind(b.end_min)
            .execute(&mut *conn)
            .await?;
        }
    }

    if let Some(subjects) = &body.subjects {
        sqlx::query("DELETE FROM student_subjects WHERE student_id = ?")
            .bind(student_id)
            .execute(&mut *conn)
            .await?;
        for s in subjects.iter().filter(|s| !s.name.trim().is_empty()) {
            sqlx::query("INSERT INTO student_subjects (id, student_id, name) VALUES (?, ?, ?)")
                .bind(Uuid::new_v4().to_string())
                .bind(student_id)
                .bind(s.name.trim())
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────

async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<StudentDetail>>> {
    let pool = &state.pool;
    let pattern = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{q}%"));
    let course = query.course.filter(|c| !c.trim().is_empty());

    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM students
         WHERE (? IS NULL OR course = ?)
           AND (? IS NULL
                OR full_name LIKE ? OR address LIKE ? OR school LIKE ? OR specialty LIKE ?)
         ORDER BY full_name",
    )
    .bind(&course)
    .bind(&course)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(pool)
    .await?;

    let mut students = Vec::with_capacity(ids.len());
    for id in &ids {
        students.push(load_detail(pool, id).await?);
    }
    Ok(Json(students))
}

async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<StudentDetail>> {
    Ok(Json(load_detail(&state.pool, &id).await?))
}

async fn create_student(
    State(state): State<AppState>,
    Json(mut body): Json<StudentBody>,
) -> AppResult<(StatusCode, Json<StudentDetail>)> {
    validate_student(&mut body)?;
    check_school_hours(
        body.extras.as_deref().unwrap_or_default(),
        body.school_blocks.as_deref().unwrap_or_default(),
    )?;

    let pool = &state.pool;
    let id = Uuid::new_v4().to_string();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO students (id, full_name, phone, address, guardian_name, guardian_phone, school, course,
                               specialty, referral_source, desired_hours, session_minutes, hourly_rate, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&body.full_name)
    .bind(&body.phone)
    .bind(&body.address)
    .bind(&body.guardian_name)
    .bind(&body.guardian_phone)
    .bind(&body.school)
    .bind(&body.course)
    .bind(&body.specialty)
    .bind(&body.referral_source)
    .bind(body.desired_hours)
    .bind(body.session_minutes)
    .bind(body.hourly_rate)
    .bind(&body.notes)
    .execute(&mut *tx)
    .await?;
    replace_children(&mut *tx, &id, &body).await?;
    tx.commit().await?;

    tracing::info!(student_id = %id, "Student created");
    Ok((StatusCode::CREATED, Json(load_detail(pool, &id).await?)))
}

async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<StudentBody>,
) -> AppResult<Json<StudentDetail>> {
    validate_student(&mut body)?;

    let pool = &state.pool;
    let mut tx = pool.begin().await?;
    let affected = sqlx::query(
        "UPDATE students
         SET full_name = ?, phone = ?, address = ?, guardian_name = ?, guardian_phone = ?, school = ?,
             course = ?, specialty = ?, referral_source = ?, desired_hours = ?, session_minutes = ?,
             hourly_rate = ?, notes = ?
         WHERE id = ?",
    )
    .bind(&body.full_name)
    .bind(&body.phone)
    .bind(&body.address)
    .bind(&body.guardian_name)
    .bind(&body.guardian_phone)
    .bind(&body.school)
    .bind(&body.course)
    .bind(&body.specialty)
    .bind(&body.referral_source)
    .bind(body.desired_hours)
    .bind(body.session_minutes)
    .bind(body.hourly_rate)
    .bind(&body.notes)
    .bind(&id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }
    check_school_hours_on_update(&mut *tx, &id, &body).await?;
    replace_children(&mut *tx, &id, &body).await?;
    tx.commit().await?;

    tracing::info!(student_id = %id, "Student updated");
    Ok(Json(load_detail(pool, &id).await?))
}

async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let affected = sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }
    tracing::info!(student_id = %id, "Student deleted");
    Ok(Json(json!({ "ok": true })))
}
