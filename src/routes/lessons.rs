//! `/lessons` routes — the weekly board.
//!
//! * `GET    /lessons?weekStart=&day=&studentId=` — a week's lessons with student and extras
//! * `POST   /lessons`                            — drop a student onto a cell
//! * `PUT    /lessons/{id}`                       — move / edit a lesson
//! * `PUT    /lessons/{id}/actual`                — record what really happened
//! * `DELETE /lessons/{id}`
//! * `GET    /lessons/by-month?month=YYYY-MM&saved=1`
//! * `POST   /lessons/seed-from-last`             — seed an empty week from the last saved one
//! * `POST   /lessons/clone-to-next`              — overwrite next week with this week's layout

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{deserialize_some, required_week_param, week_param};
use crate::{
    db::Db,
    errors::{AppError, AppResult},
    models::{Extracurricular, Lesson, Teacher},
    schedule::{
        lessons::{self, ActualTime, LessonFilter, LessonPatch, NewLesson, Scheduled},
        time, weeks,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lessons",                get(list_lessons).post(create_lesson))
        .route("/lessons/by-month",       get(lessons_by_month))
        .route("/lessons/seed-from-last", post(seed_from_last))
        .route("/lessons/clone-to-next",  post(clone_to_next))
        .route("/lessons/{id}",           put(update_lesson).delete(delete_lesson))
        .route("/lessons/{id}/actual",    put(set_actual))
}

// ── Views ────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct StudentNameRow {
    id:        String,
    full_name: String,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct StudentCard {
    id:        String,
    full_name: String,
    extras:    Vec<Extracurricular>,
}

#[derive(Serialize)]
struct LessonView {
    #[serde(flatten)]
    lesson:  Lesson,
    student: Option<StudentCard>,
}

/// A written lesson with its conflict and the card the board drops in place.
#[derive(Serialize)]
struct ScheduledView {
    #[serde(flatten)]
    scheduled: Scheduled,
    student:   Option<StudentCard>,
}

// ── Request types ────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    week_start: Option<String>,
    day:        Option<i32>,
    student_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLessonBody {
    student_id:  String,
    teacher:     Teacher,
    day_of_week: i32,
    start_min:   i32,
    dur_min:     Option<i32>,
    week_start:  Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLessonBody {
    teacher:          Option<Teacher>,
    day_of_week:      Option<i32>,
    start_min:        Option<i32>,
    dur_min:          Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    actual_start_min: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    actual_dur_min:   Option<Option<i32>>,
    week_start:       Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActualBody {
    Range {
        #[serde(rename = "startClock")]
        start_clock: String,
        #[serde(rename = "endClock")]
        end_clock:   String,
    },
    Preset {
        #[serde(rename = "presetMinutes")]
        preset_minutes: i32,
    },
    Clear {
        clear: bool,
    },
}

#[derive(Deserialize)]
struct MonthQuery {
    month: Option<String>,
    saved: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedBody {
    week_start: Option<String>,
    #[serde(default)]
    overwrite:  bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloneToNextBody {
    week_start: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────

/// Student name and extracurriculars for every student on the board.
async fn load_student_cards(pool: &Db, lessons: &[Lesson]) -> AppResult<HashMap<String, StudentCard>> {
    let mut ids: Vec<&str> = lessons.iter().map(|l| l.student_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");

    let students_sql = format!("SELECT id, full_name FROM students WHERE id IN ({placeholders})");
    let mut students_query = sqlx::query_as::<_, StudentNameRow>(&students_sql);
    for id in &ids {
        students_query = students_query.bind(*id);
    }
    let students = students_query.fetch_all(pool).await?;

    let extras_sql = format!(
        "SELECT id, student_id, label, day_of_week, start_min, dur_min
         FROM extracurriculars
         WHERE student_id IN ({placeholders})
         ORDER BY day_of_week, start_min"
    );
    let mut extras_query = sqlx::query_as::<_, Extracurricular>(&extras_sql);
    for id in &ids {
        extras_query = extras_query.bind(*id);
    }
    let extras = extras_query.fetch_all(pool).await?;

    let mut cards: HashMap<String, StudentCard> = students
        .into_iter()
        .map(|s| {
            let card = StudentCard { id: s.id.clone(), full_name: s.full_name, extras: Vec::new() };
            (s.id, card)
        })
        .collect();
    for extra in extras {
        if let Some(card) = cards.get_mut(&extra.student_id) {
            card.extras.push(extra);
        }
    }
    Ok(cards)
}

async fn with_student_card(pool: &Db, scheduled: Scheduled) -> AppResult<ScheduledView> {
    let mut cards = load_student_cards(pool, std::slice::from_ref(&scheduled.lesson)).await?;
    let student = cards.remove(&scheduled.lesson.student_id);
    Ok(ScheduledView { scheduled, student })
}

// ── Handlers ─────────────────────────────────────────────────

async fn list_lessons(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<LessonView>>> {
    let week_start = week_param(query.week_start.as_deref())?;
    let day_of_week = match query.day {
        Some(day) => Some(
            time::normalize_day(day).ok_or_else(|| AppError::BadRequest("day must be 1–7".into()))?,
        ),
        None => None,
    };
    let filter = LessonFilter {
        day_of_week,
        student_id: query.student_id.filter(|s| !s.trim().is_empty()),
    };

    let pool = &state.pool;
    let rows = lessons::list_for_week(pool, week_start, &filter).await?;
    let cards = load_student_cards(pool, &rows).await?;

    let views = rows
        .into_iter()
        .map(|lesson| {
            let student = cards.get(&lesson.student_id).cloned();
            LessonView { lesson, student }
        })
        .collect();
    Ok(Json(views))
}

async fn create_lesson(
    State(state): State<AppState>,
    Json(body): Json<CreateLessonBody>,
) -> AppResult<(StatusCode, Json<ScheduledView>)> {
    if body.student_id.trim().is_empty() {
        return Err(AppError::BadRequest("studentId is required".into()));
    }
    let week_start = week_param(body.week_start.as_deref())?;

    let scheduled = lessons::create(
        &state.pool,
        NewLesson {
            student_id:  body.student_id,
            teacher:     body.teacher,
            day_of_week: body.day_of_week,
            start_min:   body.start_min,
            dur_min:     body.dur_min.unwrap_or(state.config.default_lesson_minutes),
            week_start,
        },
    )
    .await?;
    let view = with_student_card(&state.pool, scheduled).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateLessonBody>,
) -> AppResult<Json<ScheduledView>> {
    let week_start = match body.week_start.as_deref() {
        Some(raw) => Some(required_week_param("weekStart", Some(raw))?),
        None => None,
    };

    let patch = LessonPatch {
        teacher:          body.teacher,
        day_of_week:      body.day_of_week,
        start_min:        body.start_min,
        dur_min:          body.dur_min,
        actual_start_min: body.actual_start_min,
        actual_dur_min:   body.actual_dur_min,
        week_start,
    };
    let scheduled = lessons::update(&state.pool, &id, patch).await?;
    Ok(Json(with_student_card(&state.pool, scheduled).await?))
}

async fn set_actual(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ActualBody>,
) -> AppResult<Json<Lesson>> {
    let actual = match body {
        ActualBody::Range { start_clock, end_clock } => {
            let start_min = time::from_clock(&start_clock)
                .ok_or_else(|| AppError::BadRequest("startClock must be HH:MM".into()))?;
            let end_min = time::from_clock(&end_clock)
                .ok_or_else(|| AppError::BadRequest("endClock must be HH:MM".into()))?;
            ActualTime::Range { start_min, end_min }
        }
        ActualBody::Preset { preset_minutes } => ActualTime::Preset(preset_minutes),
        ActualBody::Clear { clear: true } => ActualTime::Clear,
        ActualBody::Clear { clear: false } => {
            return Err(AppError::BadRequest("nothing to update".into()));
        }
    };

    let lesson = lessons::set_actual(&state.pool, &id, actual).await?;
    Ok(Json(lesson))
}

async fn delete_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    lessons::delete(&state.pool, &id).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn lessons_by_month(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<Vec<Lesson>>> {
    let (year, month) = query
        .month
        .as_deref()
        .and_then(time::parse_month)
        .ok_or_else(|| AppError::BadRequest("month must be YYYY-MM".into()))?;
    let only_saved = matches!(query.saved.as_deref(), Some("1") | Some("true"));

    let pool = &state.pool;
    let mut week_starts = time::month_week_anchors(year, month);
    if only_saved {
        let saved = weeks::saved_among(pool, &week_starts).await?;
        week_starts.retain(|w| saved.contains(w));
    }

    let rows = lessons::list_for_weeks(pool, &week_starts).await?;
    Ok(Json(rows))
}

async fn seed_from_last(
    State(state): State<AppState>,
    Json(body): Json<SeedBody>,
) -> AppResult<Json<weeks::SeedOutcome>> {
    let target = required_week_param("weekStart", body.week_start.as_deref())?;
    let outcome = weeks::seed_from_last_saved(&state.pool, target, body.overwrite).await?;
    Ok(Json(outcome))
}

async fn clone_to_next(
    State(state): State<AppState>,
    Json(body): Json<CloneToNextBody>,
) -> AppResult<Json<Value>> {
    let from = week_param(body.week_start.as_deref())?;
    let to = time::next_week(from);
    let cloned = weeks::clone_week(&state.pool, from, to).await?;
    Ok(Json(json!({ "ok": true, "cloned": cloned.len() })))
}
