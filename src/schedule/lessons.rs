//! Lesson persistence scoped to week anchors.
//!
//! Every mutation runs in one transaction: slot guard, write, conflict scan.
//! The unique slot index backs the guard when two writers race.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    db::Db,
    errors::{AppError, AppResult},
    models::{ConflictDescriptor, Lesson, Teacher},
    schedule::{
        conflict::{self, Candidate},
        time::{self, MINUTES_PER_DAY},
    },
};

pub(crate) const LESSON_COLUMNS: &str =
    "id, student_id, teacher, day_of_week, start_min, dur_min, actual_start_min, actual_dur_min, week_start";

#[derive(Debug, Clone)]
pub struct NewLesson {
    pub student_id:  String,
    pub teacher:     Teacher,
    pub day_of_week: i32,
    pub start_min:   i32,
    pub dur_min:     i32,
    pub week_start:  NaiveDate,
}

/// Partial update of a lesson. `None` leaves a field alone; for the actual
/// times `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct LessonPatch {
    pub teacher:          Option<Teacher>,
    pub day_of_week:      Option<i32>,
    pub start_min:        Option<i32>,
    pub dur_min:          Option<i32>,
    pub actual_start_min: Option<Option<i32>>,
    pub actual_dur_min:   Option<Option<i32>>,
    pub week_start:       Option<NaiveDate>,
}

/// What really happened in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualTime {
    Range { start_min: i32, end_min: i32 },
    Preset(i32),
    Clear,
}

#[derive(Debug, Clone, Default)]
pub struct LessonFilter {
    pub day_of_week: Option<i32>,
    pub student_id:  Option<String>,
}

/// A committed lesson and the advisory overlap found for it, if any.
#[derive(Debug, Clone, Serialize)]
pub struct Scheduled {
    #[serde(flatten)]
    pub lesson:   Lesson,
    pub conflict: Option<ConflictDescriptor>,
}

// ── Validation ───────────────────────────────────────────────

/// Checks a planned slot and returns its canonical weekday.
pub fn validate_slot(day_of_week: i32, start_min: i32, dur_min: i32) -> AppResult<i32> {
    let day = time::normalize_day(day_of_week)
        .ok_or_else(|| AppError::BadRequest("dayOfWeek must be 1–7 (0 is accepted as Sunday)".into()))?;
    if !(0..MINUTES_PER_DAY).contains(&start_min) {
        return Err(AppError::BadRequest("startMin must be within 0–1439".into()));
    }
    if dur_min <= 0 {
        return Err(AppError::BadRequest("durMin must be positive".into()));
    }
    Ok(day)
}

fn validate_actual(actual_start_min: Option<i32>, actual_dur_min: Option<i32>) -> AppResult<()> {
    if let Some(start) = actual_start_min {
        if !(0..MINUTES_PER_DAY).contains(&start) {
            return Err(AppError::BadRequest("actualStartMin must be within 0–1439".into()));
        }
    }
    if let Some(dur) = actual_dur_min {
        if dur <= 0 {
            return Err(AppError::BadRequest("actualDurMin must be positive".into()));
        }
    }
    Ok(())
}

// ── Reads ────────────────────────────────────────────────────

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> AppResult<Option<Lesson>> {
    let row = sqlx::query_as::<_, Lesson>(&format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn get(pool: &Db, id: &str) -> AppResult<Lesson> {
    let mut conn = pool.acquire().await?;
    fetch(&mut *conn, id).await?.ok_or(AppError::NotFound)
}

/// Lessons of one week ordered by (dayOfWeek, startMin).
pub async fn list_for_week(pool: &Db, week_start: NaiveDate, filter: &LessonFilter) -> AppResult<Vec<Lesson>> {
    let rows = sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {LESSON_COLUMNS}
         FROM lessons
         WHERE week_start = ?
           AND (? IS NULL OR day_of_week = ?)
           AND (? IS NULL OR student_id = ?)
         ORDER BY day_of_week, start_min"
    ))
    .bind(week_start)
    .bind(filter.day_of_week)
    .bind(filter.day_of_week)
    .bind(filter.student_id.as_deref())
    .bind(filter.student_id.as_deref())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Lessons of several weeks ordered by (weekStart, dayOfWeek, startMin).
pub async fn list_for_weeks(pool: &Db, weeks: &[NaiveDate]) -> AppResult<Vec<Lesson>> {
    if weeks.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = weeks.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT {LESSON_COLUMNS}
         FROM lessons
         WHERE week_start IN ({placeholders})
         ORDER BY week_start, day_of_week, start_min"
    );
    let mut query = sqlx::query_as::<_, Lesson>(&sql);
    for week in weeks {
        query = query.bind(*week);
    }
    Ok(query.fetch_all(pool).await?)
}

pub(crate) async fn count_in_week(conn: &mut SqliteConnection, week_start: NaiveDate) -> AppResult<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE week_start = ?")
        .bind(week_start)
        .fetch_one(&mut *conn)
        .await?;
    Ok(n)
}

// ── Mutations ────────────────────────────────────────────────

pub async fn create(pool: &Db, new: NewLesson) -> AppResult<Scheduled> {
    let day_of_week = validate_slot(new.day_of_week, new.start_min, new.dur_min)?;
    let week_start = time::week_anchor(new.week_start);

    let mut tx = pool.begin().await?;

    let student_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM students WHERE id = ?)")
        .bind(&new.student_id)
        .fetch_one(&mut *tx)
        .await?;
    if !student_exists {
        return Err(AppError::BadRequest("studentId does not match any student".into()));
    }

    let id = Uuid::new_v4().to_string();
    let candidate = Candidate {
        student_id: &new.student_id,
        day_of_week,
        start_min: new.start_min,
        dur_min: new.dur_min,
        week_start,
        exclude_id: Some(&id),
    };

    if conflict::has_duplicate_slot(&mut *tx, &candidate).await? {
        tracing::debug!(student_id = %new.student_id, %week_start, day_of_week, start_min = new.start_min, "Rejected duplicate slot");
        return Err(AppError::DuplicateSlot);
    }

    sqlx::query(
        "INSERT INTO lessons (id, student_id, teacher, day_of_week, start_min, dur_min, week_start)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new.student_id)
    .bind(new.teacher)
    .bind(day_of_week)
    .bind(new.start_min)
    .bind(new.dur_min)
    .bind(week_start)
    .execute(&mut *tx)
    .await
    .map_err(AppError::from_lesson_write)?;

    let conflict = conflict::check_conflict(&mut *tx, &candidate).await?;
    let lesson = fetch(&mut *tx, &id).await?.ok_or(AppError::NotFound)?;
    tx.commit().await?;

    tracing::info!(lesson_id = %id, teacher = %lesson.teacher, %week_start, conflict = conflict.is_some(), "Lesson created");
    Ok(Scheduled { lesson, conflict })
}

/// Merge `patch` over the stored lesson: move it between teachers, days,
/// start times or weeks, or record actual times.
pub async fn update(pool: &Db, id: &str, patch: LessonPatch) -> AppResult<Scheduled> {
    let mut tx = pool.begin().await?;
    let current = fetch(&mut *tx, id).await?.ok_or(AppError::NotFound)?;

    let teacher = patch.teacher.unwrap_or(current.teacher);
    let start_min = patch.start_min.unwrap_or(current.start_min);
    let dur_min = patch.dur_min.unwrap_or(current.dur_min);
    let day_of_week = validate_slot(patch.day_of_week.unwrap_or(current.day_of_week), start_min, dur_min)?;
    let week_start = patch.week_start.map(time::week_anchor).unwrap_or(current.week_start);
    let actual_start_min = patch.actual_start_min.unwrap_or(current.actual_start_min);
    let actual_dur_min = patch.actual_dur_min.unwrap_or(current.actual_dur_min);
    validate_actual(actual_start_min, actual_dur_min)?;

    let candidate = Candidate {
        student_id: &current.student_id,
        day_of_week,
        start_min,
        dur_min,
        week_start,
        exclude_id: Some(id),
    };

    if conflict::has_duplicate_slot(&mut *tx, &candidate).await? {
        tracing::debug!(lesson_id = %id, %week_start, day_of_week, start_min, "Rejected move onto a taken slot");
        return Err(AppError::DuplicateSlot);
    }

    sqlx::query(
        "UPDATE lessons
         SET teacher = ?, day_of_week = ?, start_min = ?, dur_min = ?,
             actual_start_min = ?, actual_dur_min = ?, week_start = ?
         WHERE id = ?",
    )
    .bind(teacher)
    .bind(day_of_week)
    .bind(start_min)
    .bind(dur_min)
    .bind(actual_start_min)
    .bind(actual_dur_min)
    .bind(week_start)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::from_lesson_write)?;

    let conflict = conflict::check_conflict(&mut *tx, &candidate).await?;
    let lesson = fetch(&mut *tx, id).await?.ok_or(AppError::NotFound)?;
    tx.commit().await?;

    tracing::info!(lesson_id = %id, %teacher, %week_start, day_of_week, start_min, "Lesson updated");
    Ok(Scheduled { lesson, conflict })
}

/// Record or clear the realised time of a session. The booked slot is left
/// untouched, so neither the slot guard nor the conflict scan runs.
pub async fn set_actual(pool: &Db, id: &str, actual: ActualTime) -> AppResult<Lesson> {
    let query = match actual {
        ActualTime::Range { start_min, end_min } => {
            if end_min <= start_min {
                return Err(AppError::BadRequest("end time must be after start time".into()));
            }
            validate_actual(Some(start_min), Some(end_min - start_min))?;
            sqlx::query("UPDATE lessons SET actual_start_min = ?, actual_dur_min = ? WHERE id = ?")
                .bind(start_min)
                .bind(end_min - start_min)
        }
        ActualTime::Preset(minutes) => {
            validate_actual(None, Some(minutes))?;
            sqlx::query("UPDATE lessons SET actual_dur_min = ? WHERE id = ?").bind(minutes)
        }
        ActualTime::Clear => {
            sqlx::query("UPDATE lessons SET actual_start_min = NULL, actual_dur_min = NULL WHERE id = ?")
        }
    };

    let affected = query.bind(id).execute(pool).await?.rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }

    tracing::info!(lesson_id = %id, ?actual, "Lesson actual time recorded");
    get(pool, id).await
}

pub async fn delete(pool: &Db, id: &str) -> AppResult<()> {
    let affected = sqlx::query("DELETE FROM lessons WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }
    tracing::info!(lesson_id = %id, "Lesson deleted");
    Ok(())
}
