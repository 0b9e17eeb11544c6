//! Saved-week tracking and week-to-week cloning of the lesson layout.
//!
//! A week is UNSAVED until the user marks it saved; the flag flips back only
//! on the same explicit action. Saved weeks are the templates later weeks
//! are seeded from. Clones copy the planned slot only, never actual times,
//! and always leave the destination week unsaved.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    db::Db,
    errors::{AppError, AppResult},
    models::{Lesson, Teacher, WeekState},
    schedule::lessons::{self, LESSON_COLUMNS},
};

/// The planned part of a lesson, which is all a clone carries over.
#[derive(Debug, Clone, sqlx::FromRow)]
struct LessonTemplate {
    student_id:  String,
    teacher:     Teacher,
    day_of_week: i32,
    start_min:   i32,
    dur_min:     i32,
}

impl LessonTemplate {
    fn slot_key(&self) -> (String, i32, i32) {
        (self.student_id.clone(), self.day_of_week, self.start_min)
    }
}

#[derive(Debug)]
pub enum CloneOutcome {
    /// No saved week precedes the target, or the saved week is empty.
    NoSource,
    /// The target already has lessons and no overwrite was requested.
    AlreadyPopulated,
    Cloned { source_week: NaiveDate, lessons: Vec<Lesson> },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SeedSkip {
    AlreadyHasLessons,
    NoPreviousSavedWeek,
    SourceWeekHasNoLessons,
    NothingToCreate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedOutcome {
    pub seeded:      bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason:      Option<SeedSkip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created:     Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_week: Option<NaiveDate>,
    pub week_start:  NaiveDate,
}

impl SeedOutcome {
    fn skipped(week_start: NaiveDate, reason: SeedSkip) -> Self {
        Self { seeded: false, reason: Some(reason), created: None, source_week: None, week_start }
    }
}

// ── Week state ───────────────────────────────────────────────

async fn upsert_state(conn: &mut SqliteConnection, week_start: NaiveDate, saved: bool) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO week_states (week_start, saved, updated_at)
         VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT (week_start) DO UPDATE
         SET saved = excluded.saved, updated_at = excluded.updated_at",
    )
    .bind(week_start)
    .bind(saved)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn mark_saved(pool: &Db, week_start: NaiveDate, saved: bool) -> AppResult<WeekState> {
    let mut conn = pool.acquire().await?;
    upsert_state(&mut *conn, week_start, saved).await?;
    tracing::info!(%week_start, saved, "Week state updated");
    Ok(WeekState { week_start, saved })
}

pub async fn is_saved(pool: &Db, week_start: NaiveDate) -> AppResult<bool> {
    let state = sqlx::query_as::<_, WeekState>("SELECT week_start, saved FROM week_states WHERE week_start = ?")
        .bind(week_start)
        .fetch_optional(pool)
        .await?;
    Ok(state.is_some_and(|s| s.saved))
}

/// The subset of `weeks` currently marked saved.
pub async fn saved_among(pool: &Db, weeks: &[NaiveDate]) -> AppResult<HashSet<NaiveDate>> {
    if weeks.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders = weeks.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT week_start FROM week_states WHERE saved = 1 AND week_start IN ({placeholders})");
    let mut query = sqlx::query_scalar::<_, NaiveDate>(&sql);
    for week in weeks {
        query = query.bind(*week);
    }
    Ok(query.fetch_all(pool).await?.into_iter().collect())
}

/// Most recent saved week strictly before `week_start`.
pub async fn find_last_saved_before(conn: &mut SqliteConnection, week_start: NaiveDate) -> AppResult<Option<NaiveDate>> {
    let found: Option<NaiveDate> = sqlx::query_scalar(
        "SELECT week_start FROM week_states
         WHERE saved = 1 AND week_start < ?
         ORDER BY week_start DESC
         LIMIT 1",
    )
    .bind(week_start)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found)
}

// ── Cloning ──────────────────────────────────────────────────

async fn load_templates(conn: &mut SqliteConnection, week_start: NaiveDate) -> AppResult<Vec<LessonTemplate>> {
    let rows = sqlx::query_as::<_, LessonTemplate>(
        "SELECT student_id, teacher, day_of_week, start_min, dur_min
         FROM lessons
         WHERE week_start = ?
         ORDER BY day_of_week, start_min",
    )
    .bind(week_start)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn insert_copies(conn: &mut SqliteConnection, templates: &[LessonTemplate], to: NaiveDate) -> AppResult<u64> {
    let mut inserted = 0;
    for t in templates {
        sqlx::query(
            "INSERT INTO lessons
                (id, student_id, teacher, day_of_week, start_min, dur_min, actual_start_min, actual_dur_min, week_start)
             VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&t.student_id)
        .bind(t.teacher)
        .bind(t.day_of_week)
        .bind(t.start_min)
        .bind(t.dur_min)
        .bind(to)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from_lesson_write)?;
        inserted += 1;
    }
    Ok(inserted)
}

async fn week_lessons(conn: &mut SqliteConnection, week_start: NaiveDate) -> AppResult<Vec<Lesson>> {
    let rows = sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {LESSON_COLUMNS} FROM lessons WHERE week_start = ? ORDER BY day_of_week, start_min"
    ))
    .bind(week_start)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Replace the lessons of `to` with a copy of `from`'s layout inside the
/// caller's transaction. An empty source is a no-op and leaves `to` untouched.
async fn copy_week(conn: &mut SqliteConnection, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Lesson>> {
    let templates = load_templates(&mut *conn, from).await?;
    if templates.is_empty() {
        return Ok(Vec::new());
    }

    let removed = sqlx::query("DELETE FROM lessons WHERE week_start = ?")
        .bind(to)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let cloned = insert_copies(&mut *conn, &templates, to).await?;
    upsert_state(&mut *conn, to, false).await?;

    tracing::info!(%from, %to, removed, cloned, "Week cloned");
    week_lessons(&mut *conn, to).await
}

/// Replace the lessons of `to` with a copy of `from`'s layout.
///
/// The delete, the inserts and the week-state upsert commit together.
pub async fn clone_week(pool: &Db, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Lesson>> {
    let mut tx = pool.begin().await?;
    let lessons = copy_week(&mut *tx, from, to).await?;
    tx.commit().await?;
    Ok(lessons)
}

/// Clone the last saved week before `to` into it. Without `overwrite` a
/// populated target is left alone.
///
/// The source lookup and the emptiness check share the transaction that
/// deletes and refills `to`.
pub async fn clone_from_last_saved(pool: &Db, to: NaiveDate, overwrite: bool) -> AppResult<CloneOutcome> {
    let mut tx = pool.begin().await?;

    let Some(source_week) = find_last_saved_before(&mut *tx, to).await? else {
        return Ok(CloneOutcome::NoSource);
    };
    if !overwrite && lessons::count_in_week(&mut *tx, to).await? > 0 {
        return Ok(CloneOutcome::AlreadyPopulated);
    }

    let lessons = copy_week(&mut *tx, source_week, to).await?;
    if lessons.is_empty() {
        return Ok(CloneOutcome::NoSource);
    }
    tx.commit().await?;

    Ok(CloneOutcome::Cloned { source_week, lessons })
}

/// Seed `target` from the last saved week before it.
///
/// A week that already has lessons is skipped unless `overwrite` is set; in
/// that case existing lessons stay and only slots the student does not hold
/// yet are added.
pub async fn seed_from_last_saved(pool: &Db, target: NaiveDate, overwrite: bool) -> AppResult<SeedOutcome> {
    let mut tx = pool.begin().await?;

    let existing = load_templates(&mut *tx, target).await?;
    if !existing.is_empty() && !overwrite {
        return Ok(SeedOutcome::skipped(target, SeedSkip::AlreadyHasLessons));
    }

    let Some(source_week) = find_last_saved_before(&mut *tx, target).await? else {
        return Ok(SeedOutcome::skipped(target, SeedSkip::NoPreviousSavedWeek));
    };

    let source = load_templates(&mut *tx, source_week).await?;
    if source.is_empty() {
        return Ok(SeedOutcome {
            source_week: Some(source_week),
            ..SeedOutcome::skipped(target, SeedSkip::SourceWeekHasNoLessons)
        });
    }

    let taken: HashSet<_> = existing.iter().map(LessonTemplate::slot_key).collect();
    let to_create: Vec<LessonTemplate> = source
        .into_iter()
        .filter(|t| !taken.contains(&t.slot_key()))
        .collect();
    if to_create.is_empty() {
        return Ok(SeedOutcome::skipped(target, SeedSkip::NothingToCreate));
    }

    let created = insert_copies(&mut *tx, &to_create, target).await?;
    upsert_state(&mut *tx, target, false).await?;
    tx.commit().await?;

    tracing::info!(%source_week, week_start = %target, created, "Week seeded from last saved week");
    Ok(SeedOutcome {
        seeded: true,
        reason: None,
        created: Some(created),
        source_week: Some(source_week),
        week_start: target,
    })
}
