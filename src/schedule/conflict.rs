//! Overlap detection for candidate lesson slots.
//!
//! Two checks run against a candidate: the slot guard, which blocks a
//! student from holding two lessons at the same (day, start) in one week,
//! and the conflict scan, which only reports the first overlapping
//! extracurricular or lesson so the caller can warn about it.

use chrono::NaiveDate;
use sqlx::SqliteConnection;

use crate::{
    errors::AppResult,
    models::{ConflictDescriptor, ConflictKind, Extracurricular, Lesson},
};

/// Half-open overlap of `[a_start, a_start + a_dur)` and `[b_start, b_start + b_dur)`.
/// Back-to-back intervals do not overlap.
pub fn overlaps(a_start: i32, a_dur: i32, b_start: i32, b_dur: i32) -> bool {
    let (a_start, a_dur, b_start, b_dur) =
        (i64::from(a_start), i64::from(a_dur), i64::from(b_start), i64::from(b_dur));
    a_start < b_start + b_dur && b_start < a_start + a_dur
}

/// A weekly slot being placed for a student.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub student_id:  &'a str,
    pub day_of_week: i32,
    pub start_min:   i32,
    pub dur_min:     i32,
    pub week_start:  NaiveDate,
    /// The lesson being moved, which must not collide with itself.
    pub exclude_id:  Option<&'a str>,
}

trait Occupies {
    fn span(&self) -> (i32, i32);
    fn describe(&self) -> ConflictDescriptor;
}

impl Occupies for Extracurricular {
    fn span(&self) -> (i32, i32) {
        (self.start_min, self.dur_min)
    }

    fn describe(&self) -> ConflictDescriptor {
        ConflictDescriptor {
            kind:        ConflictKind::Extracurricular,
            id:          self.id.clone(),
            label:       self.label.clone(),
            day_of_week: self.day_of_week,
            start_min:   self.start_min,
            dur_min:     self.dur_min,
        }
    }
}

// Lessons collide on their planned slot; actual times are a record of what
// happened, not a booking.
impl Occupies for Lesson {
    fn span(&self) -> (i32, i32) {
        (self.start_min, self.dur_min)
    }

    fn describe(&self) -> ConflictDescriptor {
        ConflictDescriptor {
            kind:        ConflictKind::Lesson,
            id:          self.id.clone(),
            label:       self.teacher.to_string(),
            day_of_week: self.day_of_week,
            start_min:   self.start_min,
            dur_min:     self.dur_min,
        }
    }
}

fn first_overlap<T: Occupies>(items: &[T], start_min: i32, dur_min: i32) -> Option<ConflictDescriptor> {
    items
        .iter()
        .find(|item| {
            let (s, d) = item.span();
            overlaps(start_min, dur_min, s, d)
        })
        .map(Occupies::describe)
}

/// First extracurricular, then first same-week lesson of the student that
/// overlaps the candidate on its weekday.
pub async fn check_conflict(
    conn: &mut SqliteConnection,
    candidate: &Candidate<'_>,
) -> AppResult<Option<ConflictDescriptor>> {
    let extras: Vec<Extracurricular> = sqlx::query_as::<_, Extracurricular>(
        "SELECT id, student_id, label, day_of_week, start_min, dur_min
         FROM extracurriculars
         WHERE student_id = ? AND day_of_week = ?",
    )
    .bind(candidate.student_id)
    .bind(candidate.day_of_week)
    .fetch_all(&mut *conn)
    .await?;

    if let Some(hit) = first_overlap(&extras, candidate.start_min, candidate.dur_min) {
        return Ok(Some(hit));
    }

    let lessons: Vec<Lesson> = sqlx::query_as::<_, Lesson>(
        "SELECT id, student_id, teacher, day_of_week, start_min, dur_min,
                actual_start_min, actual_dur_min, week_start
         FROM lessons
         WHERE student_id = ?
           AND day_of_week = ?
           AND week_start = ?
           AND id <> COALESCE(?, '')",
    )
    .bind(candidate.student_id)
    .bind(candidate.day_of_week)
    .bind(candidate.week_start)
    .bind(candidate.exclude_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(first_overlap(&lessons, candidate.start_min, candidate.dur_min))
}

/// Whether the student already holds a lesson at this (day, start) in the
/// candidate's week, whichever teacher gives it.
pub async fn has_duplicate_slot(
    conn: &mut SqliteConnection,
    candidate: &Candidate<'_>,
) -> AppResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM lessons
            WHERE student_id = ?
              AND day_of_week = ?
              AND start_min = ?
              AND week_start = ?
              AND id <> COALESCE(?, '')
         )",
    )
    .bind(candidate.student_id)
    .bind(candidate.day_of_week)
    .bind(candidate.start_min)
    .bind(candidate.week_start)
    .bind(candidate.exclude_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}
