use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ── Teachers ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Teacher {
    Nuria,
    Santi,
}

impl std::fmt::Display for Teacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self { Teacher::Nuria => "NURIA", Teacher::Santi => "SANTI" };
        write!(f, "{s}")
    }
}

// ── Students ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id:              String,
    pub full_name:       String,
    pub phone:           Option<String>,
    pub address:         Option<String>,
    pub guardian_name:   Option<String>,
    pub guardian_phone:  Option<String>,
    pub school:          Option<String>,
    pub course:          Option<String>,
    pub specialty:       Option<String>,
    pub referral_source: Option<String>,
    pub desired_hours:   Option<f64>,
    pub session_minutes: Option<i32>,
    pub hourly_rate:     Option<f64>,
    pub notes:           Option<String>,
    pub created_at:      NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Extracurricular {
    pub id:          String,
    pub student_id:  String,
    pub label:       String,
    pub day_of_week: i32, // 1=Mon … 7=Sun
    pub start_min:   i32,
    pub dur_min:     i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SchoolBlock {
    pub id:         String,
    pub student_id: String,
    pub from_day:   i32,
    pub to_day:     i32,
    pub start_min:  i32,
    pub end_min:    i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id:         String,
    pub student_id: String,
    pub name:       String,
}

// ── Lessons ──────────────────────────────────────────────────

/// One lesson instance, scoped to the week starting at `week_start`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id:               String,
    pub student_id:       String,
    pub teacher:          Teacher,
    pub day_of_week:      i32,
    pub start_min:        i32,
    pub dur_min:          i32,
    pub actual_start_min: Option<i32>,
    pub actual_dur_min:   Option<i32>,
    pub week_start:       NaiveDate,
}

// ── Week states ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WeekState {
    pub week_start: NaiveDate,
    pub saved:      bool,
}

// ── Invoices ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Pendiente,
    Enviado,
    Pagado,
}

impl InvoiceStatus {
    /// ENVIADO and PAGADO both mean the invoice has gone out.
    pub fn is_sent(self) -> bool {
        matches!(self, InvoiceStatus::Enviado | InvoiceStatus::Pagado)
    }
}

/// One invoice per student and `YYYY-MM` month.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id:             String,
    pub student_id:     String,
    pub year_month:     String,
    pub rate:           f64,
    pub adjust_min:     i32,
    pub total_min:      i32,
    pub amount:         f64,
    pub status:         InvoiceStatus,
    pub payment_method: Option<String>,
    pub notes:          Option<String>,
    pub sent_at:        Option<NaiveDateTime>,
    pub paid_at:        Option<NaiveDateTime>,
    pub created_at:     NaiveDateTime,
}

// ── Timetable sends ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SendStatus {
    Enviado,
    Pendiente,
}

/// Whether a student's timetable for a week has been sent to them.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSend {
    pub id:         String,
    pub student_id: String,
    pub week_start: NaiveDate,
    pub status:     SendStatus,
    pub sent_at:    Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

// ── Conflicts ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    Extracurricular,
    Lesson,
}

/// Advisory overlap found next to a committed lesson. Never blocks a write.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDescriptor {
    pub kind:        ConflictKind,
    pub id:          String,
    pub label:       String,
    pub day_of_week: i32,
    pub start_min:   i32,
    pub dur_min:     i32,
}
