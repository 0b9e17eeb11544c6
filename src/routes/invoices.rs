//! `/invoices` routes — one invoice per student and month.
//!
//! * `GET   /invoices?month=YYYY-MM` — invoices with their student, newest month first
//! * `POST  /invoices`               — create or replace the invoice for `(studentId, yearMonth)`
//! * `PATCH /invoices/{id}`          — edit amounts, notes or status

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ensure_student, students::STUDENT_COLUMNS};
use crate::{
    db::Db,
    errors::{AppError, AppResult},
    models::{Invoice, InvoiceStatus, Student},
    schedule::time,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices",      get(list_invoices).post(upsert_invoice))
        .route("/invoices/{id}", patch(update_invoice))
}

const INVOICE_COLUMNS: &str = "id, student_id, year_month, rate, adjust_min, total_min, amount, status,
     payment_method, notes, sent_at, paid_at, created_at";

#[derive(Serialize)]
struct InvoiceView {
    #[serde(flatten)]
    invoice: Invoice,
    student: Option<Student>,
}

#[derive(Deserialize)]
struct ListQuery {
    month: Option<String>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpsertInvoiceBody {
    student_id:     String,
    year_month:     String,
    #[validate(range(min = 0.0, message = "rate cannot be negative"))]
    rate:           f64,
    adjust_min:     i32,
    #[validate(range(min = 0, message = "totalMin cannot be negative"))]
    total_min:      i32,
    #[validate(range(min = 0.0, message = "amount cannot be negative"))]
    amount:         f64,
    #[serde(default = "pending")]
    status:         InvoiceStatus,
    payment_method: Option<String>,
}

fn pending() -> InvoiceStatus {
    InvoiceStatus::Pendiente
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateInvoiceBody {
    #[validate(range(min = 0.0, message = "rate cannot be negative"))]
    rate:           Option<f64>,
    adjust_min:     Option<i32>,
    #[validate(range(min = 0, message = "totalMin cannot be negative"))]
    total_min:      Option<i32>,
    #[validate(range(min = 0.0, message = "amount cannot be negative"))]
    amount:         Option<f64>,
    notes:          Option<String>,
    payment_method: Option<String>,
    status:         Option<InvoiceStatus>,
}

/// Canonical `YYYY-MM`.
fn year_month_param(raw: &str) -> AppResult<String> {
    let (year, month) = time::parse_month(raw)
        .ok_or_else(|| AppError::BadRequest("yearMonth must be YYYY-MM".into()))?;
    Ok(format!("{year:04}-{month:02}"))
}

async fn attach_students(pool: &Db, invoices: Vec<Invoice>) -> AppResult<Vec<InvoiceView>> {
    let mut ids: Vec<&str> = invoices.iter().map(|i| i.student_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id IN ({placeholders})");
    let mut query = sqlx::query_as::<_, Student>(&sql);
    for id in &ids {
        query = query.bind(*id);
    }
    let students: HashMap<String, Student> = query
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();

    Ok(invoices
        .into_iter()
        .map(|invoice| {
            let student = students.get(&invoice.student_id).cloned();
            InvoiceView { invoice, student }
        })
        .collect())
}

// ── Handlers ─────────────────────────────────────────────────

async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<InvoiceView>>> {
    let month = match query.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(raw) => Some(year_month_param(raw)?),
        None => None,
    };

    let pool = &state.pool;
    let invoices = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS}
         FROM invoices
         WHERE (? IS NULL OR year_month = ?)
         ORDER BY year_month DESC, created_at DESC"
    ))
    .bind(&month)
    .bind(&month)
    .fetch_all(pool)
    .await?;

    Ok(Json(attach_students(pool, invoices).await?))
}

/// Create or replace the month's invoice. A status of ENVIADO or PAGADO
/// stamps `sentAt`, PAGADO also stamps `paidAt`; earlier stamps are kept
/// otherwise.
async fn upsert_invoice(
    State(state): State<AppState>,
    Json(body): Json<UpsertInvoiceBody>,
) -> AppResult<Json<InvoiceView>> {
    body.validate()?;
    let year_month = year_month_param(&body.year_month)?;

    let pool = &state.pool;
    let student_id = body.student_id.trim();
    ensure_student(pool, student_id).await?;

    let now = Utc::now().naive_utc();
    let sent_at = body.status.is_sent().then_some(now);
    let paid_at = (body.status == InvoiceStatus::Pagado).then_some(now);

    sqlx::query(
        "INSERT INTO invoices
            (id, student_id, year_month, rate, adjust_min, total_min, amount, status, payment_method, sent_at, paid_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (student_id, year_month) DO UPDATE
         SET rate           = excluded.rate,
             adjust_min     = excluded.adjust_min,
             total_min      = excluded.total_min,
             amount         = excluded.amount,
             status         = excluded.status,
             payment_method = COALESCE(excluded.payment_method, invoices.payment_method),
             sent_at        = COALESCE(excluded.sent_at, invoices.sent_at),
             paid_at        = COALESCE(excluded.paid_at, invoices.paid_at)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(student_id)
    .bind(&year_month)
    .bind(body.rate)
    .bind(body.adjust_min)
    .bind(body.total_min)
    .bind(body.amount)
    .bind(body.status)
    .bind(&body.payment_method)
    .bind(sent_at)
    .bind(paid_at)
    .execute(pool)
    .await?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE student_id = ? AND year_month = ?"
    ))
    .bind(student_id)
    .bind(&year_month)
    .fetch_one(pool)
    .await?;

    tracing::info!(invoice_id = %invoice.id, %student_id, %year_month, status = ?invoice.status, "Invoice saved");
    let mut views = attach_students(pool, vec![invoice]).await?;
    views.pop().map(Json).ok_or(AppError::NotFound)
}

async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateInvoiceBody>,
) -> AppResult<Json<Invoice>> {
    body.validate()?;

    let now = Utc::now().naive_utc();
    let sent_at = body.status.filter(|s| s.is_sent()).map(|_| now);
    let paid_at = body.status.filter(|s| *s == InvoiceStatus::Pagado).map(|_| now);

    let pool = &state.pool;
    let affected = sqlx::query(
        "UPDATE invoices
         SET rate           = COALESCE(?, rate),
             adjust_min     = COALESCE(?, adjust_min),
             total_min      = COALESCE(?, total_min),
             amount         = COALESCE(?, amount),
             notes          = COALESCE(?, notes),
             payment_method = COALESCE(?, payment_method),
             status         = COALESCE(?, status),
             sent_at        = COALESCE(?, sent_at),
             paid_at        = COALESCE(?, paid_at)
         WHERE id = ?",
    )
    .bind(body.rate)
    .bind(body.adjust_min)
    .bind(body.total_min)
    .bind(body.amount)
    .bind(&body.notes)
    .bind(&body.payment_method)
    .bind(body.status)
    .bind(sent_at)
    .bind(paid_at)
    .bind(&id)
    .execute(pool)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound);
    }

    let invoice = sqlx::query_as::<_, Invoice>(&format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"))
        .bind(&id)
        .fetch_one(pool)
        .await?;

    tracing::info!(invoice_id = %id, status = ?invoice.status, "Invoice updated");
    Ok(Json(invoice))
}
