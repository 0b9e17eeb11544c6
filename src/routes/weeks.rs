//! `/weeks` routes — saved-week flag and cloning from the last saved week.
//!
//! * `GET  /weeks?weekStart=YYYY-MM-DD` — `{ saved }`
//! * `POST /weeks`                      — set the saved flag
//! * `POST /weeks/clone`                — clone the last saved week before `toWeekStart`

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{required_week_param, week_param};
use crate::{
    errors::AppResult,
    models::Lesson,
    schedule::weeks::{self, CloneOutcome},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/weeks",       get(get_week_state).post(set_week_state))
        .route("/weeks/clone", post(clone_week))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeekQuery {
    week_start: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeekStateBody {
    week_start: Option<String>,
    #[serde(default)]
    saved:      bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloneBody {
    to_week_start: Option<String>,
    #[serde(default)]
    overwrite:     bool,
}

#[derive(Serialize)]
struct SavedResponse {
    saved: bool,
}

async fn get_week_state(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> AppResult<Json<SavedResponse>> {
    let week_start = week_param(query.week_start.as_deref())?;
    let saved = weeks::is_saved(&state.pool, week_start).await?;
    Ok(Json(SavedResponse { saved }))
}

async fn set_week_state(
    State(state): State<AppState>,
    Json(body): Json<WeekStateBody>,
) -> AppResult<Json<SavedResponse>> {
    let week_start = week_param(body.week_start.as_deref())?;
    let stored = weeks::mark_saved(&state.pool, week_start, body.saved).await?;
    Ok(Json(SavedResponse { saved: stored.saved }))
}

/// `201` with the cloned lessons, `200 []` when the target is already
/// populated, `204` when there is nothing to clone from.
async fn clone_week(
    State(state): State<AppState>,
    Json(body): Json<CloneBody>,
) -> AppResult<Response> {
    let to = required_week_param("toWeekStart", body.to_week_start.as_deref())?;

    let response = match weeks::clone_from_last_saved(&state.pool, to, body.overwrite).await? {
        CloneOutcome::NoSource => StatusCode::NO_CONTENT.into_response(),
        CloneOutcome::AlreadyPopulated => (StatusCode::OK, Json(Vec::<Lesson>::new())).into_response(),
        CloneOutcome::Cloned { lessons, .. } => (StatusCode::CREATED, Json(lessons)).into_response(),
    };
    Ok(response)
}
