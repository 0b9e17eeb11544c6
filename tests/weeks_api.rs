mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

const WEEK: &str = "2025-01-06";
const NEXT_WEEK: &str = "2025-01-13";

fn lessons_of(body: &Value) -> &Vec<Value> {
    body.as_array().expect("lesson array")
}

#[tokio::test]
async fn saved_flag_round_trips_both_ways() {
    let app = common::spawn().await;

    let (status, body) = app.get(&format!("/api/weeks?weekStart={WEEK}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "saved": false }));

    // any date in the week addresses the same state
    let (_, body) = app.post("/api/weeks", json!({ "weekStart": "2025-01-08", "saved": true })).await;
    assert_eq!(body, json!({ "saved": true }));
    assert_eq!(app.get(&format!("/api/weeks?weekStart={WEEK}")).await.1, json!({ "saved": true }));

    let (_, body) = app.post("/api/weeks", json!({ "weekStart": WEEK, "saved": false })).await;
    assert_eq!(body, json!({ "saved": false }));
    assert_eq!(app.get(&format!("/api/weeks?weekStart={WEEK}")).await.1, json!({ "saved": false }));
}

#[tokio::test]
async fn seed_from_last_saved_week() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;
    let bruno = app.student("Bruno", json!([])).await;

    let (_, lesson) = app.book(&ana, "NURIA", 1, 1020, 60, WEEK).await;
    app.book(&bruno, "SANTI", 3, 960, 90, WEEK).await;
    app.put(
        &format!("/api/lessons/{}/actual", lesson["id"].as_str().unwrap()),
        json!({ "presetMinutes": 45 }),
    )
    .await;
    app.post("/api/weeks", json!({ "weekStart": WEEK, "saved": true })).await;

    let (status, body) = app.post("/api/lessons/seed-from-last", json!({ "weekStart": NEXT_WEEK })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "seeded": true, "created": 2, "sourceWeek": WEEK, "weekStart": NEXT_WEEK })
    );

    let (_, seeded) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    let seeded = lessons_of(&seeded);
    assert_eq!(seeded.len(), 2);
    for l in seeded {
        assert!(l["actualStartMin"].is_null());
        assert!(l["actualDurMin"].is_null());
    }
    assert_eq!(seeded[0]["teacher"], "NURIA");
    assert_eq!(seeded[1]["durMin"], 90);

    // the seeded week starts out unsaved
    assert_eq!(app.get(&format!("/api/weeks?weekStart={NEXT_WEEK}")).await.1, json!({ "saved": false }));

    // a second seed is a no-op
    let (_, body) = app.post("/api/lessons/seed-from-last", json!({ "weekStart": NEXT_WEEK })).await;
    assert_eq!(body, json!({ "seeded": false, "reason": "already-has-lessons", "weekStart": NEXT_WEEK }));
    let (_, after) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    assert_eq!(lessons_of(&after).len(), 2);
}

#[tokio::test]
async fn seed_uses_the_most_recent_saved_week_only() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;

    app.book(&ana, "NURIA", 1, 540, 60, "2024-12-23").await;
    app.book(&ana, "SANTI", 2, 600, 60, "2024-12-30").await;
    app.book(&ana, "NURIA", 5, 900, 60, WEEK).await;
    app.post("/api/weeks", json!({ "weekStart": "2024-12-23", "saved": true })).await;
    app.post("/api/weeks", json!({ "weekStart": "2024-12-30", "saved": true })).await;
    // saved but not before the target
    app.post("/api/weeks", json!({ "weekStart": NEXT_WEEK, "saved": true })).await;

    let (_, body) = app.post("/api/lessons/seed-from-last", json!({ "weekStart": "2025-01-20" })).await;
    assert_eq!(body["sourceWeek"], NEXT_WEEK);
    assert_eq!(body["reason"], "source-week-has-no-lessons");
    assert_eq!(body["seeded"], false);

    app.post("/api/weeks", json!({ "weekStart": NEXT_WEEK, "saved": false })).await;
    let (_, body) = app.post("/api/lessons/seed-from-last", json!({ "weekStart": "2025-01-20" })).await;
    assert_eq!(body["seeded"], true);
    assert_eq!(body["sourceWeek"], "2024-12-30");
    assert_eq!(body["created"], 1);
}

#[tokio::test]
async fn seed_without_saved_history() {
    let app = common::spawn().await;
    let (_, body) = app.post("/api/lessons/seed-from-last", json!({ "weekStart": WEEK })).await;
    assert_eq!(body, json!({ "seeded": false, "reason": "no-previous-saved-week", "weekStart": WEEK }));

    let (status, _) = app.post("/api/lessons/seed-from-last", json!({ "weekStart": "soon" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.post("/api/lessons/seed-from-last", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn seed_with_overwrite_fills_only_free_slots() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;

    app.book(&ana, "NURIA", 1, 540, 60, WEEK).await;
    app.book(&ana, "NURIA", 2, 540, 60, WEEK).await;
    app.post("/api/weeks", json!({ "weekStart": WEEK, "saved": true })).await;

    // same slot with the other teacher is already there
    app.book(&ana, "SANTI", 1, 540, 60, NEXT_WEEK).await;

    let (_, body) = app
        .post("/api/lessons/seed-from-last", json!({ "weekStart": NEXT_WEEK, "overwrite": true }))
        .await;
    assert_eq!(body["seeded"], true);
    assert_eq!(body["created"], 1);

    let (_, week) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    let week = lessons_of(&week);
    assert_eq!(week.len(), 2);
    assert_eq!(week[0]["teacher"], "SANTI");
    assert_eq!(week[1]["dayOfWeek"], 2);

    let (_, body) = app
        .post("/api/lessons/seed-from-last", json!({ "weekStart": NEXT_WEEK, "overwrite": true }))
        .await;
    assert_eq!(body["reason"], "nothing-to-create");
}

#[tokio::test]
async fn clone_to_next_replaces_the_following_week() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;
    let bruno = app.student("Bruno", json!([])).await;

    let (_, lesson) = app.book(&ana, "NURIA", 1, 1020, 60, WEEK).await;
    app.book(&bruno, "SANTI", 2, 960, 60, WEEK).await;
    app.put(
        &format!("/api/lessons/{}/actual", lesson["id"].as_str().unwrap()),
        json!({ "startClock": "17:10", "endClock": "18:00" }),
    )
    .await;

    // stale content in the destination goes away
    app.book(&bruno, "NURIA", 4, 600, 60, NEXT_WEEK).await;
    app.post("/api/weeks", json!({ "weekStart": NEXT_WEEK, "saved": true })).await;

    let (status, body) = app.post("/api/lessons/clone-to-next", json!({ "weekStart": "2025-01-07" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "cloned": 2 }));

    let (_, next) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    let next = lessons_of(&next);
    let slots: Vec<(i64, i64)> = next
        .iter()
        .map(|l| (l["dayOfWeek"].as_i64().unwrap(), l["startMin"].as_i64().unwrap()))
        .collect();
    assert_eq!(slots, vec![(1, 1020), (2, 960)]);
    assert!(next.iter().all(|l| l["actualStartMin"].is_null() && l["actualDurMin"].is_null()));
    assert_ne!(next[0]["id"], lesson["id"]);

    assert_eq!(app.get(&format!("/api/weeks?weekStart={NEXT_WEEK}")).await.1, json!({ "saved": false }));

    // the source week keeps its actual times
    let (_, source) = app.get(&format!("/api/lessons?weekStart={WEEK}")).await;
    assert_eq!(source[0]["actualDurMin"], 50);
}

#[tokio::test]
async fn clone_to_next_from_empty_week_changes_nothing() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;
    app.book(&ana, "NURIA", 1, 540, 60, NEXT_WEEK).await;

    let (_, body) = app.post("/api/lessons/clone-to-next", json!({ "weekStart": WEEK })).await;
    assert_eq!(body, json!({ "ok": true, "cloned": 0 }));

    let (_, next) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    assert_eq!(lessons_of(&next).len(), 1);
}

#[tokio::test]
async fn week_clone_endpoint_outcomes() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;

    // nothing saved yet
    let (status, _) = app.post("/api/weeks/clone", json!({ "toWeekStart": NEXT_WEEK })).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, lesson) = app.book(&ana, "NURIA", 1, 540, 60, WEEK).await;
    app.put(
        &format!("/api/lessons/{}", lesson["id"].as_str().unwrap()),
        json!({ "actualStartMin": 550, "actualDurMin": 40 }),
    )
    .await;
    app.post("/api/weeks", json!({ "weekStart": WEEK, "saved": true })).await;

    let (status, body) = app.post("/api/weeks/clone", json!({ "toWeekStart": NEXT_WEEK })).await;
    assert_eq!(status, StatusCode::CREATED);
    let cloned = lessons_of(&body);
    assert_eq!(cloned.len(), 1);
    assert_eq!(cloned[0]["weekStart"], NEXT_WEEK);
    assert!(cloned[0]["actualStartMin"].is_null());
    assert!(cloned[0]["actualDurMin"].is_null());

    // populated destination: left alone
    let (status, body) = app.post("/api/weeks/clone", json!({ "toWeekStart": NEXT_WEEK })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    let (_, next) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    assert_eq!(lessons_of(&next).len(), 1);

    // explicit overwrite clears first, so nothing is duplicated
    app.book(&ana, "SANTI", 5, 900, 60, NEXT_WEEK).await;
    let (status, body) = app
        .post("/api/weeks/clone", json!({ "toWeekStart": NEXT_WEEK, "overwrite": true }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lessons_of(&body).len(), 1);
    let (_, next) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    assert_eq!(lessons_of(&next).len(), 1);
    assert_eq!(next[0]["dayOfWeek"], 1);
}

#[tokio::test]
async fn failed_clone_leaves_destination_intact() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;
    let bruno = app.student("Bruno", json!([])).await;

    app.book(&ana, "NURIA", 1, 540, 60, WEEK).await;
    app.book(&bruno, "NURIA", 2, 540, 60, WEEK).await;
    app.book(&ana, "SANTI", 3, 600, 60, NEXT_WEEK).await;

    // Abort the second copy half-way through the clone.
    sqlx::query(
        "CREATE TRIGGER abort_clone BEFORE INSERT ON lessons
         WHEN NEW.week_start = '2025-01-13' AND NEW.day_of_week = 2
         BEGIN SELECT RAISE(ABORT, 'simulated failure'); END",
    )
    .execute(&app.pool)
    .await
    .unwrap();

    let (status, body) = app.post("/api/lessons/clone-to-next", json!({ "weekStart": WEEK })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "server error" }));

    let (_, next) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    let next = lessons_of(&next);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0]["teacher"], "SANTI");
    assert_eq!(next[0]["dayOfWeek"], 3);
}

#[tokio::test]
async fn week_clone_checks_and_rewrites_the_target_in_one_transaction() {
    let app = common::spawn().await;
    let ana = app.student("Ana", json!([])).await;
    let bruno = app.student("Bruno", json!([])).await;

    app.book(&ana, "NURIA", 1, 540, 60, WEEK).await;
    app.post("/api/weeks", json!({ "weekStart": WEEK, "saved": true })).await;
    app.book(&bruno, "SANTI", 4, 600, 60, NEXT_WEEK).await;

    // Fail the last step, after the target has been emptied and refilled.
    sqlx::query(
        "CREATE TRIGGER abort_week_state BEFORE INSERT ON week_states
         WHEN NEW.week_start = '2025-01-13'
         BEGIN SELECT RAISE(ABORT, 'simulated failure'); END",
    )
    .execute(&app.pool)
    .await
    .unwrap();

    let (status, _) = app
        .post("/api/weeks/clone", json!({ "toWeekStart": NEXT_WEEK, "overwrite": true }))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, next) = app.get(&format!("/api/lessons?weekStart={NEXT_WEEK}")).await;
    let next = lessons_of(&next);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0]["studentId"], bruno.as_str());

    // without overwrite the populated target is reported and left alone
    let (status, body) = app.post("/api/weeks/clone", json!({ "toWeekStart": NEXT_WEEK })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}
