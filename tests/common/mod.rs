#![allow(dead_code)]

use academy_backend::{config::Config, db, db::Db, state::AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub pool:   Db,
}

pub async fn spawn() -> TestApp {
    let pool = db::connect_in_memory().await.expect("in-memory db");
    db::run_migrations(&pool).await.expect("migrations");
    let state = AppState { pool: pool.clone(), config: Config::default() };
    TestApp { router: academy_backend::app(state), pool }
}

impl TestApp {
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            // axum's own extractor rejections come back as plain text
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, None).await
    }

    /// Create a student with the given extracurriculars and return its id.
    pub async fn student(&self, name: &str, extras: Value) -> String {
        let (status, body) = self
            .post("/api/students", json!({ "fullName": name, "extras": extras }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().expect("student id").to_string()
    }

    /// Book a lesson and return the raw response.
    pub async fn book(
        &self,
        student_id: &str,
        teacher: &str,
        day: i32,
        start: i32,
        dur: i32,
        week: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/api/lessons",
            json!({
                "studentId": student_id,
                "teacher": teacher,
                "dayOfWeek": day,
                "startMin": start,
                "durMin": dur,
                "weekStart": week,
            }),
        )
        .await
    }
}
