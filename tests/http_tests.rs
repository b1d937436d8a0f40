mod common;

use std::sync::atomic::Ordering;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{eventually, finish_single_set, raw_questions, wait_for, Harness};
use interview_session::{create_router, AppState, HandoffError, HandoffStore, Phase};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(harness: &Harness) -> (Router, AppState) {
    let state = AppState::new(harness.deps());
    (create_router(state.clone()), state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn create(router: &Router, state: &AppState, session_id: &str) -> Result<()> {
    let response = router
        .clone()
        .oneshot(post_json(
            "/sessions",
            json!({
                "sessionId": session_id,
                "interviewType": "tech",
                "questions": raw_questions("q", 2),
                "totalInterviewSets": 2
            }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let handle = state.session(session_id).await.expect("session registered");
    wait_for(&handle, |s| s.phase == Phase::Preparing).await;
    Ok(())
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let harness = Harness::new();
    let (router, _) = app(&harness);

    let response = router.oneshot(get("/health")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_create_and_get_session() -> Result<()> {
    let harness = Harness::new();
    let (router, state) = app(&harness);
    create(&router, &state, "s1").await?;

    let response = router.clone().oneshot(get("/sessions/s1")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await?;
    assert_eq!(body["sessionId"], "s1");
    assert_eq!(body["phase"], "preparing");
    assert_eq!(body["questionCount"], 6);
    assert_eq!(body["totalSets"], 2);
    assert_eq!(body["interviewType"], "job");

    // The record was persisted for later resumes
    assert_eq!(harness.store.read("s1")?.questions.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_create_conflicts() -> Result<()> {
    let harness = Harness::new();
    let (router, state) = app(&harness);
    create(&router, &state, "s1").await?;

    let response = router
        .oneshot(post_json("/sessions", json!({ "sessionId": "s1" })))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn test_unknown_session() -> Result<()> {
    let harness = Harness::new();
    let (router, _) = app(&harness);

    let response = router.clone().oneshot(get("/sessions/ghost")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router.oneshot(post_empty("/sessions/ghost/advance")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await?;
    assert!(body["error"].as_str().unwrap().contains("ghost"));
    Ok(())
}

#[tokio::test]
async fn test_answer_then_advance() -> Result<()> {
    let harness = Harness::new();
    let (router, state) = app(&harness);
    create(&router, &state, "s1").await?;

    let response = router.clone().oneshot(post_empty("/sessions/s1/answer")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let handle = state.session("s1").await.unwrap();
    wait_for(&handle, |s| s.phase == Phase::Answering).await;

    let response = router.oneshot(post_empty("/sessions/s1/advance")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["currentIndex"], 1);
    assert_eq!(body["phase"], "preparing");
    Ok(())
}

#[tokio::test]
async fn test_advance_while_preparing_conflicts() -> Result<()> {
    let harness = Harness::new();
    let (router, state) = app(&harness);
    create(&router, &state, "s1").await?;

    let response = router.oneshot(post_empty("/sessions/s1/advance")).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn test_set_out_of_range() -> Result<()> {
    let harness = Harness::new();
    let (router, state) = app(&harness);
    create(&router, &state, "s1").await?;

    let response = router
        .clone()
        .oneshot(post_empty("/sessions/s1/sets/9/retry"))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router.oneshot(post_empty("/sessions/s1/sets/0/advance")).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn test_resume_with_navigation_query() -> Result<()> {
    let harness = Harness::new();
    harness.seed("iv-5", 2, Some(2));
    let (router, state) = app(&harness);

    let response = router
        .clone()
        .oneshot(post_empty("/sessions/iv-5/resume?type=behavioral&count=2&step=3"))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let handle = state.session("iv-5").await.unwrap();
    let snapshot = wait_for(&handle, |s| s.phase == Phase::Preparing).await;
    assert_eq!(snapshot.current_index, 3);

    let response = router.oneshot(get("/sessions/iv-5/attempts")).await?;
    let body = body_json(response).await?;
    assert_eq!(body["attemptIds"], json!([]));
    Ok(())
}

#[tokio::test]
async fn test_create_survives_store_failure() -> Result<()> {
    let harness = Harness::new();
    harness.store.fail_writes.store(true, Ordering::SeqCst);
    let (router, state) = app(&harness);

    create(&router, &state, "s1").await?;

    let response = router.oneshot(get("/sessions/s1")).await?;
    let body = body_json(response).await?;
    assert_eq!(body["phase"], "preparing");
    assert_eq!(body["questionCount"], 6);
    assert_eq!(body["totalSets"], 2);

    // Served from the in-memory record only
    assert!(matches!(harness.store.read("s1"), Err(HandoffError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_second_session_conflicts_while_feed_is_held() -> Result<()> {
    let harness = Harness::new();
    let (router, state) = app(&harness);
    create(&router, &state, "alice").await?;

    let response = router
        .clone()
        .oneshot(post_json(
            "/sessions",
            json!({ "sessionId": "bob", "questions": raw_questions("b", 1) }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await?;
    assert!(body["error"].as_str().unwrap().contains("alice"));

    assert!(state.session("bob").await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_finished_session_leaves_registry() -> Result<()> {
    let mut harness = Harness::new();
    harness.settings.linger_secs = 0;
    harness.seed("s1", 1, Some(1));
    let (router, state) = app(&harness);

    let response = router.clone().oneshot(post_empty("/sessions/s1/resume")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let handle = state.session("s1").await.expect("session registered");
    wait_for(&handle, |s| s.phase == Phase::Preparing).await;
    finish_single_set(&handle).await;
    drop(handle);

    eventually(|| state.sessions.try_read().map_or(false, |sessions| sessions.is_empty())).await;
    assert!(harness.hub.owner().is_none());

    let response = router.oneshot(get("/sessions/s1")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
