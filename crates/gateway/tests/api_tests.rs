//! API integration tests
//!
//! Drive the full router against an in-memory database and the scripted
//! model provider.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mockview_common::{
    config::AppConfig,
    db::DbPool,
    llm::{Script, ScriptedChatFactory},
};
use mockview_gateway::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SCORED_FEEDBACK: &str = "### 总体评分：87/100 分\n逻辑清晰，对策具体。";

struct TestApp {
    app: Router,
    state: AppState,
    llm: Arc<ScriptedChatFactory>,
}

async fn setup(script: Script) -> TestApp {
    setup_with(AppConfig::for_tests(), script).await
}

async fn setup_with(config: AppConfig, script: Script) -> TestApp {
    let config = Arc::new(config);
    let db = DbPool::bootstrap(&config.database, config.import.default_max_chars)
        .await
        .expect("Failed to bootstrap test database");
    let llm = Arc::new(ScriptedChatFactory::new(script));
    let state = AppState::new(config, db, llm.clone()).expect("Failed to build state");

    TestApp {
        app: create_router(state.clone()),
        state,
        llm,
    }
}

/// Helper to make HTTP requests to the app
async fn make_request(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, value)
}

/// Read a whole SSE response into `(event, data)` pairs
async fn read_events(app: &Router, path: &str) -> (StatusCode, Vec<(String, Value)>) {
    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, parse_events(&String::from_utf8_lossy(&bytes)))
}

fn parse_events(text: &str) -> Vec<(String, Value)> {
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data = serde_json::from_str(payload.trim()).ok();
                }
            }
            Some((event?, data.unwrap_or(Value::Null)))
        })
        .collect()
}

fn multipart_upload(path: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    let boundary = "mockview-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::post(path)
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

async fn add_model(app: &Router, role: &str, name: &str) -> Value {
    let (status, body) = make_request(
        app,
        "POST",
        "/api/v1/models",
        Some(json!({
            "name": name,
            "base_url": "http://localhost:1/v1",
            "api_key": "sk-test-key-0001",
            "model_name": "deepseek-chat",
            "role": role,
            "is_active": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn add_question(app: &Router, category: &str, content: &str) -> i64 {
    let (status, body) = make_request(
        app,
        "POST",
        "/api/v1/questions",
        Some(json!({ "category": category, "content": content })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

async fn add_single_answer(app: &Router, question_id: i64) -> i64 {
    let (status, body) = make_request(
        app,
        "POST",
        "/api/v1/answers",
        Some(json!({
            "mode": "single",
            "question_id": question_id,
            "transcript": "首先要稳定情绪，其次要积极沟通。",
            "duration_seconds": 150
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_and_ready() {
    let t = setup(Script::default()).await;

    let (status, body) = make_request(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = make_request(&t.app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"]["status"], "up");
}

// ============================================================================
// Question bank
// ============================================================================

#[tokio::test]
async fn test_soft_deleted_questions_are_hidden() {
    let t = setup(Script::default()).await;
    let kept = add_question(&t.app, "综合分析", "谈谈你对躺平的看法").await;
    let removed = add_question(&t.app, "综合分析", "如何看待数字政府").await;
    let answer_id = add_single_answer(&t.app, removed).await;

    let (status, _) = make_request(&t.app, "DELETE", &format!("/api/v1/questions/{removed}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = make_request(&t.app, "GET", "/api/v1/questions?category=综合分析", None).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["id"], kept);

    let (status, _) = make_request(&t.app, "GET", &format!("/api/v1/questions/{removed}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for _ in 0..5 {
        let (status, drawn) = make_request(&t.app, "GET", "/api/v1/questions/random/single", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(drawn["id"], kept);
    }

    // historical answers still carry the question
    let (status, answer) = make_request(&t.app, "GET", &format!("/api/v1/answers/{answer_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["question"]["content"], "如何看待数字政府");
    assert_eq!(answer["question"]["is_deleted"], true);
}

#[tokio::test]
async fn test_question_listing_filters_and_bounds() {
    let t = setup(Script::default()).await;
    add_question(&t.app, "综合分析", "基层减负").await;
    add_question(&t.app, "组织协调", "组织一次调研").await;
    add_question(&t.app, "应急应变", "群众围堵").await;

    let (_, list) = make_request(&t.app, "GET", "/api/v1/questions?category=综合分析,组织协调", None).await;
    assert_eq!(list["total"], 2);

    let (_, list) = make_request(&t.app, "GET", "/api/v1/questions?keyword=调研", None).await;
    assert_eq!(list["total"], 1);

    let (status, body) = make_request(&t.app, "GET", "/api/v1/questions?page_size=101", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = make_request(
        &t.app,
        "POST",
        "/api/v1/questions/batch-delete",
        Some(json!({ "ids": [1, 2, 999] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    let (status, _) = make_request(&t.app, "GET", "/api/v1/questions/random/single?category=综合分析", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Papers
// ============================================================================

#[tokio::test]
async fn test_paper_items_keep_order() {
    let t = setup(Script::default()).await;
    let q1 = add_question(&t.app, "综合分析", "第一题").await;
    let q2 = add_question(&t.app, "组织协调", "第二题").await;
    let q3 = add_question(&t.app, "应急应变", "第三题").await;

    let (status, paper) = make_request(
        &t.app,
        "POST",
        "/api/v1/papers",
        Some(json!({ "title": "省考模拟", "time_limit_seconds": 900, "question_ids": [q2, q1] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{paper}");
    let paper_id = paper["id"].as_i64().unwrap();
    assert_eq!(paper["items"][0]["question_id"], q2);
    assert_eq!(paper["items"][1]["sort_order"], 2);

    let (status, item) = make_request(
        &t.app,
        "POST",
        &format!("/api/v1/papers/{paper_id}/items?question_id={q3}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(item["sort_order"], 3);

    let (status, body) = make_request(
        &t.app,
        "POST",
        "/api/v1/papers",
        Some(json!({ "title": "坏卷", "question_ids": [q1, 4040] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "question_ids");

    let (_, list) = make_request(&t.app, "GET", "/api/v1/papers", None).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["question_count"], 3);
}

#[tokio::test]
async fn test_deleting_paper_unlinks_answers() {
    let t = setup(Script::default()).await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let (_, paper) = make_request(
        &t.app,
        "POST",
        "/api/v1/papers",
        Some(json!({ "title": "卷", "question_ids": [q] })),
    )
    .await;
    let paper_id = paper["id"].as_i64().unwrap();

    let (status, answer) = make_request(
        &t.app,
        "POST",
        "/api/v1/answers",
        Some(json!({
            "mode": "paper",
            "question_id": q,
            "paper_id": paper_id,
            "paper_session_id": "sess-del",
            "transcript": "作答"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = make_request(&t.app, "DELETE", &format!("/api/v1/papers/{paper_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, answer) = make_request(&t.app, "GET", &format!("/api/v1/answers/{}", answer["id"]), None).await;
    assert_eq!(answer["paper_id"], Value::Null);
    assert_eq!(answer["paper_session_id"], "sess-del");

    let (status, _) = make_request(&t.app, "DELETE", &format!("/api/v1/papers/{paper_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Answers
// ============================================================================

#[tokio::test]
async fn test_answer_mode_validation() {
    let t = setup(Script::default()).await;
    let q = add_question(&t.app, "综合分析", "题目").await;

    let (status, body) = make_request(
        &t.app,
        "POST",
        "/api/v1/answers",
        Some(json!({ "mode": "paper", "question_id": q })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "paper_session_id");

    let (status, body) = make_request(
        &t.app,
        "POST",
        "/api/v1/answers",
        Some(json!({ "mode": "single", "question_id": q, "paper_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "paper_id");

    let (status, body) = make_request(
        &t.app,
        "POST",
        "/api/v1/answers",
        Some(json!({ "mode": "single", "question_id": 9999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "QUESTION_NOT_FOUND");

    let (status, body) = make_request(&t.app, "GET", "/api/v1/answers/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "ANSWER_NOT_FOUND");
}

#[tokio::test]
async fn test_background_analysis_runs_once() {
    let t = setup(Script::reply(SCORED_FEEDBACK)).await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q = add_question(&t.app, "人际关系", "同事不配合怎么办").await;
    let answer_id = add_single_answer(&t.app, q).await;

    let (status, _) = make_request(&t.app, "GET", &format!("/api/v1/answers/{answer_id}/analysis"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = make_request(&t.app, "POST", &format!("/api/v1/answers/{answer_id}/analyze"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    assert_eq!(body["answer_id"], answer_id);

    t.state.jobs.wait_idle().await;
    assert!(!t.state.answer_locks.is_locked(&(answer_id as i32)));

    let (status, analysis) = make_request(&t.app, "GET", &format!("/api/v1/answers/{answer_id}/analysis"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["score"], 87.0);
    assert_eq!(analysis["model_name"], "deepseek-chat");
    assert_eq!(analysis["feedback"], SCORED_FEEDBACK);

    let (status, body) = make_request(&t.app, "POST", &format!("/api/v1/answers/{answer_id}/analyze"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_ANALYZED");

    // the user prompt carries question, transcript and duration
    let request = &t.llm.requests()[0];
    let user = &request.messages[1].content;
    assert!(user.contains("同事不配合怎么办"));
    assert!(user.contains("首先要稳定情绪"));
    assert!(user.contains("150"));
}

#[tokio::test]
async fn test_analysis_without_model_is_client_error() {
    let t = setup(Script::reply(SCORED_FEEDBACK)).await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let answer_id = add_single_answer(&t.app, q).await;

    let (status, body) = make_request(&t.app, "POST", &format!("/api/v1/answers/{answer_id}/analyze"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "NO_ACTIVE_MODEL");

    // the permit is released with the failed request
    assert!(!t.state.answer_locks.is_locked(&(answer_id as i32)));

    let (status, _) = make_request(&t.app, "GET", &format!("/api/v1/answers/{answer_id}/analysis/stream"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_stream_relays_tokens_and_stores_result() {
    let t = setup(Script::chunks(&["### 总体评分：", "92", " 分\n表现优秀"])).await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let answer_id = add_single_answer(&t.app, q).await;

    let path = format!("/api/v1/answers/{answer_id}/analysis/stream");
    let (status, events) = read_events(&t.app, &path).await;
    assert_eq!(status, StatusCode::OK);

    let tokens: Vec<&str> = events
        .iter()
        .filter(|(e, _)| e == "token")
        .filter_map(|(_, d)| d["content"].as_str())
        .collect();
    assert_eq!(tokens, vec!["### 总体评分：", "92", " 分\n表现优秀"]);

    let (event, done) = events.last().unwrap();
    assert_eq!(event, "done");
    assert_eq!(done["score"], 92.0);
    assert_eq!(done["full_content"], "### 总体评分：92 分\n表现优秀");

    // a stored result is replayed as a single done event
    let (status, events) = read_events(&t.app, &path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "done");
    assert_eq!(events[0].1["score"], 92.0);

    assert_eq!(t.llm.requests().len(), 1);
}

#[tokio::test]
async fn test_stream_sets_no_buffering_headers() {
    let t = setup(Script::reply(SCORED_FEEDBACK)).await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let answer_id = add_single_answer(&t.app, q).await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/answers/{answer_id}/analysis/stream"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");
}

#[tokio::test]
async fn test_stream_upstream_error_discards_text() {
    let t = setup(Script {
        chunks: vec!["总体评分：".to_string()],
        error: Some("provider overloaded".to_string()),
        stall_after: None,
    })
    .await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let answer_id = add_single_answer(&t.app, q).await;

    let (status, events) = read_events(&t.app, &format!("/api/v1/answers/{answer_id}/analysis/stream")).await;
    assert_eq!(status, StatusCode::OK);

    let (event, data) = events.last().unwrap();
    assert_eq!(event, "error");
    let message = data["message"].as_str().unwrap();
    assert!(!message.is_empty());
    assert!(!message.contains("provider overloaded"));

    t.state.jobs.wait_idle().await;
    assert!(!t.state.answer_locks.is_locked(&(answer_id as i32)));

    let (status, _) = make_request(&t.app, "GET", &format!("/api/v1/answers/{answer_id}/analysis"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disconnect_saves_partial_analysis() {
    let t = setup(Script::chunks(&["总体评分：78", "，后续内容"]).stalling_after(1)).await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let answer_id = add_single_answer(&t.app, q).await;
    let path = format!("/api/v1/answers/{answer_id}/analysis/stream");

    let response = t
        .app
        .clone()
        .oneshot(Request::get(&path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let first = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(first.contains("event: token"), "{first}");

    // a second stream for the same answer is refused while the first is open
    assert!(t.state.answer_locks.is_locked(&(answer_id as i32)));
    let (status, body_json) = make_request(&t.app, "GET", &path, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body_json["error"]["code"], "ANALYSIS_IN_PROGRESS");

    // client goes away
    drop(body);
    t.state.jobs.wait_idle().await;
    assert!(!t.state.answer_locks.is_locked(&(answer_id as i32)));

    let (status, analysis) = make_request(&t.app, "GET", &format!("/api/v1/answers/{answer_id}/analysis"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["feedback"], "总体评分：78");
    assert_eq!(analysis["score"], 78.0);

    // the next stream request succeeds
    let (status, events) = read_events(&t.app, &path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events[0].0, "done");
}

#[tokio::test]
async fn test_disconnect_during_final_store_keeps_full_text() {
    let t = setup(Script::chunks(&["总体评分：88", "，完整点评"])).await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let answer_id = add_single_answer(&t.app, q).await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/answers/{answer_id}/analysis/stream"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let mut body = response.into_body();

    let mut received = String::new();
    while received.matches("event: token").count() < 2 {
        let frame = body.frame().await.unwrap().unwrap();
        received.push_str(&String::from_utf8_lossy(&frame.into_data().unwrap()));
    }

    // start the store, then go away before it reports back
    let _ = futures::FutureExt::now_or_never(body.frame());
    drop(body);
    t.state.jobs.wait_idle().await;

    let (status, analysis) = make_request(&t.app, "GET", &format!("/api/v1/answers/{answer_id}/analysis"), None).await;
    assert_eq!(status, StatusCode::OK, "{analysis}");
    assert_eq!(analysis["feedback"], "总体评分：88，完整点评");
    assert_eq!(analysis["score"], 88.0);
    assert!(!t.state.answer_locks.is_locked(&(answer_id as i32)));
}

#[tokio::test]
async fn test_moving_active_model_keeps_one_active_per_role() {
    let t = setup(Script::default()).await;
    let moved = add_model(&t.app, "analyze", "分析模型").await;
    let import = add_model(&t.app, "import", "导入模型").await;

    let (status, body) = make_request(
        &t.app,
        "PUT",
        &format!("/api/v1/models/{}", moved["id"]),
        Some(json!({ "role": "import" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["is_active"], true);

    let (_, list) = make_request(&t.app, "GET", "/api/v1/models?role=import", None).await;
    let active: Vec<&Value> = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["is_active"] == true)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], moved["id"]);
    assert_ne!(active[0]["id"], import["id"]);
}

// ============================================================================
// History and paper analysis
// ============================================================================

#[tokio::test]
async fn test_history_and_paper_analysis() {
    let t = setup(Script::reply("整体进步明显")).await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q1 = add_question(&t.app, "综合分析", "第一题").await;
    let q2 = add_question(&t.app, "组织协调", "第二题").await;
    let (_, paper) = make_request(
        &t.app,
        "POST",
        "/api/v1/papers",
        Some(json!({ "title": "模拟卷", "question_ids": [q1, q2] })),
    )
    .await;

    let mut answer_ids = Vec::new();
    for (q, secs) in [(q1, 120), (q2, 180)] {
        let (status, answer) = make_request(
            &t.app,
            "POST",
            "/api/v1/answers",
            Some(json!({
                "mode": "paper",
                "question_id": q,
                "paper_id": paper["id"],
                "paper_session_id": "sess-42",
                "transcript": "作答内容",
                "duration_seconds": secs
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        answer_ids.push(answer["id"].clone());
    }

    let (status, body) = make_request(
        &t.app,
        "POST",
        "/api/v1/answers/history-analyze",
        Some(json!({ "answer_ids": answer_ids, "analysis_type": "history_paper" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["feedback"], "整体进步明显");

    let (status, _) = make_request(
        &t.app,
        "POST",
        "/api/v1/answers/history-analyze",
        Some(json!({ "answer_ids": answer_ids, "analysis_type": "weekly" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = make_request(
        &t.app,
        "POST",
        "/api/v1/answers/paper-analyze",
        Some(json!({ "paper_session_id": "sess-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_name"], "deepseek-chat");

    let llm_requests = t.llm.requests();
    let paper_prompt = &llm_requests.last().unwrap().messages[1].content;
    assert!(paper_prompt.contains("第一题"));
    assert!(paper_prompt.contains("300"));

    let (status, events) = read_events(&t.app, "/api/v1/answers/paper-analyze/stream/sess-42").await;
    assert_eq!(status, StatusCode::OK);
    let (event, done) = events.last().unwrap();
    assert_eq!(event, "done");
    assert_eq!(done["full_content"], "整体进步明显");
    assert!(!t.state.session_locks.is_locked(&"sess-42".to_string()));

    let (status, _) = make_request(&t.app, "GET", "/api/v1/answers/paper-analyze/stream/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // paper analyses are not stored
    let (status, _) = make_request(&t.app, "GET", &format!("/api/v1/answers/{}/analysis", answer_ids[0]), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, history) = make_request(&t.app, "GET", "/api/v1/history/paper", None).await;
    assert_eq!(history["total"], 2);
    let sessions = &history["groups"][0]["sessions"];
    assert_eq!(sessions[0]["paper_session_id"], "sess-42");
    assert_eq!(sessions[0]["total_seconds"], 300);
    assert_eq!(sessions[0]["answers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_single_history_and_trends() {
    let t = setup(Script::reply(SCORED_FEEDBACK)).await;
    add_model(&t.app, "analyze", "分析模型").await;
    let q = add_question(&t.app, "综合分析", "题目").await;
    let first = add_single_answer(&t.app, q).await;
    add_single_answer(&t.app, q).await;

    make_request(&t.app, "POST", &format!("/api/v1/answers/{first}/analyze"), None).await;
    t.state.jobs.wait_idle().await;

    let (status, history) = make_request(&t.app, "GET", "/api/v1/history/single", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 2);
    assert_eq!(history["groups"].as_array().unwrap().len(), 1);
    assert_eq!(history["groups"][0]["items"].as_array().unwrap().len(), 2);

    let (status, trends) = make_request(&t.app, "GET", "/api/v1/history/trends?mode=single&days=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trends["points"].as_array().unwrap().len(), 1);
    assert_eq!(trends["points"][0]["avg_score"], 87.0);
    assert_eq!(trends["points"][0]["count"], 1);

    let (status, _) = make_request(&t.app, "GET", "/api/v1/history/trends?days=6", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = make_request(&t.app, "GET", "/api/v1/history/trends?days=91", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Settings: models, prompts, speech
// ============================================================================

#[tokio::test]
async fn test_model_activation_is_exclusive_per_role() {
    let t = setup(Script::default()).await;
    let first = add_model(&t.app, "analyze", "模型一").await;
    let second = add_model(&t.app, "analyze", "模型二").await;
    let import = add_model(&t.app, "import", "导入模型").await;

    assert_eq!(first["api_key"], "sk-...0001");

    let (_, list) = make_request(&t.app, "GET", "/api/v1/models?role=analyze", None).await;
    let active: Vec<&Value> = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["is_active"] == true)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], second["id"]);

    let (status, _) = make_request(&t.app, "POST", &format!("/api/v1/models/{}/activate", first["id"]), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = make_request(&t.app, "GET", "/api/v1/models", None).await;
    for model in list.as_array().unwrap() {
        let expected = model["id"] == first["id"] || model["id"] == import["id"];
        assert_eq!(model["is_active"], expected, "{model}");
    }

    // a masked key in an update leaves the stored key alone
    let (status, updated) = make_request(
        &t.app,
        "PUT",
        &format!("/api/v1/models/{}", first["id"]),
        Some(json!({ "api_key": "sk-...0001", "name": "改名" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "改名");
    assert_eq!(updated["api_key"], "sk-...0001");

    let (status, body) = make_request(&t.app, "GET", "/api/v1/models?role=chat", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn test_prompts_are_seeded_and_editable() {
    let t = setup(Script::default()).await;

    let (_, prompts) = make_request(&t.app, "GET", "/api/v1/prompts", None).await;
    assert_eq!(prompts.as_array().unwrap().len(), 6);

    let id = prompts[0]["id"].clone();
    let (status, updated) = make_request(
        &t.app,
        "PUT",
        &format!("/api/v1/prompts/{id}"),
        Some(json!({ "content": "题目：{question}" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "题目：{question}");

    let (status, _) = make_request(&t.app, "GET", "/api/v1/prompts/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_speech_config_masks_key() {
    let t = setup(Script::default()).await;

    let (_, config) = make_request(&t.app, "GET", "/api/v1/speech/config", None).await;
    assert_eq!(config["provider"], "web_speech");

    let response = t
        .app
        .clone()
        .oneshot(multipart_upload("/api/v1/speech/transcribe", "a.webm", b"RIFF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, config) = make_request(
        &t.app,
        "PUT",
        "/api/v1/speech/config",
        Some(json!({
            "provider": "whisper",
            "whisper_api_url": "https://speech.example.com/v1",
            "whisper_api_key": "sk-whisper-secret"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{config}");
    assert_eq!(config["whisper_api_key"], "***");

    // echoing the mask keeps the key
    make_request(
        &t.app,
        "PUT",
        "/api/v1/speech/config",
        Some(json!({ "whisper_api_key": "***" })),
    )
    .await;
    let stored = t.state.repo().find_speech_config().await.unwrap().unwrap();
    assert_eq!(stored.whisper_api_key.as_deref(), Some("sk-whisper-secret"));

    let (status, _) = make_request(
        &t.app,
        "PUT",
        "/api/v1/speech/config",
        Some(json!({ "provider": "dictaphone" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Import
// ============================================================================

#[tokio::test]
async fn test_text_import_runs_in_background() {
    let t = setup(Script::reply(r#"[{"category": "综合分析", "content": "谈谈乡村振兴"}]"#)).await;
    add_model(&t.app, "import", "导入模型").await;

    let (status, accepted) = make_request(
        &t.app,
        "POST",
        "/api/v1/import/text",
        Some(json!({ "text": "1. 谈谈乡村振兴", "import_type": "single" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{accepted}");
    let import_id = accepted["import_id"].clone();

    t.state.jobs.wait_idle().await;

    let (status, task) = make_request(&t.app, "GET", &format!("/api/v1/import/status/{import_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "success");
    assert_eq!(task["result_summary"], "成功导入 1 道题目");
    assert!(task.get("raw_text").is_none());

    let (_, questions) = make_request(&t.app, "GET", "/api/v1/questions", None).await;
    assert_eq!(questions["items"][0]["source"], "import");

    let (_, history) = make_request(&t.app, "GET", "/api/v1/import/history", None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, _) = make_request(&t.app, "GET", "/api/v1/import/status/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_import_without_model_marks_task_failed() {
    let t = setup(Script::reply("[]")).await;

    let (status, accepted) = make_request(
        &t.app,
        "POST",
        "/api/v1/import/text",
        Some(json!({ "text": "试卷正文", "import_type": "paper" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    t.state.jobs.wait_idle().await;
    let (_, task) = make_request(
        &t.app,
        "GET",
        &format!("/api/v1/import/status/{}", accepted["import_id"]),
        None,
    )
    .await;
    assert_eq!(task["status"], "failed");
    assert!(task["error_message"].as_str().is_some());
}

#[tokio::test]
async fn test_upload_import_checks_file_type() {
    let t = setup(Script::reply(r#"{"paper_title": "卷一", "questions": [{"content": "题"}]}"#)).await;
    add_model(&t.app, "import", "导入模型").await;

    let response = t
        .app
        .clone()
        .oneshot(multipart_upload("/api/v1/import/paper", "paper.docx", b"PK"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = t
        .app
        .clone()
        .oneshot(multipart_upload("/api/v1/import/paper", "paper.txt", "一、自我介绍".as_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    t.state.jobs.wait_idle().await;
    let (_, papers) = make_request(&t.app, "GET", "/api/v1/papers", None).await;
    assert_eq!(papers["items"][0]["title"], "卷一");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_with_json_error() {
    let mut config = AppConfig::for_tests();
    config.server.max_upload_bytes = 1024;
    let t = setup_with(config, Script::default()).await;

    let response = t
        .app
        .clone()
        .oneshot(multipart_upload("/api/v1/import/single", "big.txt", &[b'a'; 4096]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_import_settings_range() {
    let t = setup(Script::default()).await;

    let (status, settings) = make_request(&t.app, "GET", "/api/v1/import/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(settings["max_import_chars"].as_u64().unwrap() >= 1000);

    let (status, _) = make_request(
        &t.app,
        "PUT",
        "/api/v1/import/settings",
        Some(json!({ "max_import_chars": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &t.app,
        "PUT",
        "/api/v1/import/settings",
        Some(json!({ "max_import_chars": 12000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, settings) = make_request(&t.app, "GET", "/api/v1/import/settings", None).await;
    assert_eq!(settings["max_import_chars"], 12000);
}
