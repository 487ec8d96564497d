//! HTTP client integration tests
//!
//! Runs `ApiClient` and the HTTP stream adapter against an in-process axum
//! server speaking the platform's API conventions.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use skill_compose::client::auth::{LoginResponse, UserInfo};
use skill_compose::client::scheduler::NewScheduledTask;
use skill_compose::{
    AdapterStatusPoller, ApiClient, ApiResponseMode, ChatEndpoint, ChatEngine, ChatStore,
    ChatSurface, ClientConfig, ClientError, HttpStreamAdapter, MemorySessionStore,
    MessageAdapter, ScheduleType, SessionSlot, TurnPhase,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    refreshes: AtomicUsize,
}

type Shared = Arc<Counters>;

async fn serve(router: Router) -> ApiClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    ApiClient::new(&ClientConfig::new(format!("http://{}", addr))).unwrap()
}

fn sse_frame(event: Value) -> String {
    format!("data: {}\n\n", event)
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn login(access: &str) -> LoginResponse {
    LoginResponse {
        access_token: access.to_string(),
        refresh_token: "refresh-1".to_string(),
        user: UserInfo {
            id: "u1".to_string(),
            username: "admin".to_string(),
            display_name: None,
            role: "admin".to_string(),
            is_active: true,
            created_at: None,
        },
        must_change_password: false,
    }
}

// ─── Chat stream ─────────────────────────────────────────────────

async fn chat_stream(Path(agent_id): Path<String>, Json(body): Json<Value>) -> Response {
    assert_eq!(agent_id, "agent-1");
    let request = body["request"].as_str().unwrap_or_default().to_string();
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();

    let frames = [
        sse_frame(json!({"event_type": "run_started", "trace_id": "tr-1", "session_id": session_id})),
        sse_frame(json!({"event_type": "tool_call", "turn": 1, "tool_name": "echo", "tool_input": {}})),
        sse_frame(json!({"event_type": "text_delta", "text": "You said: "})),
        sse_frame(json!({"event_type": "text_delta", "text": request})),
        ": keep-alive\n\n".to_string(),
        sse_frame(json!({"event_type": "complete", "success": true, "total_turns": 1})),
    ]
    .concat();

    // Split mid-frame to exercise buffering
    let (a, b) = frames.split_at(frames.len() / 2);
    let chunks: Vec<Result<String, std::io::Error>> = vec![Ok(a.to_string()), Ok(b.to_string())];
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}

async fn missing_session() -> Response {
    detail(StatusCode::NOT_FOUND, "Session not found")
}

#[tokio::test]
async fn test_streaming_turn_over_sse() {
    let client = serve(
        Router::new()
            .route("/api/v1/published/:agent_id/chat", post(chat_stream))
            .route(
                "/api/v1/published/:agent_id/sessions/:session_id",
                get(missing_session),
            ),
    )
    .await;

    let adapter = Arc::new(HttpStreamAdapter::published(client, "agent-1"));
    let store = Arc::new(ChatStore::new());
    let slot = SessionSlot::open(
        ChatSurface::PublishedAgent("agent-1".into()),
        Arc::new(MemorySessionStore::default()),
    )
    .unwrap();
    let engine =
        ChatEngine::new(store.clone(), adapter.clone(), slot).with_session_source(adapter);

    // Unknown session restores as empty
    assert_eq!(engine.mount().await, 0);

    engine.submit(Some("ping")).await.unwrap();
    engine.wait().await;

    let assistant = store.last().unwrap();
    assert_eq!(assistant.content, "You said: ping");
    assert_eq!(assistant.trace_id.as_deref(), Some("tr-1"));
    assert_eq!(assistant.stream_events[0].kind, "tool_call");
    assert_eq!(assistant.stream_events[0].data["toolName"], "echo");
    assert_eq!(engine.phase(), TurnPhase::Completed);
    assert!(!store.is_running());
}

#[tokio::test]
async fn test_non_streaming_agent_uses_sync_endpoint() {
    let client = serve(
        Router::new()
            .route(
                "/api/v1/published/:agent_id",
                get(|Path(id): Path<String>| async move {
                    Json(json!({"id": id, "name": "Helper", "api_response_mode": "non_streaming"}))
                }),
            )
            .route(
                "/api/v1/published/:agent_id/chat/sync",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "success": true,
                        "answer": format!("sync: {}", body["request"].as_str().unwrap_or_default()),
                        "total_turns": 2,
                        "trace_id": "tr-sync",
                        "session_id": body["session_id"],
                        "output_files": [{"file_id": "f1", "filename": "report.md"}]
                    }))
                }),
            ),
    )
    .await;

    let adapter = HttpStreamAdapter::published(client, "agent-1")
        .discover_mode()
        .await
        .unwrap();
    assert_eq!(
        skill_compose::StreamAdapter::response_mode(&adapter),
        ApiResponseMode::NonStreaming
    );

    let store = Arc::new(ChatStore::new());
    let slot = SessionSlot::open(
        ChatSurface::PublishedAgent("agent-1".into()),
        Arc::new(MemorySessionStore::default()),
    )
    .unwrap();
    let engine = ChatEngine::new(store.clone(), Arc::new(adapter), slot);

    engine.submit(Some("report")).await.unwrap();
    engine.wait().await;

    let assistant = store.last().unwrap();
    assert_eq!(assistant.content, "sync: report");
    assert_eq!(assistant.trace_id.as_deref(), Some("tr-sync"));
    assert_eq!(assistant.stream_events[0].data["filename"], "report.md");
}

// ─── Error mapping ───────────────────────────────────────────────

#[tokio::test]
async fn test_steer_error_detail() {
    let client = serve(Router::new().route(
        "/api/v1/published/:agent_id/chat/:trace_id/steer",
        post(|Path((_, trace_id)): Path<(String, String)>| async move {
            detail(
                StatusCode::CONFLICT,
                &format!("Run {} is not accepting messages", trace_id),
            )
        }),
    ))
    .await;

    let err = client
        .steer(&ChatEndpoint::Published("a1".into()), "tr-7", "hello")
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, detail } => {
            assert_eq!(status, 409);
            assert_eq!(detail, "Run tr-7 is not accepting messages");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_validation_detail_list_and_not_found() {
    let client = serve(
        Router::new()
            .route(
                "/api/v1/scheduled-tasks/:id",
                get(|| async { detail(StatusCode::NOT_FOUND, "Scheduled task not found") }),
            )
            .route(
                "/api/v1/scheduled-tasks/:id/pause",
                post(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({"detail": [{"loc": ["path", "id"], "msg": "bad id", "type": "value_error"}]})),
                    )
                }),
            ),
    )
    .await;

    let err = client.get_task("nope").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Not found: Scheduled task not found");

    let err = client.pause_task("x").await.unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert!(err.to_string().contains("bad id"));
}

#[tokio::test]
async fn test_client_validation_skips_network() {
    let counters: Shared = Arc::default();
    let client = serve(
        Router::new()
            .fallback(|State(c): State<Shared>| async move {
                c.hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            })
            .with_state(counters.clone()),
    )
    .await;

    let task = NewScheduledTask::new("Digest", "agent-1", "Summarize", ScheduleType::Interval, "5");
    let err = client.create_task(&task).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    let task = NewScheduledTask::new("Digest", "agent-1", "Summarize", ScheduleType::Cron, "61 * * * *");
    assert!(client.create_task(&task).await.is_err());

    assert!(client.task_runs("t1", Some(500)).await.is_err());
    assert!(client.binding_messages("b1", Some(0), 0).await.is_err());
    assert_eq!(counters.hits.load(Ordering::SeqCst), 0);
}

// ─── Auth ────────────────────────────────────────────────────────

async fn protected(State(c): State<Shared>, headers: HeaderMap) -> Response {
    c.hits.fetch_add(1, Ordering::SeqCst);
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some("Bearer fresh-token") => Json(json!({
            "presets": [],
            "total": 0
        }))
        .into_response(),
        _ => detail(StatusCode::UNAUTHORIZED, "Token expired"),
    }
}

#[tokio::test]
async fn test_unauthorized_refreshes_and_retries() {
    let counters: Shared = Arc::default();
    let client = serve(
        Router::new()
            .route("/api/v1/agents", get(protected))
            .route(
                "/api/v1/auth/refresh",
                post(|State(c): State<Shared>, Json(body): Json<Value>| async move {
                    c.refreshes.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(body["refresh_token"], "refresh-1");
                    Json(json!({"access_token": "fresh-token"}))
                }),
            )
            .with_state(counters.clone()),
    )
    .await;
    client.auth().set_login(&login("stale-token")).unwrap();

    let list = client.list_agents(None).await.unwrap();
    assert_eq!(list.total, 0);
    assert_eq!(counters.hits.load(Ordering::SeqCst), 2);
    assert_eq!(counters.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(client.auth().access_token().as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn test_failed_refresh_clears_credentials() {
    let counters: Shared = Arc::default();
    let client = serve(
        Router::new()
            .route("/api/v1/agents", get(protected))
            .route(
                "/api/v1/auth/refresh",
                post(|| async { detail(StatusCode::UNAUTHORIZED, "Invalid refresh token") }),
            )
            .with_state(counters.clone()),
    )
    .await;
    client.auth().set_login(&login("stale-token")).unwrap();

    let err = client.list_agents(None).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert!(!client.auth().is_authenticated());
    assert_eq!(counters.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_login_stores_tokens() {
    let client = serve(Router::new().route(
        "/api/v1/auth/login",
        post(|Json(body): Json<Value>| async move {
            if body["password"] != "correct-horse" {
                return detail(StatusCode::UNAUTHORIZED, "Invalid username or password");
            }
            Json(json!({
                "access_token": "a1",
                "refresh_token": "r1",
                "user": {"id": "u1", "username": body["username"], "role": "admin", "is_active": true},
                "must_change_password": true
            }))
            .into_response()
        }),
    ))
    .await;

    let err = client.login("admin", "wrong").await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert!(!client.auth().is_authenticated());

    let login = client.login("admin", "correct-horse").await.unwrap();
    assert!(login.must_change_password);
    assert_eq!(client.auth().access_token().as_deref(), Some("a1"));
    assert_eq!(client.auth().user().unwrap().username, "admin");
}

// ─── Scheduler & channels ────────────────────────────────────────

#[tokio::test]
async fn test_task_list_passes_status_filter() {
    let client = serve(Router::new().route(
        "/api/v1/scheduled-tasks",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            assert_eq!(q.get("status").map(String::as_str), Some("paused"));
            Json(json!([{
                "id": "t1",
                "name": "Digest",
                "agent_id": "a1",
                "prompt": "go",
                "schedule_type": "interval",
                "schedule_value": "3600",
                "context_mode": "isolated",
                "status": "paused",
                "next_run": "2025-03-01T10:00:00.000214",
                "last_run": null,
                "run_count": 0,
                "created_at": "2025-03-01T09:00:00.000214",
                "updated_at": "2025-03-01T09:00:00.000214"
            }]))
        }),
    ))
    .await;

    let tasks = client
        .list_tasks(Some(skill_compose::client::scheduler::TaskStatus::Paused))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].schedule_type, ScheduleType::Interval);
    let next = tasks[0].next_run.unwrap();
    assert_eq!((next - tasks[0].created_at).num_seconds(), 3600);
}

#[tokio::test]
async fn test_task_runs_parse_naive_timestamps() {
    let client = serve(Router::new().route(
        "/api/v1/scheduled-tasks/:id/runs",
        get(
            |Path(id): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(id, "t1");
                assert_eq!(q.get("limit").map(String::as_str), Some("50"));
                Json(json!([
                    {
                        "id": "r2",
                        "task_id": "t1",
                        "started_at": "2025-03-01T10:00:00.100000",
                        "completed_at": null,
                        "duration_ms": null,
                        "status": "running",
                        "result_summary": null,
                        "error": null,
                        "trace_id": null,
                        "created_at": "2025-03-01T10:00:00.100000"
                    },
                    {
                        "id": "r1",
                        "task_id": "t1",
                        "started_at": "2025-03-01T09:00:00.100000",
                        "completed_at": "2025-03-01T09:00:04.100000",
                        "duration_ms": 4000,
                        "status": "failed",
                        "result_summary": null,
                        "error": "Agent not found",
                        "trace_id": "tr-9",
                        "created_at": "2025-03-01T09:00:00.100000"
                    }
                ]))
            },
        ),
    ))
    .await;

    let runs = client.task_runs("t1", None).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].completed_at.is_none());
    assert_eq!(runs[1].error.as_deref(), Some("Agent not found"));
    let elapsed = runs[1].completed_at.unwrap() - runs[1].started_at;
    assert_eq!(elapsed.num_milliseconds(), 4000);
}

#[tokio::test]
async fn test_channel_bindings_parse_naive_timestamps() {
    let client = serve(
        Router::new()
            .route(
                "/api/v1/channels",
                get(|| async {
                    Json(json!({
                        "bindings": [{
                            "id": "b1",
                            "channel_type": "telegram",
                            "external_id": "-100123",
                            "name": "Support group",
                            "agent_id": "a1",
                            "trigger_pattern": "^/ask",
                            "enabled": true,
                            "config": null,
                            "created_at": "2025-02-10T08:30:00.918273",
                            "updated_at": "2025-02-11T08:30:00.918273"
                        }],
                        "total": 1
                    }))
                }),
            )
            .route(
                "/api/v1/channels/:id/messages",
                get(|| async {
                    Json(json!({
                        "messages": [{
                            "id": "m1",
                            "channel_binding_id": "b1",
                            "direction": "outbound",
                            "external_message_id": null,
                            "sender_id": null,
                            "sender_name": null,
                            "content": "Done.",
                            "message_type": "text",
                            "metadata": null,
                            "created_at": "2025-02-11T08:31:00.000001"
                        }],
                        "total": 1
                    }))
                }),
            ),
    )
    .await;

    let list = client.list_bindings(None).await.unwrap();
    assert_eq!(list.total, 1);
    assert_eq!(list.bindings[0].trigger_pattern.as_deref(), Some("^/ask"));
    assert_eq!(
        (list.bindings[0].updated_at - list.bindings[0].created_at).num_hours(),
        24
    );

    let messages = client.binding_messages("b1", None, 0).await.unwrap();
    assert_eq!(messages.messages[0].direction, "outbound");
    assert!(messages.messages[0].created_at > list.bindings[0].updated_at);
}

#[tokio::test]
async fn test_agent_presets_parse_naive_timestamps() {
    let client = serve(Router::new().route(
        "/api/v1/agents",
        get(|| async {
            Json(json!({
                "presets": [{
                    "id": "p1",
                    "name": "skill-finder",
                    "description": "Finds skills",
                    "system_prompt": null,
                    "skill_ids": ["skill-creator"],
                    "mcp_servers": [],
                    "builtin_tools": null,
                    "max_turns": 60,
                    "model_provider": null,
                    "model_name": null,
                    "executor_name": null,
                    "is_system": true,
                    "is_published": false,
                    "api_response_mode": null,
                    "created_at": "2025-01-05T12:00:00.250000",
                    "updated_at": "2025-01-05T12:00:00.250000"
                }],
                "total": 1
            }))
        }),
    ))
    .await;

    let list = client.list_agents(None).await.unwrap();
    assert_eq!(list.total, 1);
    let preset = &list.presets[0];
    assert!(preset.is_system);
    assert_eq!(preset.created_at.timestamp_subsec_millis(), 250);
}

#[tokio::test]
async fn test_adapter_status_and_poller() {
    let client = serve(Router::new().route(
        "/api/v1/channels/adapters",
        get(|| async { Json(json!({"feishu": true, "telegram": false})) }),
    ))
    .await;

    let status = client.adapter_status().await.unwrap();
    assert_eq!(status.get("feishu"), Some(&true));
    assert_eq!(status.get("telegram"), Some(&false));

    let poller = AdapterStatusPoller::spawn(Arc::new(client), Duration::from_millis(50));
    let mut rx = poller.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(poller.current(), status);
}
