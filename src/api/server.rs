//! API Server module
//!
//! This module provides the HTTP API and the HTML dashboard for autopm.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ai::PlanClient;
use crate::models::{Core, DashboardError, DashboardSnapshot, FileItem, NewTask, TaskStatus};
use crate::sync::PlanSync;

/// How long the simulated dependency audit takes
pub const AUDIT_DELAY: Duration = Duration::from_millis(800);

/// Request to move a task to another column
#[derive(Serialize, Deserialize)]
pub struct MoveTaskRequest {
    pub status: TaskStatus,
}

/// Request to audit a file from the explorer
#[derive(Serialize, Deserialize)]
pub struct AuditRequest {
    pub name: String,
}

/// Request to switch sidebar tabs
#[derive(Serialize, Deserialize)]
pub struct NavigateRequest {
    pub tab: String,
}

/// Architecture analysis result
#[derive(Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub summary: String,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// Everything the handlers need
#[derive(Clone)]
pub struct AppState {
    pub core: Core,
    pub sync: PlanSync,
    pub planner: PlanClient,
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

fn map_dashboard_error(error: DashboardError) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(error.to_string())),
    )
        .into_response()
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { Redirect::temporary("/ui") }))
        // --- Board --- //
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id/move", post(move_task))
        // --- Explorer --- //
        .route("/api/files", get(list_files))
        .route("/api/files/audit", post(audit_file))
        .route("/api/navigate", post(navigate))
        // --- Terminal and thinking feed --- //
        .route("/api/logs", get(list_logs))
        .route("/api/plans", get(list_plans))
        .route("/api/sync", post(trigger_sync))
        .route("/api/analyze", post(analyze_architecture))
        // --- UI --- //
        .route("/ui", get(ui_handler))
        .route("/ui/events", get(events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the API server
pub async fn serve(state: AppState, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn get_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.core.snapshot())
}

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.core.tasks())
}

async fn create_task(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let new_task = match parse_new_task(&body) {
        Ok(new_task) => new_task,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(format!("Invalid task: {}", e))),
            )
                .into_response()
        }
    };
    let task = state.core.create_task(new_task);
    (StatusCode::CREATED, Json(ApiResponse::success(task))).into_response()
}

// An empty body means "use the defaults"; anything else must be a valid task
fn parse_new_task(body: &[u8]) -> Result<NewTask, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(NewTask::default());
    }
    serde_json::from_slice(body)
}

async fn move_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<MoveTaskRequest>,
) -> impl IntoResponse {
    match state.core.move_task(&id, payload.status) {
        Some(task) => ok(task),
        None => map_dashboard_error(DashboardError::TaskNotFound(id)),
    }
}

async fn list_files(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.core.files())
}

async fn audit_file(
    State(state): State<AppState>,
    Json(payload): Json<AuditRequest>,
) -> impl IntoResponse {
    if let Err(e) = state.core.begin_audit(&payload.name) {
        return map_dashboard_error(e);
    }

    let core = state.core.clone();
    let name = payload.name.clone();
    tokio::spawn(async move {
        tokio::time::sleep(AUDIT_DELAY).await;
        core.finish_audit(&name);
    });

    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(payload.name)),
    )
        .into_response()
}

async fn navigate(
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> impl IntoResponse {
    state.core.navigate(&payload.tab);
    ok(payload.tab)
}

async fn list_logs(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.core.logs())
}

async fn list_plans(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.core.plans())
}

async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.sync.trigger().await)
}

async fn analyze_architecture(State(state): State<AppState>) -> impl IntoResponse {
    state.core.begin_analysis();
    let files = state.core.files();

    match state.planner.request_architecture_summary(&files).await {
        Ok(summary) => {
            state.core.finish_analysis(Some(&summary));
            ok(AnalysisResponse { summary })
        }
        Err(e) => {
            tracing::warn!(error = %e, "architecture analysis failed");
            state.core.finish_analysis(None);
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::<AnalysisResponse>::error(format!(
                    "Architecture analysis failed: {}",
                    e
                ))),
            )
                .into_response()
        }
    }
}

// --- UI and Event Handlers --- //

async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    let receiver = state.core.subscribe();
    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        match receiver.recv().await {
            // A lagged receiver still only needs to know that something changed
            Ok(()) | Err(RecvError::Lagged(_)) => Some((
                Ok::<_, Infallible>("event: update\ndata: change\n\n".to_string()),
                receiver,
            )),
            Err(RecvError::Closed) => None,
        }
    });

    let headers = [
        (
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/event-stream"),
        ),
        (
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static("no-cache"),
        ),
    ];

    (headers, axum::body::Body::from_stream(stream))
}

async fn ui_handler(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_dashboard(&state.core.snapshot()))
}

// --- Template Rendering --- //

fn escape(text: &str) -> String {
    html_escape::encode_text(text).to_string()
}

fn render_dashboard(snapshot: &DashboardSnapshot) -> String {
    let mut html = String::from(HTML_TEMPLATE_HEADER);

    html.push_str("<aside class='explorer'><h2>Explorer</h2><ul class='tree'>");
    render_files_html(&mut html, &snapshot.files);
    html.push_str("</ul></aside>");

    html.push_str("<main><div class='board'>");
    for status in TaskStatus::ALL {
        let column: Vec<_> = snapshot
            .tasks
            .iter()
            .filter(|task| task.status() == status)
            .collect();
        html.push_str(&format!(
            "<section class='column'><h3>{} <span class='count'>{}</span></h3>",
            status.label(),
            column.len()
        ));
        for task in column {
            html.push_str(&format!(
                "<div class='card'><span class='priority {}'>{}</span><h4>{}</h4><p>{}</p><div class='tags'>",
                task.priority(),
                task.priority(),
                escape(task.title()),
                escape(task.description())
            ));
            for tag in task.tags() {
                html.push_str(&format!("<span class='tag'>{}</span>", escape(tag)));
            }
            html.push_str("</div></div>");
        }
        html.push_str("</section>");
    }
    html.push_str("</div>");

    html.push_str("<div class='terminal'>");
    if snapshot.logs.is_empty() {
        html.push_str("<div class='empty'>Initializing core stream...</div>");
    }
    for entry in &snapshot.logs {
        html.push_str(&format!(
            "<div class='log {}'><span class='stamp'>[{}]</span> {}</div>",
            entry.kind,
            escape(&entry.timestamp),
            escape(&entry.message)
        ));
    }
    html.push_str("</div></main>");

    html.push_str("<aside class='thinking'>");
    let status = if snapshot.syncing { "syncing" } else { "idle" };
    html.push_str(&format!(
        "<h2>Thinking <span class='sync {}'>{}</span></h2>",
        status, status
    ));
    if let Some(last_sync) = &snapshot.last_sync {
        html.push_str(&format!("<div class='last-sync'>Last sync {}</div>", escape(last_sync)));
    }
    let total = snapshot.plans.len();
    for (i, plan) in snapshot.plans.iter().enumerate() {
        html.push_str(&format!(
            "<div class='plan'><div class='node'>Protocol_Node_{} <span class='stamp'>{}</span></div><p class='thought'>{}</p><div class='action'><strong>Execution Branch</strong> {}</div></div>",
            total - i,
            escape(&plan.timestamp),
            escape(&plan.thought),
            escape(&plan.action)
        ));
    }
    html.push_str("</aside>");

    html.push_str(HTML_TEMPLATE_FOOTER);
    html
}

fn render_files_html(html: &mut String, items: &[FileItem]) {
    for item in items {
        if item.is_folder() {
            html.push_str(&format!(
                "<li class='folder'>{}<ul class='tree'>",
                escape(item.name())
            ));
            render_files_html(html, item.children());
            html.push_str("</ul></li>");
        } else {
            html.push_str(&format!("<li class='file'>{}</li>", escape(item.name())));
        }
    }
}

const HTML_TEMPLATE_HEADER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Autonomous PM</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            display: flex;
            min-height: 100vh;
            background-color: #020617;
            color: #e2e8f0;
        }
        h2, h3 {
            font-size: 11px;
            text-transform: uppercase;
            letter-spacing: 0.1em;
            color: #64748b;
        }
        .explorer, .thinking {
            padding: 16px;
            border-right: 1px solid #1e293b;
        }
        .explorer { width: 220px; }
        .thinking { width: 360px; border-left: 1px solid #1e293b; border-right: none; }
        main { flex: 1; display: flex; flex-direction: column; }
        .tree { list-style: none; padding-left: 12px; font-size: 12px; }
        .folder { font-weight: bold; color: #64748b; }
        .file { font-weight: normal; color: #94a3b8; }
        .board { flex: 1; display: flex; gap: 16px; padding: 16px; }
        .column { flex: 1; min-width: 200px; }
        .count { color: #94a3b8; font-family: monospace; }
        .card {
            background: #0f172a;
            border: 1px solid #1e293b;
            border-radius: 12px;
            padding: 12px;
            margin-bottom: 10px;
        }
        .card h4 { margin: 6px 0; }
        .card p { font-size: 12px; color: #64748b; }
        .priority { font-size: 9px; text-transform: uppercase; padding: 2px 6px; border-radius: 4px; }
        .priority.high { color: #f87171; }
        .priority.medium { color: #fbbf24; }
        .priority.low { color: #64748b; }
        .tag { font-size: 9px; margin-right: 4px; color: #475569; text-transform: uppercase; }
        .terminal {
            height: 190px;
            overflow-y: auto;
            font-family: monospace;
            font-size: 12px;
            border-top: 1px solid #0f172a;
            padding: 12px;
        }
        .stamp { color: #334155; }
        .log.error { color: #ef4444; }
        .log.success { color: #10b981; }
        .log.ai { color: #22d3ee; }
        .log.info { color: #94a3b8; }
        .sync.syncing { color: #22d3ee; }
        .plan { border-left: 1px solid #1e293b; padding-left: 12px; margin-bottom: 16px; }
        .node { font-family: monospace; font-size: 10px; color: #0e7490; }
        .action { background: #0f172a; border-radius: 8px; padding: 8px; font-size: 12px; }
        .action strong { display: block; color: #a855f7; font-size: 9px; text-transform: uppercase; }
    </style>
</head>
<body>
"#;

const HTML_TEMPLATE_FOOTER: &str = r#"
    <script>
        // Reload whenever the dashboard state changes
        function connectEvents() {
            const eventSource = new EventSource('/ui/events');
            eventSource.addEventListener('update', () => window.location.reload());
            eventSource.onerror = () => {
                eventSource.close();
                setTimeout(connectEvents, 3000);
            };
        }
        window.addEventListener('load', connectEvents);
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fakes::{FailingTransport, ScriptedTransport};
    use crate::ai::Transport;
    use crate::models::{Context, LogKind, Task};
    use crate::sync::SyncOutcome;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt; // for `collect`
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    // Helper to create a test Core and Router
    fn setup_test_app(transport: Arc<dyn Transport>) -> (Core, Router) {
        let core = Core::new(Context::seeded());
        let planner = PlanClient::new(transport, "test-model");
        let sync = PlanSync::new(core.clone(), planner.clone());
        let app = router(AppState {
            core: core.clone(),
            sync,
            planner,
        });
        (core, app)
    }

    // Helper to make requests and deserialize the JSON envelope
    async fn request_json<T: DeserializeOwned + Serialize>(
        app: &Router,
        method: &str,
        uri: &str,
        body: Body,
    ) -> (StatusCode, ApiResponse<T>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let api_resp = serde_json::from_slice::<ApiResponse<T>>(&body_bytes).unwrap_or_else(|e| {
            panic!(
                "Failed to parse response: {}. Body: {}",
                e,
                String::from_utf8_lossy(&body_bytes)
            )
        });
        (status, api_resp)
    }

    #[tokio::test]
    async fn test_create_and_move_task() {
        let (core, app) = setup_test_app(Arc::new(FailingTransport::default()));

        let body = Body::from(json!({ "title": "Wire telemetry", "tags": ["Ops"] }).to_string());
        let (status, resp): (_, ApiResponse<Task>) =
            request_json(&app, "POST", "/api/tasks", body).await;
        assert_eq!(status, StatusCode::CREATED);
        let task = resp.data.expect("task should be present");
        assert_eq!(task.title(), "Wire telemetry");
        assert_eq!(task.status(), TaskStatus::Backlog);

        let move_body = Body::from(json!({ "status": "review" }).to_string());
        let uri = format!("/api/tasks/{}/move", task.id());
        let (status, resp): (_, ApiResponse<Task>) =
            request_json(&app, "POST", &uri, move_body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap().status(), TaskStatus::Review);

        let logs = core.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].message, "Task moved: \"Wire telemetry\" -> REVIEW");
    }

    #[tokio::test]
    async fn test_move_unknown_task_is_not_found() {
        let (core, app) = setup_test_app(Arc::new(FailingTransport::default()));
        let before = core.tasks();

        let body = Body::from(json!({ "status": "done" }).to_string());
        let (status, resp): (_, ApiResponse<Task>) =
            request_json(&app, "POST", "/api/tasks/ghost/move", body).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!resp.success);
        assert_eq!(core.tasks(), before);
        assert!(core.logs().is_empty());
    }

    #[tokio::test]
    async fn test_audit_known_and_unknown_files() {
        let (core, app) = setup_test_app(Arc::new(FailingTransport::default()));

        let body = Body::from(json!({ "name": "nope.rs" }).to_string());
        let (status, _): (_, ApiResponse<String>) =
            request_json(&app, "POST", "/api/files/audit", body).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let body = Body::from(json!({ "name": "main.sys" }).to_string());
        let (status, _): (_, ApiResponse<String>) =
            request_json(&app, "POST", "/api/files/audit", body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(core.logs()[0].message, "Accessing file: main.sys");
        assert_eq!(core.logs()[1].kind, LogKind::Ai);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audit_completes_after_delay() {
        let (core, app) = setup_test_app(Arc::new(FailingTransport::default()));

        let body = Body::from(json!({ "name": "kernel.io" }).to_string());
        let (status, _): (_, ApiResponse<String>) =
            request_json(&app, "POST", "/api/files/audit", body).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        tokio::time::sleep(AUDIT_DELAY - Duration::from_millis(1)).await;
        assert_eq!(core.logs().len(), 2);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let logs = core.logs();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[2].kind, LogKind::Success);
        assert_eq!(
            logs[2].message,
            "Audit complete for kernel.io. No critical vulnerabilities found."
        );
    }

    #[tokio::test]
    async fn test_invalid_task_body_is_rejected() {
        let (core, app) = setup_test_app(Arc::new(FailingTransport::default()));

        for body in [r#"{"title":"Ship","priority":"urgent"}"#, r#"{"title":"Ship""#] {
            let (status, resp): (_, ApiResponse<Task>) =
                request_json(&app, "POST", "/api/tasks", Body::from(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
            assert!(!resp.success);
        }

        assert_eq!(core.tasks().len(), 4);
        assert!(core.logs().is_empty());
    }

    #[tokio::test]
    async fn test_empty_task_body_uses_defaults() {
        let (core, app) = setup_test_app(Arc::new(FailingTransport::default()));

        let (status, resp): (_, ApiResponse<Task>) =
            request_json(&app, "POST", "/api/tasks", Body::empty()).await;

        assert_eq!(status, StatusCode::CREATED);
        let task = resp.data.unwrap();
        assert_eq!(task.title(), crate::seed::DEFAULT_TASK_TITLE);
        assert_eq!(task.tags(), &["Incoming".to_string()]);
        assert_eq!(core.tasks().len(), 5);
    }

    #[tokio::test]
    async fn test_sync_endpoint_applies_plans() {
        let (core, app) = setup_test_app(Arc::new(ScriptedTransport::single_plans(["map the kernel"])));

        let (status, resp): (_, ApiResponse<SyncOutcome>) =
            request_json(&app, "POST", "/api/sync", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            resp.data,
            Some(SyncOutcome::Completed {
                new_plans: 1,
                fallback: false
            })
        );
        assert_eq!(core.plans()[0].thought, "map the kernel");
    }

    #[tokio::test]
    async fn test_failed_analysis_logs_one_error() {
        let (core, app) = setup_test_app(Arc::new(FailingTransport::default()));

        let (status, resp): (_, ApiResponse<AnalysisResponse>) =
            request_json(&app, "POST", "/api/analyze", Body::empty()).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!resp.success);
        let logs = core.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "Starting codebase architecture analysis...");
        assert_eq!(logs[1].kind, LogKind::Error);
        assert_eq!(logs[1].message, "Architecture analysis failed.");
    }

    #[tokio::test]
    async fn test_successful_analysis_is_logged() {
        let transport = ScriptedTransport::new(vec![Ok("Split the kernel.".to_string())]);
        let (core, app) = setup_test_app(Arc::new(transport));

        let (status, resp): (_, ApiResponse<AnalysisResponse>) =
            request_json(&app, "POST", "/api/analyze", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap().summary, "Split the kernel.");
        assert_eq!(
            core.logs().last().unwrap().message,
            "Architecture Suggestion: Split the kernel."
        );
    }

    #[test]
    fn test_dashboard_escapes_user_text() {
        let mut context = Context::seeded();
        context.create_task(NewTask {
            title: Some("<script>alert(1)</script>".to_string()),
            ..NewTask::default()
        });

        let html = render_dashboard(&context.snapshot());
        assert!(!html.contains("<script>alert(1)"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Active Node"));
        assert!(html.contains("Dashboard.tsx"));
    }
}
