//! Web server implementation
//!
//! HTTP surface of the pipeline: test discovery, per-file case listing,
//! fire-and-forget run submission, the static report, and a WebSocket
//! that fans live progress lines out to any number of viewers.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use testdeck_common::Selection;
use testdeck_runner::{discovery, EventChannel, Orchestrator, RunnerConfig};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared server state
pub struct AppState {
    config: RunnerConfig,
    events: EventChannel,
    /// Serializes submitted runs: the engine owns a single fixed browser
    /// debugging endpoint, so two runs must never interleave
    run_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            events: EventChannel::default(),
            run_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TestCasesQuery {
    file: String,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    tests: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RunAccepted {
    status: &'static str,
    files: usize,
    tests: usize,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/test-files", get(test_files_handler))
        .route("/api/test-cases", get(test_cases_handler))
        .route("/api/run", post(run_handler))
        .route("/ws", get(ws_handler))
        .route("/report", get(report_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(addr: SocketAddr, config: RunnerConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("testdeck web listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn test_files_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(discovery::list_test_files(&state.config))
}

async fn test_cases_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TestCasesQuery>,
) -> Response {
    let requested = state.config.project_root.join(&query.file);

    // Prevent path traversal: the resolved file must stay inside the
    // project root.
    let Ok(canon_root) = state.config.project_root.canonicalize() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Bad project root").into_response();
    };
    let Ok(canon_req) = requested.canonicalize() else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "test file not found" })),
        )
            .into_response();
    };
    if !canon_req.starts_with(&canon_root) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    match discovery::list_test_cases(&canon_req) {
        Ok(titles) => Json(titles).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Accept a selection and return immediately; all further feedback
/// arrives on the broadcast channel.
async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Response {
    let selection = match Selection::parse(&request.tests) {
        Ok(selection) => selection,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let files = selection.group_by_file().len();
    let tests = selection.len();

    let run_state = state.clone();
    tokio::spawn(async move {
        let _guard = run_state.run_lock.lock().await;
        let orchestrator = Orchestrator::new(run_state.config.clone(), run_state.events.clone());
        match orchestrator.execute(selection).await {
            Ok(outcome) => info!(
                "run finished: {}/{} passed, report at {}",
                outcome.summary.passed, outcome.summary.total, outcome.report_path
            ),
            Err(e) => error!("run failed: {}", e),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            status: "started",
            files,
            tests,
        }),
    )
        .into_response()
}

async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_progress_socket(socket, state).await {
            warn!("progress WebSocket ended with error: {}", e);
        }
    })
}

/// Stream progress lines to one viewer until it disconnects.
///
/// Client frames are drained and ignored; the channel is one-directional
/// in practice. A viewer that falls behind the broadcast buffer skips the
/// lost lines and keeps receiving.
async fn handle_progress_socket(socket: WebSocket, state: Arc<AppState>) -> anyhow::Result<()> {
    let mut rx = state.events.subscribe();
    let (mut ws_write, mut ws_read) = socket.split();

    loop {
        tokio::select! {
            line = rx.recv() => {
                match line {
                    Ok(line) => {
                        if ws_write.send(Message::Text(line)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("viewer lagged, {} progress line(s) dropped", missed);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // viewers cannot write back into orchestration state
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = ws_write.close().await;
    Ok(())
}

/// Serve the assembled report verbatim, or an explanatory placeholder
/// before the first run has generated one.
async fn report_handler(State(state): State<Arc<AppState>>) -> Response {
    let path = testdeck_common::ResultStore::new(&state.config.store_root).report_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(_) => Html(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>testdeck</title></head>\
             <body><h1>No report yet</h1>\
             <p>No run has completed. Submit a run via <code>POST /api/run</code> and follow \
             progress on <code>/ws</code>; the report will appear here when the run finishes.</p>\
             </body></html>"
                .to_string(),
        )
        .into_response(),
    }
}
