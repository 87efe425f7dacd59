use anyhow::{anyhow, Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, Category, PromptOption};
use crate::composer::{compose_prompt, SelectionState, TextField};
use crate::inference::InferenceReply;
use crate::main_ui_html::build_main_ui_html;
use crate::upstream::UpstreamClient;
use crate::workflow::{GenerationSession, Generator, WorkflowError};

pub struct AppState {
    pub catalog: Catalog,
    pub selection: Mutex<SelectionState>,
    pub generator: Generator,
    pub upstream: UpstreamClient,
    pub server_port: AtomicU16,
    initial_selection: SelectionState,
}

type ApiResponse = (StatusCode, Json<Value>);

impl AppState {
    pub fn new(
        catalog: Catalog,
        initial_selection: SelectionState,
        generator: Generator,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            catalog,
            selection: Mutex::new(initial_selection.clone()),
            generator,
            upstream,
            server_port: AtomicU16::new(0),
            initial_selection,
        }
    }
}

pub struct AppServer {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl AppServer {
    /// Serves on an already bound listener, so callers can learn the port
    /// before the state that depends on it is built.
    pub fn start(state: Arc<AppState>, listener: TcpListener) -> Result<Self> {
        let port = listener
            .local_addr()
            .context("failed to inspect server local address")?
            .port();
        listener
            .set_nonblocking(true)
            .context("failed to set listener non-blocking")?;

        state.server_port.store(port, Ordering::Relaxed);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread_handle = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            let runtime = match runtime {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("failed to build server runtime: {err}");
                    return;
                }
            };

            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(err) => {
                        error!("failed to adopt server listener: {err}");
                        return;
                    }
                };

                let app = build_router(state);
                let server = axum::serve(listener, app).with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                });
                if let Err(err) = server.await {
                    error!("server stopped with error: {err}");
                }
            });
        });

        info!(port, "server started");
        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn bind_listener(preferred_port: u16) -> Result<TcpListener> {
    for offset in 0..200u16 {
        let port = preferred_port.saturating_add(offset);
        if port == 0 {
            continue;
        }

        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            return Ok(listener);
        }
    }

    Err(anyhow!("failed to bind server port"))
}

#[derive(Debug, Clone, Serialize)]
struct UiCategory {
    key: &'static str,
    label: &'static str,
    options: Vec<PromptOption>,
    selected_id: u32,
}

#[derive(Debug, Clone, Serialize)]
struct UiSnapshot {
    categories: Vec<UiCategory>,
    environment: String,
    descriptors: String,
    prompt: String,
    session: GenerationSession,
}

#[derive(Debug, Deserialize)]
struct SelectReq {
    category: String,
    option_id: u32,
}

#[derive(Debug, Deserialize)]
struct TextReq {
    field: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GenerateReq {
    input: String,
}

fn build_router(state: Arc<AppState>) -> Router {
    let port = state.server_port.load(Ordering::Relaxed);
    let local_origin = HeaderValue::from_str(&format!("http://127.0.0.1:{port}"))
        .expect("127.0.0.1 origin should be valid");
    let localhost_origin = HeaderValue::from_str(&format!("http://localhost:{port}"))
        .expect("localhost origin should be valid");

    let cors = CorsLayer::new()
        .allow_origin([local_origin, localhost_origin])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(get_main_page))
        .route("/ping", get(get_ping))
        .route("/app/init", get(get_app_snapshot))
        .route("/app/status", get(get_app_snapshot))
        .route("/app/select", post(post_app_select))
        .route("/app/text", post(post_app_text))
        .route("/app/reset", post(post_app_reset))
        .route("/app/generate", post(post_app_generate))
        .route("/api/generate", post(post_api_generate))
        .layer(cors)
        .with_state(state)
}

async fn get_main_page() -> Html<String> {
    Html(build_main_ui_html())
}

async fn get_ping() -> ApiResponse {
    ok_json(json!({}))
}

async fn get_app_snapshot(State(state): State<Arc<AppState>>) -> ApiResponse {
    let selection = match state.selection.lock() {
        Ok(guard) => guard.clone(),
        Err(_) => return err_json(StatusCode::INTERNAL_SERVER_ERROR, "selection lock error"),
    };

    ok_snapshot(build_ui_snapshot(&state, &selection))
}

async fn post_app_select(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectReq>,
) -> ApiResponse {
    let Some(category) = Category::from_key(&payload.category) else {
        return err_json(StatusCode::BAD_REQUEST, "unknown category");
    };

    let Some(option) = state.catalog.find(category, payload.option_id).cloned() else {
        return err_json(StatusCode::NOT_FOUND, "option not found");
    };
    if option.unavailable {
        return err_json(StatusCode::BAD_REQUEST, "option is unavailable");
    }

    let selection = {
        let mut selection = match state.selection.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return err_json(StatusCode::INTERNAL_SERVER_ERROR, "selection lock error")
            }
        };
        selection.select(category, option);
        selection.clone()
    };

    ok_snapshot(build_ui_snapshot(&state, &selection))
}

async fn post_app_text(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TextReq>,
) -> ApiResponse {
    let field = match payload.field.trim() {
        "environment" => TextField::Environment,
        "descriptors" => TextField::Descriptors,
        _ => return err_json(StatusCode::BAD_REQUEST, "unknown text field"),
    };

    let selection = {
        let mut selection = match state.selection.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return err_json(StatusCode::INTERNAL_SERVER_ERROR, "selection lock error")
            }
        };
        selection.set_text(field, &payload.value);
        selection.clone()
    };

    ok_snapshot(build_ui_snapshot(&state, &selection))
}

async fn post_app_reset(State(state): State<Arc<AppState>>) -> ApiResponse {
    let selection = {
        let mut selection = match state.selection.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return err_json(StatusCode::INTERNAL_SERVER_ERROR, "selection lock error")
            }
        };
        *selection = state.initial_selection.clone();
        selection.clone()
    };

    ok_snapshot(build_ui_snapshot(&state, &selection))
}

async fn post_app_generate(State(state): State<Arc<AppState>>) -> ApiResponse {
    let selection = match state.selection.lock() {
        Ok(guard) => guard.clone(),
        Err(_) => return err_json(StatusCode::INTERNAL_SERVER_ERROR, "selection lock error"),
    };

    match state.generator.submit(compose_prompt(&selection)) {
        Ok(_) => ok_snapshot(build_ui_snapshot(&state, &selection)),
        Err(err @ WorkflowError::AlreadyGenerating) => {
            err_json(StatusCode::CONFLICT, &err.to_string())
        }
    }
}

/// Legacy clients declare `image/jpeg` for this JSON body, so the raw bytes
/// are parsed instead of going through the `Json` extractor.
async fn post_api_generate(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResponse {
    let payload: GenerateReq = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return err_json(StatusCode::BAD_REQUEST, "input is required"),
    };

    if !state.upstream.is_configured() {
        return err_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream model is not configured",
        );
    }

    match state.upstream.forward(&payload.input).await {
        Ok(InferenceReply::Image(image)) => ok_json(json!({ "image": image })),
        Ok(InferenceReply::Warming { estimated_time }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ok": false,
                "error": "model is loading",
                "estimated_time": estimated_time,
            })),
        ),
        Ok(InferenceReply::Failed { status, error }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            err_json(status, &error)
        }
        Err(err) => {
            warn!("upstream request failed: {err}");
            err_json(StatusCode::BAD_GATEWAY, &err.to_string())
        }
    }
}

fn ok_json(payload: Value) -> ApiResponse {
    let mut body = serde_json::Map::new();
    body.insert("ok".to_string(), Value::Bool(true));

    if let Some(obj) = payload.as_object() {
        for (key, value) in obj {
            body.insert(key.clone(), value.clone());
        }
    } else if !payload.is_null() {
        body.insert("data".to_string(), payload);
    }

    (StatusCode::OK, Json(Value::Object(body)))
}

fn ok_snapshot(snapshot: UiSnapshot) -> ApiResponse {
    let session = snapshot.session;
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "categories": snapshot.categories,
            "environment": snapshot.environment,
            "descriptors": snapshot.descriptors,
            "prompt": snapshot.prompt,
            "is_generating": session.is_generating,
            "warming_message": session.retry_error_message,
            "error_message": session.error_message,
            "retry_seconds_pending": session.retry_seconds_pending,
            "retry_budget_remaining": session.retry_budget_remaining,
            "image": session.result_image,
            "final_prompt": session.last_submitted_prompt,
        })),
    )
}

fn err_json(status: StatusCode, message: &str) -> ApiResponse {
    (
        status,
        Json(json!({
            "ok": false,
            "error": message,
        })),
    )
}

fn build_ui_snapshot(state: &AppState, selection: &SelectionState) -> UiSnapshot {
    let categories = Category::ALL
        .into_iter()
        .map(|category| UiCategory {
            key: category.key(),
            label: category.label(),
            options: state.catalog.options(category).to_vec(),
            selected_id: selection.selected(category).id,
        })
        .collect();

    UiSnapshot {
        categories,
        environment: selection.environment.clone(),
        descriptors: selection.descriptors.clone(),
        prompt: compose_prompt(selection),
        session: state.generator.snapshot(),
    }
}
