//! HTTP routes of the control agent.

use axum::{
    extract::{Query, State},
    response::Html,
    routing::{get, post, MethodRouter},
    Json, Router,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{ActionResponse, InfoResponse, StatusResponse, TimeoutQuery};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>wdmon agent</title></head>
<body>
    <h1>Watchdog control</h1>
    <h2>Endpoints</h2>
    <p>GET /api/status - Current watchdog status (JSON)</p>
    <p>GET /api/info - Watchdog device information (JSON)</p>
    <p>POST /api/start[?timeout=N] - Start the watchdog</p>
    <p>POST /api/trigger - Feed/trigger the watchdog</p>
    <p>POST /api/stop - Stop the watchdog</p>
    <p>POST /api/configure?timeout=N - Set the timeout (while stopped)</p>
    <h2>Example</h2>
    <pre>curl http://localhost:9101/api/status</pre>
    <pre>curl -X POST http://localhost:9101/api/start</pre>
    <pre>curl -X POST "http://localhost:9101/api/configure?timeout=30"</pre>
</body>
</html>
"#;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", only(get(index)))
        .route("/api/status", only(get(status)))
        .route("/api/info", only(get(info)))
        .route("/api/start", only(post(start)))
        .route("/api/trigger", only(post(trigger)))
        .route("/api/stop", only(post(stop)))
        .route("/api/configure", only(post(configure)))
        .fallback(not_found)
        .with_state(state)
}

fn only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.controller.lock().await.status())
}

async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let ctl = state.controller.lock().await;
    Json(ctl.info(&state.hostname, &state.device_path))
}

async fn start(
    State(state): State<AppState>,
    Query(q): Query<TimeoutQuery>,
) -> Result<Json<ActionResponse>, ApiError> {
    let status = state.controller.lock().await.start(q.timeout)?;
    Ok(Json(ActionResponse {
        status: "Watchdog started".into(),
        watchdog: Some(status),
    }))
}

async fn trigger(State(state): State<AppState>) -> Result<Json<ActionResponse>, ApiError> {
    state.controller.lock().await.trigger()?;
    Ok(Json(ActionResponse {
        status: "Watchdog triggered (reset timer)".into(),
        watchdog: None,
    }))
}

async fn stop(State(state): State<AppState>) -> Result<Json<ActionResponse>, ApiError> {
    state.controller.lock().await.stop()?;
    Ok(Json(ActionResponse {
        status: "Watchdog stopped".into(),
        watchdog: None,
    }))
}

async fn configure(
    State(state): State<AppState>,
    Query(q): Query<TimeoutQuery>,
) -> Result<Json<ActionResponse>, ApiError> {
    let status = state.controller.lock().await.configure(q.timeout)?;
    Ok(Json(ActionResponse {
        status: "Watchdog configured".into(),
        watchdog: Some(status),
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
