//! Axum-based HTTP transport
//!
//! A thin adapter over [`ControllerHandle`]: REST endpoints for heaters,
//! history and status, plus a server-sent-events stream carrying every
//! notification. Each SSE client is one notification subscriber and is
//! detached when the client goes away.

use crate::command::Command;
use crate::controller::ControllerHandle;
use crate::error::HeatshedError;
use crate::notify::{Notification, SubscriberId};
use crate::persistence::HistoryRange;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerHandle,
}

#[derive(Deserialize)]
pub struct CommandBody {
    pub command: i64,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub range: Option<String>,
}

fn error_response(err: HeatshedError) -> Response {
    let status = if err.is_contract_violation() {
        StatusCode::BAD_REQUEST
    } else if matches!(err, HeatshedError::Stopped) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn heaters(State(state): State<AppState>) -> Response {
    match state.controller.heaters().await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => error_response(e),
    }
}

async fn set_heater_command(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(body): Json<CommandBody>,
) -> Response {
    let command = match Command::from_code(body.command) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state
        .controller
        .set_command_for_heater_by_id(id, command)
        .await
    {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn set_all_commands(State(state): State<AppState>, Json(body): Json<CommandBody>) -> Response {
    let command = match Command::from_code(body.command) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state.controller.set_command_for_all_heaters(command).await {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn history(State(state): State<AppState>, Query(params): Query<HistoryParams>) -> Response {
    let range = params
        .range
        .as_deref()
        .and_then(|r| r.parse::<HistoryRange>().ok())
        .unwrap_or(HistoryRange::All);
    match state.controller.history(range).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

async fn status(State(state): State<AppState>) -> Response {
    match state.controller.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

/// Detaches the subscriber when the SSE stream is dropped
struct Subscription {
    controller: ControllerHandle,
    id: SubscriberId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.controller.unsubscribe(self.id);
    }
}

fn to_event(notification: &Notification) -> Option<Event> {
    notification
        .to_json()
        .ok()
        .map(|payload| Event::default().event(notification.kind()).data(payload))
}

async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let (id, rx) = state.controller.subscribe();
    let subscription = Subscription {
        controller: state.controller.clone(),
        id,
    };
    let stream = ReceiverStream::new(rx).filter_map(move |notification| {
        let _attached = &subscription;
        to_event(&notification).map(Ok::<Event, std::convert::Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/heaters", get(heaters))
        .route("/api/heaters/command", post(set_all_commands))
        .route("/api/heaters/{id}/command", post(set_heater_command))
        .route("/api/history", get(history))
        .route("/api/status", get(status))
        .route("/api/events", get(events))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(controller: ControllerHandle, host: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(AppState { controller });

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api, events /api/events)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}
