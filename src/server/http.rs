//! HTTP surface: control page, form POSTs, and the SSE event stream
//!
//! `GET /` renders the status page, `POST /` takes the page's
//! `x-www-form-urlencoded` buttons, and `GET /events` streams the broadcast
//! snapshots. Unknown paths fall back to the page so a captive-portal style
//! bookmark always lands somewhere useful.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse,
    },
    routing::get,
    Router,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info, warn};

use crate::controller::{Command, ControllerHandle};

use super::page;

/// Shared state for the HTTP handlers.
pub struct HttpState {
    pub controller: ControllerHandle,
    pub events: broadcast::Sender<String>,
}

/// Build the router.
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(index).post(control))
        .route("/events", get(events))
        .fallback(get(index))
        .with_state(state)
}

/// GET / - render the status page from the live controller state.
async fn index(State(state): State<Arc<HttpState>>) -> Html<String> {
    let context = state.controller.html_context().await;
    Html(page::render_index(&context))
}

/// POST / - apply the form commands, one token at a time, in order.
///
/// The response is sent only after every command took effect, so the page's
/// follow-up reload observes the new state.
async fn control(State(state): State<Arc<HttpState>>, body: String) -> &'static str {
    for token in body.split('&').filter(|t| !t.trim().is_empty()) {
        match Command::parse_form_token(token) {
            Some(command) => {
                debug!("http command: {command:?}");
                state.controller.apply(command).await;
            }
            None => warn!("ignoring unknown form token '{token}'"),
        }
    }
    "OK"
}

/// GET /events - SSE stream of state snapshots.
///
/// Each subscriber holds one broadcast receiver; dropping the connection
/// drops the receiver, and the broadcaster goes idle once the count reaches
/// zero. A lagged subscriber just skips to the next full snapshot.
async fn events(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|frame| match frame {
        Ok(json) => Some(Ok::<Event, Infallible>(Event::default().data(json))),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            debug!("SSE subscriber lagged by {missed} frames");
            None
        }
    });

    (
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

/// Bind and serve until the process shuts down.
pub async fn run_http(state: Arc<HttpState>, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("web remote listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind web remote on port {port}"))?;

    axum::serve(listener, router)
        .await
        .context("web remote server error")?;

    Ok(())
}
