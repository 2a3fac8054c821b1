//! Connection handlers for the tourclock server.
//!
//! This module wires the HTTP routes to the broker: clock WebSockets are
//! resolved through the event directory, bound to a [`MemberSession`], and
//! associated with their endpoint for administrative broadcasts.

use crate::config::Config;
use crate::directory::{EventDirectory, StaticDirectory};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tourclock_core::{ChannelId, ChannelRegistry, MemberSession, SessionError, SessionEvent};
use tourclock_protocol::{clock_endpoint, resource_updated, ProtocolError};
use tourclock_transport::{websocket, EndpointBroadcaster, Outbound};
use tracing::{debug, error, info, warn};

/// How long a closing connection may spend flushing queued text.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared server state.
pub struct AppState {
    /// Channel registry.
    pub registry: ChannelRegistry,
    /// Endpoint fan-out for administrative notices.
    pub endpoints: EndpointBroadcaster,
    /// Event authorization and resolution.
    pub directory: Arc<dyn EventDirectory>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state with a directory built from `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let directory = Arc::new(StaticDirectory::from_config(&config.directory));
        Self::with_directory(config, directory)
    }

    /// Create new app state with a custom directory.
    #[must_use]
    pub fn with_directory(config: Config, directory: Arc<dyn EventDirectory>) -> Self {
        Self {
            registry: ChannelRegistry::new(),
            endpoints: EndpointBroadcaster::new(),
            directory,
            config,
        }
    }

    /// Tell every connection on an event's clock endpoint that the event
    /// changed. Returns the number of connections notified.
    pub fn notify_updated(&self, event_id: &str) -> usize {
        let delivered = self
            .endpoints
            .broadcast(&clock_endpoint(event_id), &resource_updated(event_id));
        metrics::record_endpoint_broadcast(delivered);
        info!(event = %event_id, delivered, "Event update broadcast");
        delivered
    }

    fn update_gauges(&self) {
        let stats = self.registry.stats();
        metrics::set_registry_size(stats.channel_count, stats.member_count);
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tours/:tour/clock", get(clock_handler))
        .route("/tours/:tour/updated", post(updated_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));

    if state.config.registry.reap_interval_secs > 0 {
        spawn_reaper(
            Arc::clone(&state),
            Duration::from_secs(state.config.registry.reap_interval_secs),
        );
    }

    let listener = TcpListener::bind(addr).await?;

    info!("tourclock server listening on {}", addr);
    info!("Clock endpoint: ws://{}/tours/<handle>/clock", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tourclock server stopped");
    Ok(())
}

/// Serve `state` on an already bound listener.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Periodically drop channels nobody is using.
fn spawn_reaper(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = state.registry.reap_idle();
            if removed > 0 {
                info!(removed, "Reaped idle channels");
            }
            state.update_gauges();
        }
    });
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "channels": stats.channel_count,
        "members": stats.member_count,
        "endpoints": state.endpoints.endpoint_count(),
    }))
}

/// Administrative "event changed" notification.
async fn updated_handler(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let delivered = state.notify_updated(&id);
    Json(serde_json::json!({ "delivered": delivered }))
}

/// Clock WebSocket upgrade handler.
async fn clock_handler(
    ws: WebSocketUpgrade,
    Path(handle): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let channel_id = match state.directory.resolve(&handle).await {
        Ok(id) => id,
        Err(e) => {
            debug!(handle = %handle, error = %e, "Clock connection refused");
            return (e.status_code(), e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_clock_socket(socket, channel_id, state))
}

/// Drive one clock connection until it closes.
async fn handle_clock_socket(socket: WebSocket, channel_id: ChannelId, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let websocket::WsAttachment {
        connection,
        mut inbound,
        mut writer,
    } = websocket::attach(socket, state.config.limits.outbound_queue);
    let outbound: Arc<dyn Outbound> = connection.clone();
    let connection_id = outbound.id().clone();

    let endpoint = clock_endpoint(&channel_id);
    state.endpoints.associate(&endpoint, &outbound);

    let mut session = MemberSession::new(&state.registry, &channel_id, Arc::clone(&outbound))
        .with_message_limit(state.config.limits.max_message_size);
    state.update_gauges();

    debug!(connection = %connection_id, channel = %channel_id, "Clock connected");

    while let Some(msg) = inbound.next().await {
        match msg {
            Ok(Message::Text(text)) => dispatch(&mut session, &state, &text),
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => dispatch(&mut session, &state, text),
                Err(_) => {
                    warn!(connection = %connection_id, "Binary message is not UTF-8");
                    metrics::record_error("protocol");
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(connection = %connection_id, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    session.handle_close();
    state.endpoints.dissociate(&endpoint, &connection_id);
    connection.close();
    state.update_gauges();

    // The writer exits once the last queue sender is gone.
    drop(session);
    drop(outbound);
    drop(connection);
    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!(connection = %connection_id, "Writer still busy, aborting");
        writer.abort();
    }

    debug!(connection = %connection_id, channel = %channel_id, "Clock disconnected");
}

/// Hand one text message to the session. Errors are logged and the
/// connection stays open.
fn dispatch(session: &mut MemberSession, state: &AppState, text: &str) {
    match session.handle_text(text) {
        Ok(SessionEvent::Joined(outcome)) => {
            metrics::record_join(outcome.signal_sent);
            if outcome.inserted {
                state.update_gauges();
            }
        }
        Ok(SessionEvent::Relayed(report)) => {
            metrics::record_relay(report.delivered, report.failed);
        }
        Err(e) => {
            warn!(
                connection = %session.id(),
                channel = %session.channel().id(),
                error = %e,
                "Rejected client message"
            );
            metrics::record_error(error_kind(&e));
        }
    }
}

fn error_kind(error: &SessionError) -> &'static str {
    match error {
        SessionError::Protocol(ProtocolError::MessageTooLarge { .. }) => "message_too_large",
        SessionError::Protocol(ProtocolError::UnknownType(_) | ProtocolError::MissingType) => {
            "unknown_type"
        }
        SessionError::Protocol(_) => "malformed",
        SessionError::NotJoined => "not_joined",
        SessionError::Closed => "closed",
    }
}
