//! HTTP surface of the relay.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Router, serve};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::Instrument;
use uuid::Uuid;
use wr_core::{AllocationConfig, Dispatcher, EventOutcome, InboundEvent, plan_event};

use crate::config::Config;
use crate::error::WebhookError;

const ECHO_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state of the webhook handlers.
#[derive(Clone)]
pub struct AppState {
    /// `(header, secret)` when the shared-secret check is on.
    auth: Option<Arc<(String, String)>>,
    allocation: Arc<AllocationConfig>,
    dispatcher: Dispatcher,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: &Config, dispatcher: Dispatcher) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(ECHO_TIMEOUT).build()?;
        if config.auth.is_partial() {
            tracing::warn!("auth needs both header and secret, shared-secret check is off");
        }
        let auth = config
            .auth
            .credentials()
            .map(|(header, secret)| Arc::new((header.to_string(), secret.to_string())));
        Ok(Self {
            auth,
            allocation: Arc::new(config.allocation.clone()),
            dispatcher,
            http,
        })
    }

    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), WebhookError> {
        let Some(auth) = &self.auth else {
            return Ok(());
        };
        let (header, secret) = auth.as_ref();
        let provided = headers
            .get(header.as_str())
            .map(axum::http::HeaderValue::as_bytes);
        if provided == Some(secret.as_bytes()) {
            Ok(())
        } else {
            Err(WebhookError::Unauthorized)
        }
    }

    /// Answers a subscription ping by fetching its validation URL.
    async fn echo_validation(&self, url: &str) {
        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("validation echo sent");
            }
            Ok(response) => {
                tracing::error!(status = %response.status(), "validation echo rejected");
            }
            Err(err) => tracing::error!(error = %err, "validation echo failed"),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/new-entry", post(new_entry))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn new_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, WebhookError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("webhook", %request_id);
    handle_entry(&state, &headers, &body).instrument(span).await
}

async fn handle_entry(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<&'static str, WebhookError> {
    state.authorize(headers)?;
    let value: serde_json::Value = serde_json::from_slice(body)?;

    let event = InboundEvent::from_value(value);
    tracing::debug!(variant = ?event.classify(), event_id = ?event.event_id(), "received event");

    if let InboundEvent::Ping(ping) = &event {
        match &ping.validation_code_url {
            Some(url) => state.echo_validation(url).await,
            None => tracing::debug!("ping without validation URL"),
        }
    }

    match plan_event(&event, &state.allocation) {
        EventOutcome::Ignored(reason) => tracing::info!(%reason, "ignoring event"),
        EventOutcome::NoDuration(record) => {
            tracing::info!(description = %record.description, "no duration, nothing to log");
        }
        EventOutcome::TooShort(record) => {
            tracing::info!(description = %record.description, "entry too short to log");
        }
        EventOutcome::Allocated(allocations) => {
            for allocation in allocations {
                let kind = allocation.kind;
                let minutes = allocation.time_spent_minutes;
                let targets = state.dispatcher.dispatch(allocation);
                tracing::info!(%kind, minutes, targets, "worklog dispatched");
            }
        }
    }

    Ok("Ok")
}

/// Serves until `shutdown` resolves, then waits for in-flight deliveries.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let dispatcher = state.dispatcher.clone();
    serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    let pending = dispatcher.in_flight();
    if pending > 0 {
        tracing::info!(pending, "waiting for in-flight deliveries");
    }
    dispatcher.shutdown().await;
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
