//! API server setup and configuration.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{Request, Response};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, MakeSpan, OnFailure,
    OnRequest, OnResponse, TraceLayer,
};
use tracing::{Level, Span};

use crate::api::routes;
use crate::error::{Error, Result};
use crate::notification::{DeliveryChannel, DeliveryContext, Dispatcher, SpeechChannel};

/// Paths that are served without request tracing.
const UNTRACED_PATHS: &[&str] = &["/healthz"];

/// Request tracing that skips [`UNTRACED_PATHS`].
///
/// Skipped requests get a disabled span; the other hooks stay silent for them.
#[derive(Debug, Clone, Copy)]
struct RequestTrace;

impl RequestTrace {
    fn is_traced(path: &str) -> bool {
        !UNTRACED_PATHS.contains(&path)
    }
}

impl<B> MakeSpan<B> for RequestTrace {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        if Self::is_traced(request.uri().path()) {
            DefaultMakeSpan::new().level(Level::INFO).make_span(request)
        } else {
            Span::none()
        }
    }
}

impl<B> OnRequest<B> for RequestTrace {
    fn on_request(&mut self, request: &Request<B>, span: &Span) {
        if !span.is_disabled() {
            DefaultOnRequest::new()
                .level(Level::INFO)
                .on_request(request, span);
        }
    }
}

impl<B> OnResponse<B> for RequestTrace {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        if !span.is_disabled() {
            DefaultOnResponse::new()
                .level(Level::INFO)
                .on_response(response, latency, span);
        }
    }
}

impl<C: fmt::Display> OnFailure<C> for RequestTrace {
    fn on_failure(&mut self, failure: C, latency: Duration, span: &Span) {
        if !span.is_disabled() {
            DefaultOnFailure::new()
                .level(Level::ERROR)
                .on_failure(failure, latency, span);
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Request body size limit in bytes
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8090,
            enable_cors: true,
            body_limit: 64 * 1024,
        }
    }
}

impl ApiServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid address: {}", e)))
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Fans events out to every configured channel
    pub dispatcher: Arc<Dispatcher>,
    /// SMS channel used by `/send-sms`
    pub sms: Arc<dyn DeliveryChannel>,
    /// Speech channel, `None` when synthesis is not configured
    pub speech: Option<Arc<SpeechChannel>>,
    /// Deadline for SMS and event delivery requests
    pub send_timeout: Duration,
    /// Deadline for `/tts/speak`
    pub speak_timeout: Duration,
    /// Cancelled on shutdown; parent of every request context
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create application state over the given channels.
    pub fn new(sms: Arc<dyn DeliveryChannel>, speech: Option<Arc<SpeechChannel>>) -> Self {
        let dispatcher = Dispatcher::new(
            sms.clone(),
            speech.clone().map(|s| s as Arc<dyn DeliveryChannel>),
        );
        Self {
            dispatcher: Arc::new(dispatcher),
            sms,
            speech,
            send_timeout: Duration::from_secs(10),
            speak_timeout: Duration::from_secs(20),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the request deadlines.
    pub fn with_timeouts(mut self, send_timeout: Duration, speak_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self.speak_timeout = speak_timeout;
        self
    }

    /// Tie request contexts to an external shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub(crate) fn send_context(&self) -> DeliveryContext {
        DeliveryContext::child_of(&self.shutdown, self.send_timeout)
    }

    pub(crate) fn speak_context(&self) -> DeliveryContext {
        DeliveryContext::child_of(&self.shutdown, self.speak_timeout)
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create with the given state. The server shuts down with the state's token.
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        let cancel_token = state.shutdown.clone();
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestTrace)
                .on_request(RequestTrace)
                .on_response(RequestTrace)
                .on_failure(RequestTrace),
        )
    }

    /// Start the server and serve until the cancel token fires.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
