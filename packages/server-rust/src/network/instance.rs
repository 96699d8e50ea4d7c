//! Service instance with an explicit lifecycle.
//!
//! Implements the deferred startup pattern: `new()` resolves configuration
//! and the logging backend, `bind()` binds the TCP listener, and `run()`
//! serves until a shutdown trigger fires, then drains in-flight requests
//! for at most the configured grace period.

use std::future::{Future, IntoFuture};
use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use gantry_core::RequestContext;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

use super::handlers::health::{HEALTH_PATH, LIVENESS_PATH, READINESS_PATH};
use super::handlers::{health_handler, liveness_handler, readiness_handler, AppState};
use super::middleware::{build_http_layers, request_scope, RequestScope};
use super::shutdown::{LifecycleState, ShutdownController};
use super::signal::{os_signal, ShutdownReason};
use crate::config::ServiceConfig;
use crate::error::ServerError;
use crate::logging::{LogBackend, RequestLogger};

/// How the drain phase of a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished within the grace period.
    Drained,
    /// The grace period elapsed first; the remaining requests were abandoned.
    GracePeriodElapsed { abandoned: u64 },
}

impl ShutdownOutcome {
    /// Whether shutdown finished without abandoning requests.
    #[must_use]
    pub fn is_clean(self) -> bool {
        self == Self::Drained
    }
}

/// One HTTP service: its listener, logging backend and lifecycle.
///
/// 1. `new()` -- state `Created`; nothing bound, logging not yet initialized
/// 2. `bind()` -- binds the listener (optional, `run()` binds if needed)
/// 3. `run()` -- `Listening` until the trigger, then `ShuttingDown`, then `Stopped`
pub struct ServiceInstance {
    config: ServiceConfig,
    router: Router,
    listener: Option<TcpListener>,
    logging: Arc<LogBackend>,
    shutdown: Arc<ShutdownController>,
    start_time: Instant,
}

impl ServiceInstance {
    /// Creates an instance serving `router` in addition to the health probes.
    #[must_use]
    pub fn new(config: ServiceConfig, router: Router) -> Self {
        let logging = Arc::new(LogBackend::new(
            &config.service_name,
            &config.version,
            config.network.port,
            config.logging.clone(),
        ));
        Self {
            config,
            router,
            listener: None,
            logging,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    /// Creates an instance configured from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the environment is invalid.
    pub fn from_env(
        service_name: impl Into<String>,
        version: impl Into<String>,
        router: Router,
    ) -> Result<Self, ServerError> {
        let config = ServiceConfig::from_env(service_name, version)?;
        Ok(Self::new(config, router))
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The instance's logging backend.
    #[must_use]
    pub fn logging(&self) -> Arc<LogBackend> {
        Arc::clone(&self.logging)
    }

    /// Structured logger for work done outside the HTTP middleware.
    #[must_use]
    pub fn logger_for(&self, ctx: &RequestContext) -> RequestLogger {
        self.logging.logger_for(ctx)
    }

    /// Returns a shared reference to the shutdown controller.
    ///
    /// Other components use this to check lifecycle state or request a stop.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shutdown.state()
    }

    /// Assembles the user router, the health probes and the middleware.
    ///
    /// Probe routes:
    /// - `GET /healthz` -- detailed health JSON
    /// - `GET /healthz/live` -- liveness probe
    /// - `GET /healthz/ready` -- readiness probe
    pub fn build_router(&self) -> Router {
        let state = AppState {
            shutdown: Arc::clone(&self.shutdown),
            service: Arc::from(self.config.service_name.as_str()),
            version: Arc::from(self.config.version.as_str()),
            start_time: self.start_time,
        };
        let probes = Router::new()
            .route(HEALTH_PATH, get(health_handler))
            .route(LIVENESS_PATH, get(liveness_handler))
            .route(READINESS_PATH, get(readiness_handler))
            .with_state(state);

        let scope = RequestScope {
            logging: Arc::clone(&self.logging),
            shutdown: Arc::clone(&self.shutdown),
            max_header_bytes: self.config.network.max_header_bytes,
        };
        let layers = build_http_layers(&self.config.network, self.logging.dispatch().clone());

        self.router
            .clone()
            .merge(probes)
            .layer(middleware::from_fn_with_state(scope, request_scope))
            .layer(layers)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured
    /// port when port 0 is used. Calling it again keeps the first listener.
    /// The logging backend announces this port once initialized.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(&mut self) -> Result<u16, ServerError> {
        let addr = self.config.network.bind_addr();
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => TcpListener::bind(&addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: addr.clone(),
                    source,
                })?,
        };
        let port = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?
            .port();
        self.listener = Some(listener);
        self.logging.set_port(port);
        Ok(port)
    }

    /// Serves until SIGINT or SIGTERM, then shuts down gracefully.
    ///
    /// # Errors
    ///
    /// See [`ServiceInstance::run`].
    pub async fn start(self) -> Result<ShutdownOutcome, ServerError> {
        self.run(os_signal()).await
    }

    /// Serves until `signal` resolves or a stop is requested through the
    /// [`ShutdownController`], then drains in-flight requests.
    ///
    /// Returns once the instance is `Stopped`. Requests still running when
    /// the grace period elapses are abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be bound and
    /// [`ServerError::Serve`] if the server fails while serving.
    pub async fn run<F>(mut self, signal: F) -> Result<ShutdownOutcome, ServerError>
    where
        F: Future<Output = ShutdownReason> + Send,
    {
        self.bind().await?;
        let dispatch = self.logging.dispatch().clone();
        self.lifecycle(signal).with_subscriber(dispatch).await
    }

    async fn lifecycle<F>(mut self, signal: F) -> Result<ShutdownOutcome, ServerError>
    where
        F: Future<Output = ShutdownReason> + Send,
    {
        let port = self.bind().await?;
        let listener = self.listener.take().ok_or_else(|| {
            ServerError::Serve(io::Error::new(io::ErrorKind::NotConnected, "listener missing"))
        })?;

        let router = self.build_router();
        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = drain_rx.await;
        });
        let mut serve_task: JoinHandle<io::Result<()>> = tokio::spawn(
            serve
                .into_future()
                .with_subscriber(self.logging.dispatch().clone()),
        );

        self.shutdown.set_listening();
        info!(host = %self.config.network.host, port, "listening");

        let mut stop = self.shutdown.stop_receiver();
        let reason = tokio::select! {
            reason = signal => reason,
            _ = async { let _ = stop.wait_for(|requested| *requested).await; } => ShutdownReason::Requested,
            result = &mut serve_task => {
                self.shutdown.begin_shutdown();
                let err = serve_error(result);
                error!(error = %err, "server stopped unexpectedly");
                self.finish().await;
                return Err(ServerError::Serve(err));
            }
        };

        let grace = self.config.network.shutdown_grace;
        info!(
            %reason,
            in_flight = self.shutdown.in_flight_count(),
            grace_secs = grace.as_secs_f64(),
            "shutting down",
        );
        self.shutdown.begin_shutdown();
        let _ = drain_tx.send(());

        let outcome = match tokio::time::timeout(grace, &mut serve_task).await {
            Ok(Ok(Ok(()))) => ShutdownOutcome::Drained,
            Ok(result) => {
                let err = serve_error(result);
                error!(error = %err, "server failed while draining");
                self.finish().await;
                return Err(ServerError::Serve(err));
            }
            Err(_) => {
                serve_task.abort();
                ShutdownOutcome::GracePeriodElapsed {
                    abandoned: self.shutdown.in_flight_count(),
                }
            }
        };

        match outcome {
            ShutdownOutcome::Drained => info!("all in-flight requests completed"),
            ShutdownOutcome::GracePeriodElapsed { abandoned } => {
                warn!(abandoned, "grace period elapsed, abandoning in-flight requests");
            }
        }
        self.finish().await;
        Ok(outcome)
    }

    /// Closes the log sink and enters `Stopped`.
    async fn finish(&self) {
        info!(service = %self.config.service_name, "server stopped");
        if let Err(err) = self.logging.close().await {
            tracing::dispatcher::with_default(&self.logging.fallback_dispatch(), || {
                error!(error = %err, "failed to close log sink");
            });
        }
        self.shutdown.mark_stopped();
    }
}

fn serve_error(result: Result<io::Result<()>, tokio::task::JoinError>) -> io::Error {
    match result {
        Ok(Ok(())) => io::Error::other("serve loop exited"),
        Ok(Err(err)) => err,
        Err(join) => io::Error::other(join),
    }
}
