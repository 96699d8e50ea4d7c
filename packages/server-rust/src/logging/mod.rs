//! Structured logging backends and request-scoped loggers.
//!
//! A [`LogBackend`] is owned by a service instance. It builds its own
//! `tracing` dispatcher (console or cloud) on first use and never installs
//! it as the process-wide default; request futures are run inside it by the
//! HTTP middleware instead.

pub mod cloud;
pub mod sink;

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, OnceLock};

use gantry_core::RequestContext;
use parking_lot::Mutex;
use tracing::{dispatcher, Dispatch, Span};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

pub use cloud::CloudLogLayer;
pub use sink::{CloudLogSink, SinkError, SinkMessage};

/// Log field carrying the service name.
pub const FIELD_APP: &str = "app";
/// Log field carrying the request identifier.
pub const FIELD_REQUEST_ID: &str = "request_id";

/// Which backend receives log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggerKind {
    /// Human-readable lines on the console.
    #[default]
    Console,
    /// Google Cloud structured JSON entries.
    Gcp,
}

impl LoggerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Console => "Console",
            Self::Gcp => "GCP",
        }
    }
}

impl fmt::Display for LoggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("console") {
            Ok(Self::Console)
        } else if s.eq_ignore_ascii_case("gcp") {
            Ok(Self::Gcp)
        } else {
            Err(format!("expected `GCP` or `Console`, got `{s}`"))
        }
    }
}

/// In-memory log destination, mainly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter(Arc<Mutex<Vec<u8>>>);

impl MemoryWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Written output split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemoryWriter {
    type Writer = MemoryWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Where rendered log output goes.
#[derive(Debug, Clone, Default)]
pub enum LogOutput {
    #[default]
    Stdout,
    Memory(MemoryWriter),
    /// Console output goes to the memory writer; every cloud sink write fails.
    #[cfg(test)]
    Broken(MemoryWriter),
}

impl LogOutput {
    fn make_writer(&self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(io::stdout),
            Self::Memory(writer) => BoxMakeWriter::new(writer.clone()),
            #[cfg(test)]
            Self::Broken(writer) => BoxMakeWriter::new(writer.clone()),
        }
    }

    fn writer(&self) -> Box<dyn Write + Send> {
        match self {
            Self::Stdout => Box::new(io::stdout()),
            Self::Memory(writer) => Box::new(writer.clone()),
            #[cfg(test)]
            Self::Broken(_) => Box::new(FailingWriter),
        }
    }
}

#[cfg(test)]
struct FailingWriter;

#[cfg(test)]
impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "log stream closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "log stream closed"))
    }
}

/// Logging configuration resolved at instance construction.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub kind: LoggerKind,
    /// Cloud project receiving entries; required for [`LoggerKind::Gcp`].
    pub project_id: Option<String>,
    /// `EnvFilter` directives.
    pub filter: String,
    pub output: LogOutput,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            kind: LoggerKind::Console,
            project_id: None,
            filter: "info".to_string(),
            output: LogOutput::Stdout,
        }
    }
}

struct Installed {
    dispatch: Dispatch,
    sink: Option<CloudLogSink>,
}

/// The logging backend of one service instance.
pub struct LogBackend {
    service: String,
    version: String,
    port: AtomicU16,
    config: LoggingConfig,
    installed: OnceLock<Installed>,
}

impl fmt::Debug for LogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBackend")
            .field("service", &self.service)
            .field("kind", &self.config.kind)
            .field("initialized", &self.installed.get().is_some())
            .finish_non_exhaustive()
    }
}

impl LogBackend {
    /// Creates a backend. Nothing is initialized until first use.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        version: impl Into<String>,
        port: u16,
        config: LoggingConfig,
    ) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            port: AtomicU16::new(port),
            config,
            installed: OnceLock::new(),
        }
    }

    /// Name of the owning service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Backend selected by configuration.
    #[must_use]
    pub fn kind(&self) -> LoggerKind {
        self.config.kind
    }

    /// Sets the port named in the startup announcement.
    ///
    /// Has no effect once the backend is initialized.
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn has_cloud_sink(&self) -> bool {
        self.installed.get().is_some_and(|i| i.sink.is_some())
    }

    #[cfg(test)]
    pub(crate) fn cloud_sink_closed(&self) -> bool {
        self.installed
            .get()
            .and_then(|i| i.sink.as_ref())
            .is_some_and(CloudLogSink::is_closed)
    }

    /// The dispatcher all log output of this instance goes through.
    ///
    /// Initializes the backend on first call and announces the selection.
    pub fn dispatch(&self) -> &Dispatch {
        &self.installed().dispatch
    }

    fn installed(&self) -> &Installed {
        self.installed.get_or_init(|| {
            let installed = self.install();
            dispatcher::with_default(&installed.dispatch, || self.announce(&installed));
            installed
        })
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.config.filter).unwrap_or_else(|_| EnvFilter::new("info"))
    }

    fn install(&self) -> Installed {
        if self.config.kind == LoggerKind::Console {
            return self.console();
        }

        let project_id = self.config.project_id.clone().unwrap_or_default();
        match CloudLogSink::spawn(self.config.output.writer()) {
            Ok(sink) => {
                let layer = CloudLogLayer::new(sink.sender(), &self.service, project_id);
                let subscriber = tracing_subscriber::registry()
                    .with(self.env_filter())
                    .with(layer);
                Installed {
                    dispatch: Dispatch::new(subscriber),
                    sink: Some(sink),
                }
            }
            Err(err) => {
                let installed = self.console();
                dispatcher::with_default(&installed.dispatch, || {
                    tracing::error!(error = %err, "failed to start cloud log sink, logging to console");
                });
                installed
            }
        }
    }

    fn console(&self) -> Installed {
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(matches!(self.config.output, LogOutput::Stdout))
            .with_writer(self.config.output.make_writer());
        let subscriber = tracing_subscriber::registry()
            .with(self.env_filter())
            .with(layer);
        Installed {
            dispatch: Dispatch::new(subscriber),
            sink: None,
        }
    }

    fn announce(&self, installed: &Installed) {
        let backend = if installed.sink.is_some() {
            LoggerKind::Gcp
        } else {
            LoggerKind::Console
        };
        let project_id = self.config.project_id.as_deref().unwrap_or_default();
        let port = self.port.load(Ordering::Relaxed);
        tracing::info!(
            app = %self.service,
            version = %self.version,
            project_id,
            port,
            "[{backend}] {} [{project_id}] version {} at {port}",
            self.service,
            self.version,
        );
    }

    /// Returns a structured logger carrying the request identifier and
    /// service name of `ctx`.
    #[must_use]
    pub fn logger_for(&self, ctx: &RequestContext) -> RequestLogger {
        let dispatch = self.dispatch().clone();
        let span = dispatcher::with_default(&dispatch, || {
            tracing::info_span!(
                "request",
                app = %ctx.service,
                request_id = %ctx.request_id,
            )
        });
        RequestLogger {
            dispatch,
            span,
            ctx: ctx.clone(),
        }
    }

    /// A console dispatcher for reporting problems with the backend itself,
    /// e.g. after the cloud sink is gone.
    #[must_use]
    pub fn fallback_dispatch(&self) -> Dispatch {
        self.console().dispatch
    }

    /// Closes the cloud sink, flushing pending entries.
    ///
    /// Does nothing for the console backend or when called again.
    ///
    /// # Errors
    ///
    /// Returns the sink's [`SinkError`] if flushing or writing failed.
    pub async fn close(&self) -> Result<(), SinkError> {
        match self.installed.get().and_then(|i| i.sink.as_ref()) {
            Some(sink) => sink.close().await,
            None => Ok(()),
        }
    }
}

/// Logger bound to one request: every entry carries `app` and `request_id`.
#[derive(Clone)]
pub struct RequestLogger {
    dispatch: Dispatch,
    span: Span,
    ctx: RequestContext,
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl RequestLogger {
    /// Request scope this logger was created for.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// The request span. Futures instrumented with it log with the request fields.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Runs `f` with this logger's dispatcher and request span active, so any
    /// `tracing` macro inside it is attributed to the request.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::debug!("{message}"));
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::info!("{message}"));
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::warn!("{message}"));
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.in_scope(|| tracing::error!("{message}"));
    }
}
