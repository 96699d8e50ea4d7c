//! Google Cloud structured-logging layer.
//!
//! Renders every `tracing` event as one JSON object in the format the
//! Cloud Logging agent parses from a container's output stream, merging
//! the fields of all enclosing spans (outermost first) with the event's own
//! fields. Rendered lines are handed to the [`CloudLogSink`](super::sink::CloudLogSink).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use gantry_core::Severity;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::span;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::sink::SinkMessage;

const LABELS_KEY: &str = "logging.googleapis.com/labels";
const SOURCE_LOCATION_KEY: &str = "logging.googleapis.com/sourceLocation";

/// Field values collected from a span or event.
#[derive(Debug, Default, Clone)]
struct JsonFields(Map<String, Value>);

impl Visit for JsonFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(
            field.name().to_string(),
            serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number),
        );
    }
}

/// Layer that ships JSON log entries to a cloud log sink.
#[derive(Debug)]
pub struct CloudLogLayer {
    sink: mpsc::UnboundedSender<SinkMessage>,
    app: String,
    project_id: String,
}

impl CloudLogLayer {
    #[must_use]
    pub fn new(
        sink: mpsc::UnboundedSender<SinkMessage>,
        app: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            app: app.into(),
            project_id: project_id.into(),
        }
    }
}

impl<S> Layer<S> for CloudLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = JsonFields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<JsonFields>() {
            values.record(fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = JsonFields::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(span_fields) = span.extensions().get::<JsonFields>() {
                    fields.0.extend(span_fields.0.clone());
                }
            }
        }
        event.record(&mut fields);

        let metadata = event.metadata();
        let entry = render_entry(
            &EntryMeta {
                severity: Severity::from(*metadata.level()),
                target: metadata.target(),
                file: metadata.file(),
                line: metadata.line(),
                app: &self.app,
                project_id: &self.project_id,
            },
            fields.0,
            SystemTime::now(),
        );
        // A closed sink drops entries.
        let _ = self.sink.send(SinkMessage::Entry(entry.to_string()));
    }
}

/// Static attributes of one log entry.
struct EntryMeta<'a> {
    severity: Severity,
    target: &'a str,
    file: Option<&'a str>,
    line: Option<u32>,
    app: &'a str,
    project_id: &'a str,
}

fn render_entry(meta: &EntryMeta<'_>, mut fields: Map<String, Value>, now: SystemTime) -> Value {
    let message = match fields.remove("message") {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();

    let mut entry = Map::new();
    entry.insert("severity".to_string(), json!(meta.severity));
    entry.insert("message".to_string(), Value::String(message));
    entry.insert(
        "timestamp".to_string(),
        json!({ "seconds": since_epoch.as_secs(), "nanos": since_epoch.subsec_nanos() }),
    );
    entry.insert(
        LABELS_KEY.to_string(),
        json!({ "app": meta.app, "project_id": meta.project_id }),
    );
    if let Some(file) = meta.file {
        entry.insert(
            SOURCE_LOCATION_KEY.to_string(),
            json!({ "file": file, "line": meta.line.map(|l| l.to_string()) }),
        );
    }
    entry.insert("target".to_string(), Value::String(meta.target.to_string()));
    entry.insert("app".to_string(), Value::String(meta.app.to_string()));
    entry.insert(
        "project_id".to_string(),
        Value::String(meta.project_id.to_string()),
    );
    for (key, value) in fields {
        entry.entry(key).or_insert(value);
    }
    Value::Object(entry)
}
