use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Console,
}

impl LogFormat {
    /// Unknown formats fall back to console output.
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Console,
        }
    }
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    match raw.trim().to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        _ => Err(format!(
            "Invalid logging.level '{}'. Valid values: trace, debug, info, warn, error",
            raw
        )),
    }
}

fn severity_number(level: &Level) -> u64 {
    match *level {
        Level::TRACE => 1,
        Level::DEBUG => 5,
        Level::INFO => 9,
        Level::WARN => 13,
        Level::ERROR => 17,
    }
}

#[derive(Default)]
struct JsonFieldVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonFieldVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::from(format!("{:?}", value)));
    }
}

/// Resource attributes stamped onto every JSON record.
#[derive(Clone)]
struct ServiceResource {
    name: String,
    version: String,
}

impl ServiceResource {
    fn to_value(&self) -> Value {
        let mut resource = Map::new();
        resource.insert("service.name".to_string(), Value::from(self.name.clone()));
        resource.insert(
            "service.version".to_string(),
            Value::from(self.version.clone()),
        );
        Value::Object(resource)
    }
}

/// Shapes recorded event fields into an OTel log record.
///
/// `event_name`, `event_domain` and `source` are promoted to their dotted
/// semantic-convention names; `message` becomes the body.
fn otel_record(
    metadata: &Metadata<'_>,
    mut attributes: Map<String, Value>,
    resource: &ServiceResource,
    timestamp: String,
) -> Value {
    for (from, to) in [
        ("event_name", "event.name"),
        ("event_domain", "event.domain"),
        ("source", "auth.source"),
    ] {
        if let Some(v) = attributes.remove(from) {
            attributes.insert(to.to_string(), v);
        }
    }
    if let Some(file) = metadata.file() {
        attributes.insert("code.filepath".to_string(), Value::from(file));
    }
    if let Some(line) = metadata.line() {
        attributes.insert("code.lineno".to_string(), Value::from(line));
    }
    attributes.insert("code.target".to_string(), Value::from(metadata.target()));

    let body = match attributes.remove("message") {
        Some(Value::String(s)) => s,
        _ => metadata.name().to_string(),
    };

    let mut root = Map::new();
    root.insert("timestamp".to_string(), Value::from(timestamp));
    root.insert(
        "severity_text".to_string(),
        Value::from(metadata.level().as_str()),
    );
    root.insert(
        "severity_number".to_string(),
        Value::from(severity_number(metadata.level())),
    );
    root.insert("body".to_string(), Value::from(body));
    root.insert("resource".to_string(), resource.to_value());
    root.insert("attributes".to_string(), Value::Object(attributes));
    Value::Object(root)
}

#[derive(Clone)]
struct OtelJsonEventFormatter {
    resource: ServiceResource,
}

impl<S, N> FormatEvent<S, N> for OtelJsonEventFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = JsonFieldVisitor::default();
        event.record(&mut visitor);

        let record = otel_record(
            event.metadata(),
            visitor.fields,
            &self.resource,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let serialized = serde_json::to_string(&record).map_err(|_| std::fmt::Error)?;
        writer.write_str(&serialized)?;
        writer.write_char('\n')
    }
}

/// Installs the global subscriber. `RUST_LOG` directives, when present, are
/// layered on top of the configured level.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<(), String> {
    let level_filter = parse_level(&logging_config.level)?;

    let mut filter_layer = EnvFilter::default().add_directive(level_filter.into());
    if let Ok(directives) = std::env::var("RUST_LOG") {
        for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
            match directive.trim().parse() {
                Ok(d) => filter_layer = filter_layer.add_directive(d),
                Err(e) => return Err(format!("Invalid RUST_LOG directive '{}': {}", directive, e)),
            }
        }
    }

    let registry = tracing_subscriber::registry().with(filter_layer);
    let result = match LogFormat::parse(&logging_config.format) {
        LogFormat::Json => registry
            .with(fmt::layer().event_format(OtelJsonEventFormatter {
                resource: ServiceResource {
                    name: logging_config.service_name.clone(),
                    version: logging_config.service_version.clone(),
                },
            }))
            .try_init(),
        LogFormat::Console => registry.with(fmt::layer().pretty()).try_init(),
    };
    result.map_err(|e| format!("Failed to install logging subscriber: {}", e))
}
