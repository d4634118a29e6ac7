use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Registry};

const DEFAULT_DIRECTIVE: &str = "karmabot_provisioner=info";

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable, colored
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation
    Json,
}

// Collects the message and the structured fields of an event or span.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let v = format!("{:?}", value).trim_matches('"').to_string();
        if field.name() == "message" {
            self.message = Some(v);
        } else {
            self.fields.insert(field.name().to_string(), Value::String(v));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Console formatter: `timestamp | LEVEL | span | message (field=value, ...)`.
pub struct PrettyFormatter;

impl<S, N> FormatEvent<S, N> for PrettyFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let now = Utc::now().format("%y-%m-%d %H:%M:%S");

        let ts_color = "\x1b[96m";
        let level_color = match *meta.level() {
            Level::TRACE => "\x1b[90m",
            Level::DEBUG => "\x1b[34m",
            Level::INFO => "\x1b[32m",
            Level::WARN => "\x1b[33m",
            Level::ERROR => "\x1b[31m",
        };
        let span_color = "\x1b[92m";
        let msg_color = "\x1b[97m";
        let field_color = "\x1b[90m";
        let reset = "\x1b[0m";

        let span_name = ctx.lookup_current().map(|span| span.name()).unwrap_or("-");

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        write!(writer, "{ts_color}{now}{reset} {field_color}|{reset} ")?;
        write!(writer, "{level_color}{:<5}{reset} {field_color}|{reset} ", *meta.level())?;
        write!(writer, "{span_color}{:<12}{reset} {field_color}|{reset} ", span_name)?;
        write!(writer, "{msg_color}{}{reset}", visitor.message.unwrap_or_default())?;

        if !visitor.fields.is_empty() {
            let mut rendered = String::new();
            for (name, value) in &visitor.fields {
                if !rendered.is_empty() {
                    rendered.push_str(", ");
                }
                write!(rendered, "{field_color}{name}={}{reset}", render_value(value))?;
            }
            write!(writer, " ({rendered})")?;
        }

        writeln!(writer)
    }
}

/// JSON formatter for structured logs: one object per line with the span fields merged in.
pub struct JsonEventFormatter;

impl<S, N> FormatEvent<S, N> for JsonEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut root = Map::new();
        root.insert("timestamp".to_string(), Value::String(ts));
        root.insert("level".to_string(), Value::String(meta.level().to_string()));
        root.insert("target".to_string(), Value::String(meta.target().to_string()));
        if let Some(file) = meta.file() {
            root.insert("filename".to_string(), Value::String(file.to_string()));
        }
        if let Some(line) = meta.line() {
            root.insert("line_number".to_string(), Value::from(line));
        }
        if let Some(message) = visitor.message.take() {
            root.insert("message".to_string(), Value::String(message));
        }

        let mut all_fields = visitor.fields;
        if let Some(span) = ctx.lookup_current() {
            all_fields.insert("span_name".to_string(), Value::String(span.name().to_string()));
            for span in span.scope() {
                if let Some(formatted) = span.extensions().get::<fmt::FormattedFields<N>>() {
                    if !formatted.fields.is_empty() {
                        all_fields
                            .entry(format!("{}_fields", span.name()))
                            .or_insert_with(|| Value::String(formatted.fields.clone()));
                    }
                }
            }
        }
        if !all_fields.is_empty() {
            root.insert("fields".to_string(), Value::Object(all_fields));
        }

        let line = serde_json::to_string(&Value::Object(root)).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

fn env_filter() -> EnvFilter {
    // `RUST_LOG` wins when set and valid
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder().with_default_directive(Level::INFO.into()).parse_lossy(DEFAULT_DIRECTIVE)
    })
}

/// Installs color_eyre and the global tracing subscriber in the requested format.
pub fn init_logging(format: LogFormat) -> color_eyre::Result<()> {
    color_eyre::install()?;

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);
    let fmt_layer = match format {
        LogFormat::Pretty => fmt_layer.event_format(PrettyFormatter).boxed(),
        LogFormat::Json => fmt_layer.event_format(JsonEventFormatter).boxed(),
    };

    let subscriber = Registry::default().with(env_filter()).with(fmt_layer).with(ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
