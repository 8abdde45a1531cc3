use chrono::Utc;
use colored::*;
use std::fmt::Write as _;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber: one colored line per event with the
/// timestamp, level, target and fields.
///
/// `RUST_LOG` controls the level (default: info), e.g.
/// `RUST_LOG=agentrun_sdk_rs=debug cargo run --example agent_demo`.
/// Calling it again after a subscriber is installed does nothing.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .event_format(RunFormatter)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging was already initialized");
    }
}

struct RunFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for RunFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

        write!(
            writer,
            "{} {} {} ",
            now.dimmed(),
            level_label(metadata.level()),
            metadata.target().dimmed()
        )?;

        let mut line = EventLine::default();
        event.record(&mut line);
        writeln!(writer, "{}{}", line.message, line.fields)
    }
}

fn level_label(level: &tracing::Level) -> ColoredString {
    match *level {
        tracing::Level::ERROR => "ERROR".red().bold(),
        tracing::Level::WARN => "WARN".yellow().bold(),
        tracing::Level::INFO => "INFO".green().bold(),
        tracing::Level::DEBUG => "DEBUG".blue().bold(),
        tracing::Level::TRACE => "TRACE".magenta().bold(),
    }
}

/// Collects the message unescaped and every other field as ` key=value`.
#[derive(Default)]
struct EventLine {
    message: String,
    fields: String,
}

impl tracing::field::Visit for EventLine {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}
