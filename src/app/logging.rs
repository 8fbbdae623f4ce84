//! Tracing subscriber setup, log line format, runtime level reload.

use tracing_subscriber::{reload, EnvFilter};

pub type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
pub static RELOAD_HANDLE: std::sync::OnceLock<ReloadHandle> = std::sync::OnceLock::new();

/// Map a user-facing level name onto a tracing filter directive.
/// `critical` has no tracing equivalent and maps to `error`.
pub fn filter_for(level: &str) -> Option<&'static str> {
    match level.to_lowercase().as_str() {
        "critical" | "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}

// "YYYY-MM-DD HH:MM:SS" in local time
pub struct LocalTimeFormatter;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

// "YYYY-MM-DD HH:MM:SS [LEVEL] message"
pub struct CustomEventFormat {
    ansi: bool,
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomEventFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use tracing_subscriber::fmt::time::FormatTime;

        LocalTimeFormatter.format_time(&mut writer)?;
        write!(writer, " ")?;

        let level = event.metadata().level();
        if self.ansi {
            let level_color = match *level {
                tracing::Level::TRACE => "\x1b[2m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}[{}]\x1b[0m ", level_color, level)?;
        } else {
            write!(writer, "[{}] ", level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Install the global subscriber. Colors only when `ansi` (the daemon writes to a file).
pub fn init_tracing(filter: &str, ansi: bool) {
    use tracing_subscriber::prelude::*;

    let (filter_layer, reload_handle) = reload::Layer::new(EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(ansi)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .event_format(CustomEventFormat { ansi }),
        )
        .init();

    let _ = RELOAD_HANDLE.set(reload_handle);
}

/// Swap the live filter, used by the SIGHUP handler.
pub fn reload_level(level: &str) -> anyhow::Result<()> {
    let filter = filter_for(level).ok_or_else(|| anyhow::anyhow!("Invalid log level '{}'", level))?;
    let handle = RELOAD_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("Logging is not initialised"))?;
    handle.reload(EnvFilter::new(filter))?;
    Ok(())
}
