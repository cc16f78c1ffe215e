use outflux_config::Environment;
use std::io::Error;
use std::path::PathBuf;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// Directory the production log files are written to.
const DEFAULT_LOG_DIR: &str = "logs";

/// Number of daily log files kept before the oldest is removed.
const DEFAULT_MAX_LOG_FILES: usize = 7;

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Keeps the background log writer alive.
///
/// Dropping a [`LogFlusher::Flusher`] flushes the pending lines, so the binary holds it
/// until it exits.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

/// Where and how production logs are written.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Prefix of the log file names, usually the binary name.
    pub app_name: String,
    pub log_dir: PathBuf,
    pub max_log_files: usize,
}

impl LogOptions {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            max_log_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

static INIT_TEST_TRACING: Once = Once::new();

/// Call this function once at the beginning of a test and then set the ENABLE_TRACING
/// environment variable to 1 to view tracing in the terminal:
///
/// ENABLE_TRACING=1 cargo test <test_name>
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Tests always log to the terminal, whatever APP_ENVIRONMENT says.
            Environment::Dev.set();
            if let Err(err) = init_tracing("test") {
                eprintln!("failed to initialize tracing for tests: {err}");
            }
        }
    });
}

/// Initializes tracing with the default [`LogOptions`] for `app_name`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    init_tracing_with_options(&LogOptions::new(app_name))
}

/// Initializes the global subscriber.
///
/// Production and staging write JSON lines, including the current span list, into daily
/// rolling files. Development prints pretty output to the terminal. Records emitted through
/// the `log` crate by dependencies are forwarded to `tracing`.
pub fn init_tracing_with_options(options: &LogOptions) -> Result<LogFlusher, TracingError> {
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, options)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

fn configure_prod_tracing(
    filter: EnvFilter,
    options: &LogOptions,
) -> Result<LogFlusher, TracingError> {
    let file_appender = rolling::Builder::new()
        .filename_prefix(&options.app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(options.max_log_files)
        .build(&options.log_dir)?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    // Span fields carry the measure and stage ids of every pipe event.
    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(file_appender)
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Routes panics through `tracing` before running the previous hook, so they end up in the
/// log files and not only on stderr.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        panic.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_options_default_to_logs_directory() {
        let options = LogOptions::new("outflux-migrator");
        assert_eq!(options.app_name, "outflux-migrator");
        assert_eq!(options.log_dir, PathBuf::from("logs"));
        assert_eq!(options.max_log_files, DEFAULT_MAX_LOG_FILES);
    }
}
