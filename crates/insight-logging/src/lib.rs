//! Tracing subscriber setup for applications embedding Insight
//!
//! The Insight crates only emit `tracing` events. This crate installs a
//! subscriber for them: JSONL or pretty console output, plus optional
//! rolling JSONL files.
//!
//! # Quick Start
//!
//! ```ignore
//! use insight_logging::{InsightSubscriberBuilder, LogConfig};
//!
//! // JSONL to console
//! let _guard = InsightSubscriberBuilder::new().init()?;
//!
//! // Pretty output with the storage layer turned up
//! let _guard = InsightSubscriberBuilder::new()
//!     .with_config(LogConfig::development().with_target("insight_storage", "trace"))
//!     .init()?;
//! ```

pub mod config;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

/// Errors raised while installing the subscriber
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid filter directives: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to open log file: {0}")]
    File(#[from] std::io::Error),

    #[error("Failed to create rolling appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps background log writers alive; drop it to flush and stop them
#[must_use = "dropping the guard stops file output"]
#[derive(Default)]
pub struct LoggingGuard {
    _workers: Vec<WorkerGuard>,
}

/// Builder for configuring and initializing the Insight logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct InsightSubscriberBuilder {
    config: LogConfig,
}

impl InsightSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally
    ///
    /// `RUST_LOG` takes precedence over the configured directives. The
    /// returned guard must be kept alive while file output is wanted.
    pub fn init(self) -> Result<LoggingGuard, LoggingError> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.config.directives())?,
        };

        let (layers, workers) = self.build_layers()?;
        Registry::default().with(env_filter).with(layers).try_init()?;

        Ok(LoggingGuard { _workers: workers })
    }

    fn build_layers(&self) -> Result<(Vec<BoxedLayer>, Vec<WorkerGuard>), LoggingError> {
        let mut layers = Vec::new();
        let mut workers = Vec::new();

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }

        if let Some(file_config) = &self.config.file {
            let (writer, guard) = file_writer(file_config)?;
            workers.push(guard);
            layers.push(
                self.jsonl_layer::<Base>()
                    .with_writer(writer)
                    .boxed(),
            );
        }

        Ok((layers, workers))
    }

    fn console_layer(&self) -> BoxedLayer {
        if self.config.console.pretty {
            tracing_subscriber::fmt::layer::<Base>()
                .with_ansi(self.config.console.ansi)
                .with_target(true)
                .boxed()
        } else {
            self.jsonl_layer::<Base>().boxed()
        }
    }

    fn jsonl_layer<S>(
        &self,
    ) -> tracing_subscriber::fmt::Layer<
        S,
        tracing_subscriber::fmt::format::JsonFields,
        tracing_subscriber::fmt::format::Format<tracing_subscriber::fmt::format::Json>,
    >
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let jsonl = &self.config.jsonl;
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(jsonl.include_current_span)
            .with_span_list(jsonl.include_spans)
            .flatten_event(jsonl.flatten_events)
            .with_file(jsonl.include_location)
            .with_line_number(jsonl.include_location)
    }
}

impl Default for InsightSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for the configured file output
fn file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&file_config.directory)?;
            let path = file_config
                .directory
                .join(format!("{}.log", file_config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RotationStrategy::Daily => Rotation::DAILY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file_config.prefix.as_str())
        .filename_suffix("log");
    if let Some(max_files) = file_config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&file_config.directory)?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging for tests
///
/// Safe to call from every test: only the first call installs a subscriber.
pub fn init_testing() {
    let _ = InsightSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
