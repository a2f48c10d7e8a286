//! Structured JSONL logging with router context for Switchyard
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines for log aggregation (default)
//! - **Router Context**: Attribute spans to the router node a thread serves
//! - **Per-output Levels**: Console and file layers filter independently
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use switchyard_logging::{LogConfig, SwitchyardSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = SwitchyardSubscriberBuilder::new().init()?;
//!
//! // Development mode with pretty human-readable output
//! let _guard = SwitchyardSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! # Router Context
//!
//! ```ignore
//! use switchyard_logging::RouterContextGuard;
//!
//! let _ctx = RouterContextGuard::new(router.identity());
//! let span = RouterContextGuard::current().unwrap().span();
//! let _entered = span.enter();
//!
//! // Events here carry router = "area0/router0"
//! tracing::info!("Maintenance task started");
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleFormat, ConsoleOutput, FileOutput, JsonFields, LogConfig, RotationStrategy};
pub use context::{RouterContextData, RouterContextGuard};
pub use layers::{RouterContextExtension, RouterContextLayer, jsonl_layer};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Log directory or file could not be created
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// Rolling appender could not be created
    #[error("Log appender error: {0}")]
    Appender(#[from] InitError),

    /// A global subscriber is already installed
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// A type-erased layer over the base registry
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builder for configuring and initializing the Switchyard logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct SwitchyardSubscriberBuilder {
    config: LogConfig,
}

impl SwitchyardSubscriberBuilder {
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
        self.config.level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, file: FileOutput) -> Self {
        self.config.file = Some(file);
        self
    }

    /// Build the layers without installing them
    ///
    /// The returned guard (if any) must outlive the subscriber or buffered
    /// file output is lost.
    pub fn build_layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LoggingError> {
        let context: BoxedLayer = RouterContextLayer::new().boxed();
        let mut layers = vec![context];
        let mut guard = None;

        if self.config.console.enabled {
            let filter = level_filter(self.config.console_level());
            let console = match self.config.console.format {
                ConsoleFormat::Pretty => tracing_subscriber::fmt::layer::<Registry>()
                    .with_ansi(self.config.console.ansi)
                    .with_target(true)
                    .with_filter(filter)
                    .boxed(),
                ConsoleFormat::Json => {
                    jsonl_layer::<Registry, _>(std::io::stdout, &self.config.json)
                        .with_filter(filter)
                        .boxed()
                }
            };
            layers.push(console);
        }

        if let Some(file) = &self.config.file {
            let (writer, file_guard) = file_writer(file)?;
            guard = Some(file_guard);
            layers.push(
                jsonl_layer::<Registry, _>(writer, &self.config.json)
                    .with_filter(level_filter(&self.config.level))
                    .boxed(),
            );
        }

        Ok((layers, guard))
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer guard, which must be kept alive for the
    /// duration of the program when file output is enabled.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let (layers, guard) = self.build_layers()?;
        Registry::default()
            .with(layers)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(guard)
    }
}

impl Default for SwitchyardSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `RUST_LOG` if set, otherwise `level`
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Create the non-blocking writer for file output
fn file_writer(file: &FileOutput) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&file.directory)?;

    let rotation = match file.rotation {
        RotationStrategy::Never => {
            let path = file.directory.join(format!("{}.log", file.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file.prefix.clone())
        .filename_suffix("log");
    if let Some(max_files) = file.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&file.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Result<(), LoggingError> {
    SwitchyardSubscriberBuilder::new().init().map(|_| ())
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Result<(), LoggingError> {
    SwitchyardSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Initialize logging for a deployed router: JSONL files only
///
/// The returned guard must be held until shutdown.
pub fn init_production(
    directory: impl Into<PathBuf>,
) -> Result<Option<WorkerGuard>, LoggingError> {
    SwitchyardSubscriberBuilder::new()
        .with_console(false)
        .with_file_output(FileOutput::in_directory(directory))
        .init()
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; later calls are ignored.
pub fn init_testing() {
    let _ = SwitchyardSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
