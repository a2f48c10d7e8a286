//! Logging configuration
//!
//! Every struct here is `#[serde(default)]`, so a router's TOML file only
//! carries the fields it changes:
//!
//! ```toml
//! level = "debug"
//!
//! [console]
//! format = "pretty"
//!
//! [file]
//! directory = "/var/log/switchyard"
//! rotation = "hourly"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub console: ConsoleOutput,
    /// Rolling JSONL file output, disabled when absent
    pub file: Option<FileOutput>,
    /// Fields included in JSONL records (console and file)
    pub json: JsonFields,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleOutput::default(),
            file: None,
            json: JsonFields::default(),
        }
    }
}

impl LogConfig {
    /// Pretty, colored console output at debug
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleOutput {
                format: ConsoleFormat::Pretty,
                ansi: true,
                ..ConsoleOutput::default()
            },
            ..Self::default()
        }
    }

    /// Warnings only, no colors
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            ..Self::default()
        }
    }

    /// Filter directive for the console layer
    pub fn console_level(&self) -> &str {
        self.console.level.as_deref().unwrap_or(&self.level)
    }
}

/// How console records are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    #[default]
    Json,
    Pretty,
}

/// Console output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleOutput {
    pub enabled: bool,
    pub format: ConsoleFormat,
    /// ANSI colors (pretty format only)
    pub ansi: bool,
    /// Overrides [`LogConfig::level`] for the console
    pub level: Option<String>,
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Json,
            ansi: false,
            level: None,
        }
    }
}

/// File output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutput {
    pub directory: PathBuf,
    /// File name prefix; files are named `<prefix>.<date>.log`
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files kept on disk, unlimited if `None`
    pub max_files: Option<usize>,
}

impl FileOutput {
    /// Daily-rotated files under `directory`
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }
}

impl Default for FileOutput {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "switchyard".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(7),
        }
    }
}

/// When the log file is rolled over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One `<prefix>.log`, truncated on start
    Never,
}

/// Optional parts of a JSONL record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Event fields at the top level instead of under `fields`
    pub flatten: bool,
    /// Every entered span, outermost first
    pub span_list: bool,
    pub current_span: bool,
    /// Source file and line
    pub location: bool,
    /// Thread id and name
    pub thread: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            flatten: true,
            span_list: true,
            current_span: true,
            location: true,
            thread: false,
        }
    }
}
