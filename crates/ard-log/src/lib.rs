use std::path::PathBuf;

use chrono::{Datelike, Timelike};
// Re-export logging functions for convenience.
pub use log::*;
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};
use thiserror::Error;

/// Settings for [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Logs below this level are discarded.
    pub level: LevelFilter,
    /// Directory receiving a log file named after the current time. No file is written when
    /// `None`.
    pub file_dir: Option<PathBuf>,
    /// `log4rs` pattern used by every appender.
    pub pattern: String,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("unable to open log file: {0}")]
    File(#[from] std::io::Error),
    #[error("invalid logging configuration: {0}")]
    Config(#[from] log4rs::config::runtime::ConfigErrors),
    #[error("a logger is already installed: {0}")]
    AlreadyInitialized(#[from] SetLoggerError),
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_dir: None,
            pattern: String::from("{d} {l} {t} - {m}{n}"),
        }
    }
}

/// Initializes logging. Should be called before any other logging functions. Panics are routed
/// through the logger afterwards.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    // Output to console
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(&config.pattern)))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
    let mut root = Root::builder().appender("stdout");

    // Output to log file. Name of the file is based on the current time.
    if let Some(dir) = &config.file_dir {
        let now = chrono::Utc::now();
        let log_file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(&config.pattern)))
            .build(dir.join(format!(
                "{} {} {} {} {} {}.txt",
                now.year(),
                now.month(),
                now.day(),
                now.hour(),
                now.minute(),
                now.second()
            )))?;

        builder = builder.appender(Appender::builder().build("log_file", Box::new(log_file)));
        root = root.appender("log_file");
    }

    let log_config = builder.build(root.build(config.level))?;
    log4rs::init_config(log_config)?;

    log_panics::init();
    Ok(())
}
