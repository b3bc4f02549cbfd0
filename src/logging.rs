//! Tracing subscriber setup: console, activity log file, error log file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::{Result, ToolError};

/// Paths of the log files opened for one run.
#[derive(Debug, Clone)]
pub struct LogFiles {
    pub activity: PathBuf,
    pub errors: PathBuf,
}

impl LogFiles {
    /// Log file paths for a run started at `timestamp` (`YYYYMMDD_HHMMSS`).
    pub fn in_dir(dir: &Path, timestamp: &str) -> Self {
        Self {
            activity: dir.join(format!("main_activity_log_{timestamp}.txt")),
            errors: dir.join(format!("main_error_log_{timestamp}.txt")),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// level for the console and activity log; the error log always records
/// errors only.
pub fn init(files: &LogFiles) -> Result<()> {
    if let Some(parent) = files.activity.parent() {
        fs::create_dir_all(parent)?;
    }
    let activity = File::create(&files.activity)?;
    let errors = File::create(&files.errors)?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(env_filter()?))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(activity))
                .with_filter(env_filter()?),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(errors))
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn env_filter() -> Result<EnvFilter> {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_names_carry_the_timestamp() {
        let files = LogFiles::in_dir(Path::new("Logs"), "20250101_120000");
        assert_eq!(files.activity, Path::new("Logs/main_activity_log_20250101_120000.txt"));
        assert_eq!(files.errors, Path::new("Logs/main_error_log_20250101_120000.txt"));
    }
}
