use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Overrides `logging.filter` when set.
pub const LOG_ENV: &str = "IRECIPES_LOG";

/// Sends log records to the configured file. The terminal belongs to the UI,
/// so nothing is installed when no file is configured or it cannot be
/// opened. Returns whether a subscriber was installed.
pub fn init(config: &LoggingConfig) -> bool {
    let Some(path) = config.file.as_deref() else {
        return false;
    };
    let Some(file) = open_log_file(path) else {
        return false;
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok()
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_file_means_no_subscriber() {
        let config = LoggingConfig {
            filter: "debug".into(),
            file: None,
        };
        assert!(!init(&config));
    }

    #[test]
    fn log_file_and_parent_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("irecipes.log");
        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
    }
}
