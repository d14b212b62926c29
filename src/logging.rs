use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::settings::DEFAULT_LOG_FILE_NAME;

const LOG_ROTATE_BYTES: u64 = 100 * 1024;

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Configures the process-wide logger from the settings file. Lines go to
/// stderr and, best effort, to a size-rotated log file; file trouble never
/// disturbs the application.
pub fn apply_settings(enabled: bool, level: LevelFilter, file_path: &str) {
    let trimmed = file_path.trim();
    let path = if trimmed.is_empty() {
        PathBuf::from(DEFAULT_LOG_FILE_NAME)
    } else {
        PathBuf::from(trimmed)
    };

    let logger = LOGGER.get_or_init(|| Logger { level, path, file: Mutex::new(None) });
    let _ = log::set_logger(logger);
    log::set_max_level(if enabled { logger.level } else { LevelFilter::Off });
}

struct Logger {
    level: LevelFilter,
    path: PathBuf,
    file: Mutex<Option<FileState>>,
}

impl Logger {
    fn is_app_target(target: &str) -> bool {
        target == "mongo_scope" || target.starts_with("mongo_scope::")
    }

    fn write_to_file(&self, bytes: &[u8]) {
        let mut guard = self.file.lock().expect("logger file lock poisoned");

        if guard.is_none() {
            *guard = FileState::open(self.path.clone()).ok();
        }

        let Some(state) = guard.as_mut() else {
            return;
        };

        if state.write(bytes).is_err() {
            *guard = None;
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && Self::is_app_target(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!(
            "{timestamp} [{level}] {message}\n",
            level = record.level(),
            message = record.args()
        );

        let _ = io::stderr().write_all(line.as_bytes());
        self.write_to_file(line.as_bytes());
    }

    fn flush(&self) {}
}

struct FileState {
    path: PathBuf,
    file: File,
    size: u64,
}

impl FileState {
    fn open(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        Ok(Self { path, file, size })
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.rotate_if_needed(bytes.len() as u64)?;
        self.file.write_all(bytes)?;
        self.size = self.size.saturating_add(bytes.len() as u64);
        Ok(())
    }

    fn rotate_if_needed(&mut self, next_len: u64) -> io::Result<()> {
        if self.size + next_len <= LOG_ROTATE_BYTES {
            return Ok(());
        }

        rotate_log_file(&self.path)?;
        self.file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

fn rotate_log_file(path: &Path) -> io::Result<()> {
    let rotated = rotated_log_path(path);
    if rotated.exists() {
        let _ = fs::remove_file(&rotated);
    }
    if path.exists() {
        fs::rename(path, rotated)?;
    }
    Ok(())
}

fn rotated_log_path(path: &Path) -> PathBuf {
    let file_name =
        path.file_name().and_then(|name| name.to_str()).unwrap_or(DEFAULT_LOG_FILE_NAME);
    path.with_file_name(format!("{file_name}.1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_path_appends_a_suffix() {
        let rotated = rotated_log_path(Path::new("logs/mongo_scope.log"));
        assert_eq!(rotated, PathBuf::from("logs/mongo_scope.log.1"));
    }

    #[test]
    fn app_targets_are_recognized() {
        assert!(Logger::is_app_target("mongo_scope"));
        assert!(Logger::is_app_target("mongo_scope::mongo::query"));
        assert!(!Logger::is_app_target("mongodb::connection"));
        assert!(!Logger::is_app_target("mongo_scope_extra"));
    }
}
