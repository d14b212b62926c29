use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const DEFAULT_LOG_FILE_NAME: &str = "mongo_scope.log";

static GLOBAL_SETTINGS: OnceLock<RwLock<AppSettings>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    pub const fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub default_host: String,
    pub default_port: u16,
    pub default_sample_count: u32,
    pub schema_sample_size: u32,
    pub query_timeout_secs: u64,
    pub hide_system_databases: bool,
    pub logging_enabled: bool,
    pub logging_level: LogLevel,
    pub logging_path: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_host: String::from("localhost"),
            default_port: 27017,
            default_sample_count: 2,
            schema_sample_size: 100,
            query_timeout_secs: 600,
            hide_system_databases: true,
            logging_enabled: false,
            logging_level: LogLevel::Info,
            logging_path: DEFAULT_LOG_FILE_NAME.to_string(),
        }
    }
}

impl AppSettings {
    /// Zero disables the per-query server-side time limit.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }

    /// Reads `settings.toml` next to the binary; writes the defaults back
    /// when the file is missing so the user has something to edit.
    pub fn load_or_init() -> Self {
        match fs::read_to_string(SETTINGS_FILE_NAME) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => settings,
                Err(error) => {
                    eprintln!("failed to parse {SETTINGS_FILE_NAME}: {error}");
                    Self::default()
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                let settings = Self::default();
                if let Err(error) = settings.save() {
                    eprintln!("failed to write {SETTINGS_FILE_NAME}: {error}");
                }
                settings
            }
            Err(error) => {
                eprintln!("failed to read {SETTINGS_FILE_NAME}: {error}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> io::Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        fs::write(SETTINGS_FILE_NAME, contents)
    }
}

pub fn init_global(settings: AppSettings) {
    match GLOBAL_SETTINGS.get() {
        Some(lock) => {
            let mut guard = lock.write().expect("settings lock poisoned");
            *guard = settings;
        }
        None => {
            let _ = GLOBAL_SETTINGS.set(RwLock::new(settings));
        }
    }
}

pub fn global() -> AppSettings {
    GLOBAL_SETTINGS
        .get()
        .map(|lock| lock.read().expect("settings lock poisoned").clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_toml() {
        let mut settings = AppSettings::default();
        settings.default_host = String::from("db.internal");
        settings.default_port = 27018;
        settings.logging_level = LogLevel::Debug;

        let serialized = toml::to_string_pretty(&settings).expect("serializes");
        let parsed: AppSettings = toml::from_str(&serialized).expect("parses");
        assert_eq!(parsed, settings);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: AppSettings =
            toml::from_str("default_host = \"example\"\n").expect("parses");
        assert_eq!(parsed.default_host, "example");
        assert_eq!(parsed.default_port, 27017);
        assert_eq!(parsed.default_sample_count, 2);
        assert!(parsed.hide_system_databases);
    }

    #[test]
    fn zero_timeout_disables_the_limit() {
        let mut settings = AppSettings::default();
        settings.query_timeout_secs = 0;
        assert_eq!(settings.query_timeout(), None);

        settings.query_timeout_secs = 30;
        assert_eq!(settings.query_timeout(), Some(Duration::from_secs(30)));
    }
}
