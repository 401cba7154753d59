use crate::ledger::DEFAULT_RECENT_LIMIT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Optional `rollcall.toml` overrides. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub ledger_path: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
    pub directory_path: Option<PathBuf>,
    pub recent_limit: Option<usize>,
    pub input: Option<PathBuf>,
}

/// Runtime configuration shared by the daemon and the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Append-only attendance log (default: `<data_dir>/attendance_log.csv`).
    pub ledger_path: PathBuf,
    /// Derived per-identity counts (default: `<data_dir>/attendance_summary.csv`).
    pub summary_path: PathBuf,
    /// Id-to-name map (default: `<data_dir>/id_to_name_map.json`).
    pub directory_path: PathBuf,
    /// Number of trailing events shown in a report.
    pub recent_limit: usize,
    /// Detection feed for the daemon; stdin when unset.
    pub input: Option<PathBuf>,
}

impl Config {
    /// Defaults, then the TOML file (`ROLLCALL_CONFIG` or
    /// `<data_dir>/rollcall.toml`, if present), then `ROLLCALL_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let data_dir = lookup("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let file_path = lookup("ROLLCALL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("rollcall.toml"));
        let file = read_file_config(&file_path)?;
        Ok(Self::resolve(data_dir, file, lookup))
    }

    /// Layer `file` and the variables returned by `env` over the defaults.
    pub fn resolve<F>(data_dir: PathBuf, file: FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, from_file: Option<PathBuf>, default: &str| {
            env(key)
                .map(PathBuf::from)
                .or(from_file)
                .unwrap_or_else(|| data_dir.join(default))
        };

        let ledger_path = path("ROLLCALL_LEDGER_PATH", file.ledger_path, "attendance_log.csv");
        let summary_path = path(
            "ROLLCALL_SUMMARY_PATH",
            file.summary_path,
            "attendance_summary.csv",
        );
        let directory_path = path(
            "ROLLCALL_DIRECTORY_PATH",
            file.directory_path,
            "id_to_name_map.json",
        );
        let recent_limit = env("ROLLCALL_RECENT_LIMIT")
            .and_then(|v| v.parse().ok())
            .or(file.recent_limit)
            .unwrap_or(DEFAULT_RECENT_LIMIT);
        let input = env("ROLLCALL_INPUT").map(PathBuf::from).or(file.input);

        Self {
            data_dir,
            ledger_path,
            summary_path,
            directory_path,
            recent_limit,
            input,
        }
    }
}

/// `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share/rollcall`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    tracing::debug!(path = %path.display(), "loading config file");
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
