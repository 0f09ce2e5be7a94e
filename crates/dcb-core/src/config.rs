use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Platform names a store may not be named after, regardless of case
/// (reserved on Windows; rejected everywhere for portability).
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const INVALID_PATH_CHARS: &[char] = &['\0'];

/// The engine's configuration surface. Construct via
/// [`EngineConfig::builder`]; invalid configuration surfaces as a
/// single `Error::InvalidConfig` listing every offending field, not
/// just the first one found.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root_path: PathBuf,
    pub store_name: String,
    pub cross_process_lock_timeout: Duration,
    pub flush_events_immediately: bool,
    pub write_protect_event_files: bool,
    pub write_protect_projection_files: bool,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root_path.join(&self.store_name)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    root_path: Option<PathBuf>,
    store_name: Option<String>,
    cross_process_lock_timeout: Duration,
    flush_events_immediately: bool,
    write_protect_event_files: bool,
    write_protect_projection_files: bool,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            root_path: None,
            store_name: None,
            cross_process_lock_timeout: Duration::from_secs(30),
            flush_events_immediately: true,
            write_protect_event_files: false,
            write_protect_projection_files: false,
        }
    }
}

impl EngineConfigBuilder {
    pub fn root_path(mut self, root_path: impl Into<PathBuf>) -> Self {
        self.root_path = Some(root_path.into());
        self
    }

    pub fn store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    pub fn cross_process_lock_timeout(mut self, timeout: Duration) -> Self {
        self.cross_process_lock_timeout = timeout;
        self
    }

    pub fn flush_events_immediately(mut self, flush: bool) -> Self {
        self.flush_events_immediately = flush;
        self
    }

    pub fn write_protect_event_files(mut self, protect: bool) -> Self {
        self.write_protect_event_files = protect;
        self
    }

    pub fn write_protect_projection_files(mut self, protect: bool) -> Self {
        self.write_protect_projection_files = protect;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let mut offending = Vec::new();

        let root_path = match &self.root_path {
            Some(p) if is_valid_root_path(p) => Some(p.clone()),
            Some(_) => {
                offending.push("root_path".to_string());
                None
            }
            None => {
                offending.push("root_path".to_string());
                None
            }
        };

        let store_name = match &self.store_name {
            Some(name) if is_valid_store_name(name) => Some(name.clone()),
            Some(_) => {
                offending.push("store_name".to_string());
                None
            }
            None => {
                offending.push("store_name".to_string());
                None
            }
        };

        if self.cross_process_lock_timeout.is_zero() {
            offending.push("cross_process_lock_timeout".to_string());
        }

        if !offending.is_empty() {
            return Err(Error::InvalidConfig { fields: offending });
        }

        Ok(EngineConfig {
            root_path: root_path.expect("validated above"),
            store_name: store_name.expect("validated above"),
            cross_process_lock_timeout: self.cross_process_lock_timeout,
            flush_events_immediately: self.flush_events_immediately,
            write_protect_event_files: self.write_protect_event_files,
            write_protect_projection_files: self.write_protect_projection_files,
        })
    }
}

fn is_valid_root_path(path: &Path) -> bool {
    if path.as_os_str().is_empty() || !path.is_absolute() {
        return false;
    }
    let as_str = path.to_string_lossy();
    !as_str.chars().any(|c| INVALID_PATH_CHARS.contains(&c))
}

fn is_valid_store_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.chars().any(|c| {
        matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
    }) {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    let stem = upper.split('.').next().unwrap_or(&upper);
    !RESERVED_NAMES.contains(&stem)
}
