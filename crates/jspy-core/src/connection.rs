//! Kernel connection info and connection-file discovery
//!
//! A running kernel publishes its ports and signing key in a JSON
//! connection file, normally `kernel-<id>.json` in the Jupyter runtime
//! directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

/// Connection errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection file not found: {0}")]
    NotFound(String),

    #[error("Failed to read connection file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse connection file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Parameters needed to attach to a running kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default = "default_transport")]
    pub transport: String,

    #[serde(default = "default_ip")]
    pub ip: String,

    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,

    #[serde(default)]
    pub control_port: u16,

    #[serde(default)]
    pub hb_port: u16,

    #[serde(default)]
    pub key: String,

    #[serde(default = "default_signature_scheme")]
    pub signature_scheme: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
}

fn default_transport() -> String {
    "tcp".to_string()
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_signature_scheme() -> String {
    "hmac-sha256".to_string()
}

impl ConnectionInfo {
    /// Endpoint URL for a port, e.g. `tcp://127.0.0.1:5555`
    pub fn endpoint(&self, port: u16) -> String {
        if self.transport == "ipc" {
            format!("ipc://{}-{}", self.ip, port)
        } else {
            format!("{}://{}:{}", self.transport, self.ip, port)
        }
    }
}

/// What the user supplied to locate a kernel
#[derive(Debug, Clone)]
pub enum ConnectInfo {
    /// Connection info given directly
    Info(ConnectionInfo),
    /// A connection file name or path, resolved through discovery
    File(String),
}

impl ConnectInfo {
    /// Resolve to concrete connection info, reading the file if needed
    pub fn resolve(&self) -> ConnectionResult<ConnectionInfo> {
        match self {
            Self::Info(info) => Ok(info.clone()),
            Self::File(name) => {
                let path = find_connection_file(name)?;
                load_connection_file(&path)
            }
        }
    }
}

impl From<ConnectionInfo> for ConnectInfo {
    fn from(info: ConnectionInfo) -> Self {
        Self::Info(info)
    }
}

impl From<&str> for ConnectInfo {
    fn from(name: &str) -> Self {
        Self::File(name.to_string())
    }
}

impl From<String> for ConnectInfo {
    fn from(name: String) -> Self {
        Self::File(name)
    }
}

/// Read a connection file
pub fn load_connection_file(path: &Path) -> ConnectionResult<ConnectionInfo> {
    let content = std::fs::read_to_string(path)?;
    let info = serde_json::from_str(&content)?;
    debug!("Loaded connection file: {}", path.display());
    Ok(info)
}

/// Parse connection info from an already decoded JSON mapping
pub fn load_connection_info(value: serde_json::Value) -> ConnectionResult<ConnectionInfo> {
    Ok(serde_json::from_value(value)?)
}

/// Jupyter runtime directory: `JUPYTER_RUNTIME_DIR`, else `<data dir>/jupyter/runtime`
pub fn runtime_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("JUPYTER_RUNTIME_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join("jupyter").join("runtime"))
}

/// Locate a connection file by name.
///
/// Lookup order:
/// 1. `name` as a path that exists
/// 2. `<runtime dir>/<name>`
/// 3. `<runtime dir>/kernel-<name>.json`
/// 4. the most recently modified `*.json` in the runtime dir containing `name`
pub fn find_connection_file(name: &str) -> ConnectionResult<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Ok(direct);
    }

    let dir = runtime_dir().ok_or_else(|| ConnectionError::NotFound(name.to_string()))?;
    find_in_dir(&dir, name)
}

fn find_in_dir(dir: &Path, name: &str) -> ConnectionResult<PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Ok(exact);
    }

    let kernel = dir.join(format!("kernel-{}.json", name));
    if kernel.is_file() {
        return Ok(kernel);
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Err(ConnectionError::NotFound(name.to_string())),
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if !file_name.ends_with(".json") || !file_name.contains(name) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            best = Some((modified, path));
        }
    }

    best.map(|(_, path)| path)
        .ok_or_else(|| ConnectionError::NotFound(name.to_string()))
}
