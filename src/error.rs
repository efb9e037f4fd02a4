use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CasterError>;

#[derive(Error, Debug)]
pub enum CasterError {
    #[error("Unable to find device{} to cast to", requested(.name))]
    DeviceNotFound { name: Option<String> },

    #[error("Failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stage '{}': {reason}", .path.display())]
    Staging { path: PathBuf, reason: String },

    #[error("Unable to determine a non-loopback local IP address")]
    AddressUnavailable,

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Cast error: {0}")]
    Cast(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn requested(name: &Option<String>) -> String {
    name.as_ref()
        .map(|name| format!(" ('{}')", name))
        .unwrap_or_default()
}

impl CasterError {
    pub fn is_device_not_found(&self) -> bool {
        matches!(self, CasterError::DeviceNotFound { .. })
    }
}
