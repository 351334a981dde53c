use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("invalid global id: {0}")]
    InvalidGlobalId(String),

    #[error("invalid SKU: {0}")]
    InvalidSku(String),

    #[error("missing config file kiosk-sync.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("content API request failed: {0}")]
    Http(String),

    #[error("content API returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    DataShape(String),

    #[error("not found on server: {0}")]
    NotFound(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("not in local store: {0}")]
    MissingEntity(String),
}
