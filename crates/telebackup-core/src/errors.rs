use std::{path::PathBuf, time::Duration};

/// Core error type for telebackup.
///
/// Adapter crates map their client errors into this type so the copy loop can
/// tell rate limiting and rejected captions apart from everything else.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {}", .path.display())]
    ConfigMissing { path: PathBuf },

    #[error("please configure '{key}' in {} before running", .path.display())]
    ConfigInvalid { key: String, path: PathBuf },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("flood wait: retry after {}s", .0.as_secs())]
    FloodWait(Duration),

    #[error("media caption too long")]
    CaptionTooLong,

    #[error("external error: {0}")]
    External(String),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
