use std::path::PathBuf;

/// Core error type for the bridge state.
///
/// `Config`, `MissingConfig` and `MalformedState` are startup failures: the
/// binary reports them and exits before serving anything. `Persist` is the
/// only error a mutating call on a running context can return.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {}", path.display())]
    MissingConfig { path: PathBuf },

    #[error("unable to read {}: {source}", path.display())]
    MalformedState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// True for errors that leave the process without a usable state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Persist { .. } | Error::External(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
