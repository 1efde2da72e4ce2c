use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Error domain shared across the simulator crates.
///
/// Per-tick simulation events (buffer overflow, hop-limit drops, channel
/// drops, ARQ give-up) are *not* represented here: they are recoverable,
/// expected outcomes of normal operation and are reported as typed
/// outcomes from the call site rather than as errors. This type is
/// reserved for configuration and I/O failures that genuinely abort an
/// operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("protocol: {0}")]
    Protocol(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
