use storage::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("permission denied: {0}")]
    Denied(String),

    /// Some nodes could not be regenerated; the others were.
    #[error("failed to regenerate {} grant argument(s)", .failed.len())]
    Regeneration {
        regenerated: Vec<NodeId>,
        failed: Vec<(NodeId, storage::Error)>,
    },

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Policy(#[from] policy::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
