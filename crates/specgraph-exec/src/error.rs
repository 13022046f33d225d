use thiserror::Error;

use specgraph_operators::OpError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] specgraph_core::Error),

    #[error(transparent)]
    Operator(#[from] OpError),

    #[error("external op '{op}': {msg}")]
    External { op: String, msg: String },
}

impl ExecError {
    /// The core taxonomy variant, whichever layer raised it.
    pub fn core(&self) -> Option<&specgraph_core::Error> {
        match self {
            ExecError::Core(e) => Some(e),
            ExecError::Operator(e) => e.core(),
            ExecError::External { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
