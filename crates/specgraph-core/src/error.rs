use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    /// Graph construction mistakes: wrong parent count or kind, dangling
    /// parent ids, a `get_item` path that does not address exactly one type.
    #[error("Internal invariant failed: {0}")]
    Invariant(String),

    /// A transform kind the called layer does not interpret.
    #[error("Not implemented for transform kind '{0}'")]
    Unsupported(String),

    /// `Type::get` and friends on a path that does not exist.
    #[error("Path not found: '{label}' in {path}")]
    PathNotFound { path: String, label: String },

    #[error("Path {0} branches where a single address is required")]
    AmbiguousPath(String),

    /// A query that produced zero rows: such a result set cannot be typed.
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// An external value that cannot be turned into the expected shape.
    #[error("Wrong shape: {0}")]
    WrongShape(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
