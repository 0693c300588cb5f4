use thiserror::Error;

/// Errors raised while analyzing, routing, rewriting or merging a statement.
///
/// The first four variants are the stable, classifiable failures a statement
/// issuer can observe. `Parse` and `Config` come from the statement analyzer
/// and the rule configuration loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardingError {
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Ambiguous route: {0}")]
    AmbiguousRoute(String),

    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("Column index {index} out of range for row with {len} column(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Routing,
    AmbiguousRoute,
    Rewrite,
    IndexOutOfRange,
    Parse,
    Config,
}

impl ShardingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Routing(_) => ErrorKind::Routing,
            Self::AmbiguousRoute(_) => ErrorKind::AmbiguousRoute,
            Self::Rewrite(_) => ErrorKind::Rewrite,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShardingError>;

impl<T> From<std::sync::PoisonError<T>> for ShardingError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Config(format!("rule registry lock poisoned: {}", err))
    }
}

impl From<serde_json::Error> for ShardingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
