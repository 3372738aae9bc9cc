use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("could not open index directory: {0}")]
    OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("query error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("query is empty")]
    EmptyQuery,

    #[error(
        "leading wildcards are not allowed in this search: '{0}'"
    )]
    LeadingWildcard(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by the
    /// index or the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::QueryParse(_)
                | Error::EmptyQuery
                | Error::LeadingWildcard(_)
                | Error::InvalidQuery(_)
        )
    }
}
