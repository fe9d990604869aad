/// Errors from the file-backed stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a document failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A document on disk is not valid JSON of the expected shape.
    #[error("Malformed document {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The referenced project does not exist.
    #[error("Project {0} not found")]
    ProjectNotFound(String),

    /// The project id contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid project id: {0}")]
    InvalidProjectId(String),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn malformed(path: &std::path::Path, source: serde_json::Error) -> Self {
        StoreError::Malformed {
            path: path.display().to_string(),
            source,
        }
    }
}
