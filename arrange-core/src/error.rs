use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArrangeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Padding check failed after decryption. Retrying with the same password cannot succeed.
    #[error("invalid padding or incorrect password")]
    Integrity,

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("worker pool unavailable: {0}")]
    ResourceExhausted(String),

    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl ArrangeError {
    /// Attach the path an I/O failure happened on.
    pub fn at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArrangeError::Path {
            path: path.into(),
            source,
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, ArrangeError::Integrity)
    }
}

impl From<rayon::ThreadPoolBuildError> for ArrangeError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        ArrangeError::ResourceExhausted(e.to_string())
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ArrangeError>;

/// `map_err` helper for std I/O calls that should report the path they touched.
pub(crate) trait PathContext<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> PathContext<T> for std::io::Result<T> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| ArrangeError::at(path, e))
    }
}
