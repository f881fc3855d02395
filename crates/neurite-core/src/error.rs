use thiserror::Error;

/// Error type shared by every neurite crate.
#[derive(Debug, Error)]
pub enum NeuriteError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Index out of bounds: index {index} for axis {axis} with size {size}")]
    IndexOutOfBounds {
        index: usize,
        axis: usize,
        size: usize,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Empty matrix")]
    EmptyMatrix,

    /// Conflicting or impossible settings, detected before training starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Thread pool: {0}")]
    ThreadPool(String),

    #[error("JSON: {0}")]
    Json(String),
}

impl NeuriteError {
    pub fn config(message: impl Into<String>) -> Self {
        NeuriteError::Configuration(message.into())
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        NeuriteError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the error kinds that signal a misconfigured run.
    pub fn is_configuration(&self) -> bool {
        matches!(self, NeuriteError::Configuration(_) | NeuriteError::Io { .. })
    }
}

pub type NeuriteResult<T> = Result<T, NeuriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_counts_as_configuration() {
        let err = NeuriteError::io(
            "/nowhere/model.out",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.is_configuration());
        assert!(err.to_string().contains("/nowhere/model.out"));
        assert!(!NeuriteError::EmptyMatrix.is_configuration());
    }
}
