//! Shared artifact-format error

/// Failure reading or parsing one of the triad file formats
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl FormatError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
