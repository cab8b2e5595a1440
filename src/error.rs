use thiserror::Error;

/// Errors surfaced when constructing a logger or compiling a format.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested format name has no entry in the format registry.
    #[error("unknown format: {0:?}")]
    UnknownFormat(String),

    /// Sink construction failed (unwritable path, permission denied, ...).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A render-time failure, re-raised through the construction API.
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors raised while rendering a log line.
///
/// Missing data (absent header, timestamps not stamped yet) is *not* an
/// error: extractors return `None` and the renderer substitutes `-`. A
/// render error means the template itself is misconfigured.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The template references a token name nobody registered.
    #[error("unknown token: :{0}")]
    UnknownToken(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_display() {
        let err = RenderError::UnknownToken("trace-id".to_string());
        assert_eq!(err.to_string(), "unknown token: :trace-id");
    }

    #[test]
    fn test_unknown_format_display() {
        let err = Error::UnknownFormat("combined".to_string());
        assert_eq!(err.to_string(), "unknown format: \"combined\"");
    }
}
