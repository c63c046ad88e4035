use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Javelin operations.
#[derive(Debug, Error, Diagnostic)]
pub enum JavelinError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external binary (Maven, Gradle wrapper, Java) is missing.
    #[error("Tool not found: {tool}")]
    #[diagnostic(help("Make sure `{tool}` is installed and on PATH"))]
    ToolNotFound { tool: String },

    /// An external process ran but did not succeed.
    #[error("Invocation of {tool} failed (exit code {code:?})")]
    Invocation {
        tool: String,
        code: Option<i32>,
        /// Combined stdout/stderr of the failed process.
        output: String,
    },

    /// Build-tool output had an unexpected shape.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// A lookup (index entry, file, coordinate) found nothing.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// An archive entry tried to escape its extraction root.
    #[error("Archive entry escapes extraction root: {entry}")]
    PathTraversal { entry: String },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// An identified artifact is missing group, artifact, or version.
    #[error("Incomplete artifact coordinates: {artifact}")]
    Incomplete { artifact: String },

    /// Invalid or unreadable provider configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check the provider settings file for syntax errors"))]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type JavelinResult<T> = miette::Result<T>;
