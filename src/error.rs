//! Error types for the NovelAI MCP server.
//!
//! Tool-invocation errors (`Error`) are caught at the invocation boundary and
//! turned into error-flagged tool results; they never fault the transport.
//! Session-routing errors live in [`crate::session`] because they are surfaced
//! as protocol-level responses, not tool results.

use thiserror::Error;

/// Unified error type for the generation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Tool arguments could not be parsed into the documented shape.
    #[error("Malformed arguments: {0}")]
    MalformedArguments(String),

    /// No prompt was supplied under any of the accepted field names.
    #[error(
        "Missing required parameter: base_prompt. \
         Please provide a prompt describing the image to generate."
    )]
    MissingPrompt,

    /// The NovelAI API answered with a non-success status.
    #[error("NovelAI API error (HTTP {status}): {body}")]
    Upstream {
        /// HTTP status code returned by the API
        status: u16,
        /// Response body text, verbatim
        body: String,
    },

    /// The NovelAI API could not be reached (DNS, connect, timeout).
    #[error("NovelAI API unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The response bytes start with neither a PNG nor a ZIP signature.
    #[error("Unexpected image format from NovelAI API. Magic bytes: {magic}. Expected PNG or ZIP.")]
    UnrecognizedImageFormat {
        /// Hex dump of the leading bytes, for diagnostics
        magic: String,
    },

    /// The returned archive had no `.png` entry.
    #[error("No PNG file found in the ZIP archive returned by the NovelAI API")]
    NoImageInArchive,

    /// The returned archive could not be read at all.
    #[error("Failed to read ZIP archive: {0}")]
    Archive(String),
}

impl Error {
    /// Create a new malformed-arguments error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedArguments(message.into())
    }

    /// Create a new upstream API error with status code and body text.
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            body: body.into(),
        }
    }
}

/// Configuration errors raised while loading environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    /// Create a new missing environment variable error.
    pub fn missing_env_var(name: impl Into<String>) -> Self {
        ConfigError::MissingEnvVar(name.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Result type alias using the pipeline error type.
pub type Result<T> = std::result::Result<T, Error>;
