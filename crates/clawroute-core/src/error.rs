//! Error types for clawroute-core
//!
//! Besides the error enum itself this module decides which failures the
//! fallback chain may recover from, and renders errors for the CLI.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed completion call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError,
    /// HTTP 401/403
    AuthError,
    /// HTTP 400
    BadRequest,
    /// Transport timeout or the router's own deadline
    Timeout,
    /// Anything else
    Unknown,
}

impl UpstreamErrorKind {
    /// Classify an HTTP status code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            500..=599 => Self::ServerError,
            401 | 403 => Self::AuthError,
            400 => Self::BadRequest,
            _ => Self::Unknown,
        }
    }

    /// Classify an error raised by the completion service
    #[must_use]
    pub fn from_llm(error: &clawroute_llm::Error) -> Self {
        match error {
            clawroute_llm::Error::Timeout(_) => Self::Timeout,
            clawroute_llm::Error::RateLimit => Self::RateLimit,
            clawroute_llm::Error::Api { status, .. } => Self::from_status(*status),
            _ => Self::Unknown,
        }
    }

    /// Whether trying another endpoint can help
    ///
    /// A malformed request or a rejected credential fails the same way on
    /// every endpoint behind the same gateway.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::AuthError | Self::BadRequest)
    }

    /// Wire name used in routing log entries
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::AuthError => "auth_error",
            Self::BadRequest => "bad_request",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint temporarily excluded by its circuit breaker
    #[error("circuit open for {endpoint}, retry after {}ms", retry_after.as_millis())]
    CircuitOpen {
        /// Endpoint identifier
        endpoint: String,
        /// Remaining cooldown
        retry_after: Duration,
    },

    /// The completion call failed
    #[error("{endpoint} failed ({kind}): {source}")]
    Upstream {
        /// Endpoint identifier
        endpoint: String,
        /// Failure classification
        kind: UpstreamErrorKind,
        /// Underlying service error
        #[source]
        source: clawroute_llm::Error,
    },

    /// Every step of the fallback chain failed
    #[error("all candidates exhausted after {attempts} attempts: {last}")]
    AllCandidatesExhausted {
        /// Number of endpoints tried
        attempts: usize,
        /// Error from the final attempt
        #[source]
        last: Box<Error>,
    },

    /// No API credential configured
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the fallback chain may continue past this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } => true,
            Self::Upstream { kind, .. } => kind.is_retryable(),
            Self::AllCandidatesExhausted { .. } | Self::MissingCredential(_) | Self::Config(_) => {
                false
            }
        }
    }

    /// Short classification recorded in routing log entries
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Upstream { kind, .. } => kind.as_str(),
            Self::AllCandidatesExhausted { last, .. } => last.error_type(),
            Self::MissingCredential(_) => "missing_credential",
            Self::Config(_) => "config",
        }
    }

    /// Endpoint the error is attributed to, if any
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::CircuitOpen { endpoint, .. } | Self::Upstream { endpoint, .. } => Some(endpoint),
            Self::AllCandidatesExhausted { last, .. } => last.endpoint(),
            Self::MissingCredential(_) | Self::Config(_) => None,
        }
    }
}

impl From<clawroute_llm::Error> for Error {
    /// Construction-time failures of the completion service.
    /// Call failures are wrapped in [`Error::Upstream`] by the router instead.
    fn from(error: clawroute_llm::Error) -> Self {
        match error {
            clawroute_llm::Error::MissingCredential(msg) => Self::MissingCredential(msg),
            other => Self::Config(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Human-readable rendering of errors for terminal users
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::CircuitOpen {
                endpoint,
                retry_after,
            } => format!(
                "{endpoint} is temporarily disabled after repeated failures ({}s left).",
                retry_after.as_secs()
            ),
            Error::Upstream { endpoint, kind, .. } => match kind {
                UpstreamErrorKind::RateLimit => format!("{endpoint} is rate limiting requests."),
                UpstreamErrorKind::ServerError => format!("{endpoint} returned a server error."),
                UpstreamErrorKind::AuthError => "The API key was rejected.".to_string(),
                UpstreamErrorKind::BadRequest => format!("{endpoint} rejected the request."),
                UpstreamErrorKind::Timeout => format!("{endpoint} did not answer in time."),
                UpstreamErrorKind::Unknown => format!("{endpoint} failed: {self}"),
            },
            Error::AllCandidatesExhausted { attempts, last } => format!(
                "No endpoint could serve the request ({attempts} tried). Last error: {}",
                last.user_message()
            ),
            Error::MissingCredential(msg) => format!("API key is not configured: {msg}"),
            Error::Config(msg) => format!("Configuration error: {msg}"),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::CircuitOpen { .. } => {
                Some("Wait for the cooldown or choose another task type with --type.".to_string())
            }
            Error::Upstream {
                kind: UpstreamErrorKind::AuthError,
                ..
            }
            | Error::MissingCredential(_) => {
                Some("Set the OPENROUTER_API_KEY environment variable or add it to .env.".to_string())
            }
            Error::Upstream {
                kind: UpstreamErrorKind::BadRequest,
                ..
            } => Some("Check the prompt size and the endpoint's max_tokens setting.".to_string()),
            Error::Upstream {
                kind: UpstreamErrorKind::Timeout,
                ..
            } => Some("Raise request_timeout_ms in config/default.toml.".to_string()),
            Error::AllCandidatesExhausted { last, .. } => last.suggestion(),
            Error::Config(_) => {
                Some("Check config/default.toml, config/local.toml and CLAWROUTE_* variables.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();
    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }
    output.push('\n');
    output
}
