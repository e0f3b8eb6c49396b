use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Everything that can go wrong while running a [`Test`].
///
/// Whichever completion protocol you use (`end` or `.await`), you observe the same `Error`
/// value: it is cheap to clone and every variant keeps its underlying cause reachable
/// through [`std::error::Error::source`].
///
/// [`Test`]: crate::Test
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// We could not get a reachable address for the application under test.
    /// No request was sent.
    #[error("Failed to bind the application to a local address: {0}")]
    Bind(#[source] Arc<std::io::Error>),
    /// The HTTP exchange itself failed (connection refused, reset, malformed response, ...).
    #[error("Failed to perform the HTTP exchange: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Arc<reqwest::Error>>,
    },
    /// The configured deadline elapsed before a response was fully received.
    #[error("Timed out after {0:?} waiting for a response")]
    Timeout(Duration),
    /// One of the queued expectations did not hold.
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    /// The `Test` was dispatched twice or modified after it had been dispatched.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub(crate) fn bind(e: std::io::Error) -> Self {
        Error::Bind(Arc::new(e))
    }

    pub(crate) fn transport<M: Into<String>>(message: M, source: Option<reqwest::Error>) -> Self {
        Error::Transport {
            message: message.into(),
            source: source.map(Arc::new),
        }
    }

    /// The failed expectation, if this is an assertion failure.
    pub fn as_assertion(&self) -> Option<&AssertionError> {
        match self {
            Error::Assertion(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::transport(e.to_string(), Some(e))
    }
}

/// The first expectation that failed for a response.
///
/// Expectations registered after the failing one are never evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionError {
    /// 1-based position of the failing expectation in registration order.
    pub position: usize,
    /// What the expectation was checking, e.g. `status is 200`.
    pub expectation: String,
    /// Why it failed.
    pub message: String,
    /// The received response, printed within the configured body print limit.
    pub response: String,
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Expectation #{} ({}) failed: {}",
            self.position, self.expectation, self.message
        )?;
        write!(f, "Received response:\n{}", self.response)
    }
}

impl std::error::Error for AssertionError {}
