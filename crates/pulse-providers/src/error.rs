use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::RateLimited(_)
            | ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Unauthorized(_)
            | ProviderError::Malformed(_)
            | ProviderError::Config(_) => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout_secs)
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }

    /// Classify a non-success HTTP status. `message` is the provider's error text.
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => ProviderError::RateLimited(message),
            401 | 403 => ProviderError::Unauthorized(message),
            _ => ProviderError::Status { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            ProviderError::from_status(429, "slow down".into()),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(401, "bad key".into()),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            ProviderError::from_status(404, "missing".into()),
            ProviderError::Status { status: 404, .. }
        ));
    }

    #[test]
    fn transient_errors() {
        assert!(ProviderError::Timeout(60).is_transient());
        assert!(ProviderError::RateLimited("x".into()).is_transient());
        assert!(ProviderError::from_status(503, "down".into()).is_transient());
        assert!(!ProviderError::from_status(400, "bad".into()).is_transient());
        assert!(!ProviderError::Unauthorized("x".into()).is_transient());
        assert!(!ProviderError::Malformed("x".into()).is_transient());
    }
}
