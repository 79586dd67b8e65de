use std::error::Error as StdError;
use std::fmt;

/// Failures surfaced by the backend client.
///
/// Authentication failures are terminal: by the time `Unauthenticated` or
/// `AuthExpired` reaches a caller the stored session has already been
/// cleared and the session-ended hook has run.
#[derive(Debug)]
pub enum ClientError {
    /// Transport-level failure (connect, TLS, body read).
    Network(reqwest::Error),
    /// Non-success status with the server's message or a generic one.
    Server { status: u16, message: String },
    /// A 401 arrived and no refresh token was available.
    Unauthenticated,
    /// A 401 arrived and refreshing the session failed.
    AuthExpired,
    /// A success response whose body did not match the expected shape.
    Decode {
        context: String,
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::Unauthenticated | ClientError::AuthExpired)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Network(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Network(err) => write!(f, "Network error: {err}"),
            ClientError::Server { message, .. } => write!(f, "{message}"),
            ClientError::Unauthenticated => write!(f, "Not logged in"),
            ClientError::AuthExpired => {
                write!(f, "Authentication expired, please log in again")
            }
            ClientError::Decode { context, source } => {
                write!(f, "Failed to decode {context}: {source}")
            }
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Network(err) => Some(err),
            ClientError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_displays_its_message() {
        let err = ClientError::Server {
            status: 404,
            message: "conversation not found".to_string(),
        };
        assert_eq!(err.to_string(), "conversation not found");
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn auth_failures_are_flagged() {
        assert!(ClientError::Unauthenticated.is_auth_failure());
        assert!(ClientError::AuthExpired.is_auth_failure());
        assert_eq!(ClientError::AuthExpired.status(), None);
    }
}
