//! Port for resolving the currently authenticated user.
//!
//! Every remote read or write is scoped to the user returned here. A missing
//! session is a normal outcome (anonymous visitors) and is reported as
//! `Ok(None)`; only lookup failures surface as [`SessionError`].

use async_trait::async_trait;

use crate::domain::UserId;

use super::define_port_error;

define_port_error! {
    /// Errors raised while resolving the current session.
    pub enum SessionError {
        /// The auth endpoint could not be reached or timed out.
        Transport { message: String } =>
            "session lookup transport failure: {message}",
        /// The auth endpoint answered with an unexpected status.
        Status { status: u16, message: String } =>
            "session lookup failed with status {status}: {message}",
        /// The auth endpoint answered with an unreadable user payload.
        Decode { message: String } =>
            "session payload could not be decoded: {message}",
    }
}

impl SessionError {
    /// Whether retrying the lookup could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. } => false,
        }
    }
}

/// Port resolving the authenticated user for the current caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Return the current user, or `None` when nobody is signed in.
    async fn current_user_id(&self) -> Result<Option<UserId>, SessionError>;
}

/// Fixture provider that always reports an anonymous caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSessionProvider;

#[async_trait]
impl SessionProvider for FixtureSessionProvider {
    async fn current_user_id(&self) -> Result<Option<UserId>, SessionError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn fixture_provider_is_anonymous() {
        let user = FixtureSessionProvider
            .current_user_id()
            .await
            .expect("fixture lookup succeeds");
        assert!(user.is_none());
    }

    #[rstest]
    #[case::transport(SessionError::transport("connection reset"), true)]
    #[case::server(SessionError::status(503_u16, "unavailable"), true)]
    #[case::throttled(SessionError::status(429_u16, "slow down"), true)]
    #[case::client(SessionError::status(400_u16, "bad request"), false)]
    #[case::decode(SessionError::decode("missing id"), false)]
    fn retry_classification(#[case] error: SessionError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }
}
