//! Reqwest-backed `SessionProvider` adapter.
//!
//! Asks `/auth/v1/user` who owns the configured access token. No token, or a
//! token the service rejects with 401/403, means nobody is signed in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::endpoint::{RestEndpoint, build_client, status_message};
use crate::domain::UserId;
use crate::domain::ports::{SessionError, SessionProvider};

const USER_PATH: &str = "auth/v1/user";

#[derive(Debug, Deserialize)]
struct AuthUserDto {
    id: String,
}

/// Session lookup against the hosted auth service.
pub struct RestSessionProvider {
    client: Client,
    endpoint: RestEndpoint,
    user_url: Url,
}

impl RestSessionProvider {
    /// Build a provider with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] when the reqwest client cannot be
    /// constructed or the user URL cannot be derived.
    pub fn new(endpoint: RestEndpoint, timeout: Duration) -> Result<Self, SessionError> {
        let client = build_client(timeout).map_err(|error| SessionError::transport(error.to_string()))?;
        let user_url = endpoint
            .url(USER_PATH)
            .map_err(|error| SessionError::transport(error.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            user_url,
        })
    }
}

#[async_trait]
impl SessionProvider for RestSessionProvider {
    async fn current_user_id(&self) -> Result<Option<UserId>, SessionError> {
        if self.endpoint.access_token().is_none() {
            return Ok(None);
        }

        let response = self
            .endpoint
            .authorise(self.client.get(self.user_url.clone()))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| SessionError::transport(error.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| SessionError::transport(error.to_string()))?;

        interpret_response(status, body.as_ref())
    }
}

fn interpret_response(status: StatusCode, body: &[u8]) -> Result<Option<UserId>, SessionError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            debug!(status = status.as_u16(), "access token rejected; treating caller as anonymous");
            Ok(None)
        }
        _ if status.is_success() => decode_user(body).map(Some),
        _ => Err(SessionError::status(
            status.as_u16(),
            status_message(status.as_u16(), body),
        )),
    }
}

fn decode_user(body: &[u8]) -> Result<UserId, SessionError> {
    let dto: AuthUserDto = serde_json::from_slice(body)
        .map_err(|error| SessionError::decode(format!("invalid auth user payload: {error}")))?;
    UserId::new(&dto.id).map_err(|error| SessionError::decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn success_decodes_the_user_id() {
        let user = UserId::random();
        let body = format!(r#"{{ "id": "{user}", "email": "someone@example.test" }}"#);

        let resolved = interpret_response(StatusCode::OK, body.as_bytes()).expect("decode");
        assert_eq!(resolved, Some(user));
    }

    #[rstest]
    #[case::unauthorised(StatusCode::UNAUTHORIZED)]
    #[case::forbidden(StatusCode::FORBIDDEN)]
    fn rejected_tokens_mean_no_session(#[case] status: StatusCode) {
        assert_eq!(interpret_response(status, b"{}").expect("anonymous"), None);
    }

    #[rstest]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, true)]
    #[case::rate_limited(StatusCode::TOO_MANY_REQUESTS, true)]
    #[case::not_found(StatusCode::NOT_FOUND, false)]
    fn other_statuses_surface_with_retry_classification(
        #[case] status: StatusCode,
        #[case] retryable: bool,
    ) {
        let error = interpret_response(status, b"").expect_err("status error");
        assert!(matches!(error, SessionError::Status { .. }));
        assert_eq!(error.is_retryable(), retryable);
    }

    #[rstest]
    #[case::not_json(b"<html>".as_slice())]
    #[case::not_a_uuid(br#"{ "id": "user-42" }"#.as_slice())]
    fn unreadable_users_are_decode_errors(#[case] body: &[u8]) {
        let error = interpret_response(StatusCode::OK, body).expect_err("decode error");
        assert!(matches!(error, SessionError::Decode { .. }));
    }

    #[tokio::test]
    async fn missing_access_token_skips_the_network() {
        let endpoint = RestEndpoint::new(
            Url::parse("http://127.0.0.1:9").expect("valid url"),
            "anon-key",
        );
        let provider = RestSessionProvider::new(endpoint, Duration::from_secs(1)).expect("build");

        assert_eq!(provider.current_user_id().await.expect("no lookup"), None);
    }
}
