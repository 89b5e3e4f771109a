//! Session provider pinned to one optional user.

use async_trait::async_trait;

use crate::domain::UserId;
use crate::domain::ports::{SessionError, SessionProvider};

/// Always answers with the user it was built with.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionProvider {
    user_id: Option<UserId>,
}

impl StaticSessionProvider {
    /// Provider reporting `user_id` (or an anonymous caller for `None`).
    pub fn new(user_id: Option<UserId>) -> Self {
        Self { user_id }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_user_id(&self) -> Result<Option<UserId>, SessionError> {
        Ok(self.user_id.clone())
    }
}
