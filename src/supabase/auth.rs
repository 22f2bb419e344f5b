//! Current-user lookup against the auth endpoint.

use crate::sync::contracts::RemoteStoreError;

use super::{rest::RestClient, types::AuthUserRow};

impl RestClient {
    /// Resolves the authenticated user, or `None` when the session is
    /// missing or rejected. Transport failures still surface as errors so
    /// callers can tell "not signed in" from "backend unreachable".
    pub async fn current_user(&self) -> Result<Option<String>, RemoteStoreError> {
        match self.get_json::<AuthUserRow>("/auth/v1/user").await {
            Ok(user) => Ok(Some(user.id)),
            Err(RemoteStoreError::Unauthorized) => Ok(None),
            Err(error) => Err(error),
        }
    }
}
