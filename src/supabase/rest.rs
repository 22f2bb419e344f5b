//! PostgREST-style query/insert client.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::domain::{conversation::Conversation, message::Message};
use crate::infra::{config::BackendConfig, error::AppError};
use crate::sync::contracts::{MessageDraft, RemoteStoreError};

use super::types::{ConversationRow, InsertMessageRow, MessageRow};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Status the backend stamps on freshly inserted rows; the SMS function
/// owns any later transition.
const INSERT_STATUS: &str = "sending";

const CONVERSATIONS_SELECT: &str =
    "id,created_at,updated_at,title,last_message,last_message_at,\
     participants:users(id,name,phone_number,avatar_url)";

pub(super) fn messages_query(conversation_id: &str, limit: usize) -> String {
    format!(
        "/rest/v1/messages?select=*&conversation_id=eq.{}&order=created_at.desc&limit={limit}",
        urlencoding::encode(conversation_id)
    )
}

pub(super) fn conversations_query() -> String {
    format!("/rest/v1/conversations?select={CONVERSATIONS_SELECT}&order=last_message_at.desc.nullslast")
}

/// Maps an HTTP status to the store error taxonomy.
pub(super) fn error_for_status(status: StatusCode, detail: String) -> RemoteStoreError {
    match status.as_u16() {
        401 | 403 => RemoteStoreError::Unauthorized,
        400 | 409 | 422 => RemoteStoreError::Validation(detail),
        _ => RemoteStoreError::Unavailable(format!("status {status}: {detail}")),
    }
}

fn transport_error(error: reqwest::Error) -> RemoteStoreError {
    RemoteStoreError::Unavailable(error.to_string())
}

#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl RestClient {
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(AppError::HttpClient)?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_owned(),
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    pub(super) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(super) fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub(super) fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, RemoteStoreError> {
        let rows: Vec<ConversationRow> = self.get_json(&conversations_query()).await?;
        rows.into_iter()
            .map(ConversationRow::into_conversation)
            .collect()
    }

    pub async fn list_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, RemoteStoreError> {
        let rows: Vec<MessageRow> = self.get_json(&messages_query(conversation_id, limit)).await?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    pub async fn insert_message(&self, draft: MessageDraft) -> Result<Message, RemoteStoreError> {
        if draft.content.trim().is_empty() {
            return Err(RemoteStoreError::Validation(
                "message content is empty".to_owned(),
            ));
        }

        let payload = InsertMessageRow {
            conversation_id: &draft.conversation_id,
            sender_id: &draft.sender_id,
            recipient_phone: draft.recipient_phone.as_deref(),
            content: &draft.content,
            status: INSERT_STATUS,
        };

        let response = self
            .http
            .post(format!("{}/rest/v1/messages", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let row: MessageRow = Self::decode(response).await?;
        row.into_message()
    }

    pub(super) async fn get_json<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T, RemoteStoreError> {
        let response = self
            .http
            .get(format!("{}{path_and_query}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(transport_error)?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteStoreError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, detail));
        }

        response
            .json()
            .await
            .map_err(|error| RemoteStoreError::InvalidData(error.to_string()))
    }
}
