//! Wire representations of backend rows and realtime frames, and their
//! mapping into domain entities.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{
    conversation::Conversation,
    message::{Message, MessageId, SendStatus},
    participant::Participant,
};
use crate::sync::contracts::RemoteStoreError;

/// Row ids arrive as strings for uuid keys and as numbers for serial keys;
/// both are carried as opaque strings from here on.
fn row_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RowId {
        Text(String),
        Number(i64),
    }

    Ok(match RowId::deserialize(deserializer)? {
        RowId::Text(value) => value,
        RowId::Number(value) => value.to_string(),
    })
}

/// Parses the backend's ISO-8601 timestamps (with or without an explicit
/// offset) into unix milliseconds.
pub fn parse_unix_ms(value: &str) -> Result<i64, RemoteStoreError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.timestamp_millis());
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|_| RemoteStoreError::InvalidData(format!("unparseable timestamp: {value}")))
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRow {
    #[serde(deserialize_with = "row_id")]
    pub id: String,
    #[serde(deserialize_with = "row_id")]
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    pub content: String,
    #[serde(default)]
    pub status: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    /// A persisted row is `Sent` unless the backend marked it failed
    /// (e.g. by the SMS function flipping the status column).
    pub fn into_message(self) -> Result<Message, RemoteStoreError> {
        let created_at_unix_ms = parse_unix_ms(&self.created_at)?;
        let status = match self.status.as_deref() {
            Some("failed") => SendStatus::Failed,
            _ => SendStatus::Sent,
        };

        Ok(Message {
            id: MessageId::Confirmed(self.id),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            recipient_phone: self.recipient_phone,
            content: self.content,
            status,
            created_at_unix_ms,
        })
    }
}

/// Insert payload; the backend assigns id, timestamp, and final status.
#[derive(Debug, Serialize)]
pub struct InsertMessageRow<'a> {
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_phone: Option<&'a str>,
    pub content: &'a str,
    pub status: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantRow {
    #[serde(deserialize_with = "row_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            phone: row.phone_number.unwrap_or_default(),
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRow {
    #[serde(deserialize_with = "row_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantRow>,
}

impl ConversationRow {
    pub fn into_conversation(self) -> Result<Conversation, RemoteStoreError> {
        let created_at_unix_ms = parse_unix_ms(&self.created_at)?;
        let updated_at_unix_ms = match self.updated_at.as_deref() {
            Some(value) => parse_unix_ms(value)?,
            None => created_at_unix_ms,
        };
        let last_message_at_unix_ms = match self.last_message_at.as_deref() {
            Some(value) => Some(parse_unix_ms(value)?),
            None => None,
        };

        Ok(Conversation {
            id: self.id,
            title: self.title,
            participants: self.participants.into_iter().map(Participant::from).collect(),
            last_message: self.last_message,
            last_message_at_unix_ms,
            created_at_unix_ms,
            updated_at_unix_ms,
        })
    }
}

/// Authenticated user as returned by the auth endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserRow {
    #[serde(deserialize_with = "row_id")]
    pub id: String,
}

/// Outbound Phoenix frame.
#[derive(Debug, Serialize)]
pub struct PhoenixOut<'a> {
    pub topic: &'a str,
    pub event: &'a str,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub reference: String,
}

/// Inbound Phoenix frame. Payload shape depends on the event; the `ref`
/// field is ignored.
#[derive(Debug, Deserialize)]
pub struct PhoenixIn {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Payload of a row-change frame (`INSERT`/`UPDATE`/`DELETE` events).
#[derive(Debug, Deserialize)]
pub struct RealtimeChange {
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
}
