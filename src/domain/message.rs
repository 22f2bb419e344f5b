use uuid::Uuid;

/// Identity of a message across its optimistic lifecycle.
///
/// A locally originated message starts out `Provisional` with a generated
/// temporary id and is rewritten to `Confirmed` once the backend has
/// persisted the row. Variant order matters: on identical timestamps,
/// confirmed rows sort before provisional ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageId {
    /// Server-assigned identifier of a persisted row.
    Confirmed(String),
    /// Locally generated identifier of a not-yet-confirmed send.
    Provisional(Uuid),
}

impl MessageId {
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::new_v4())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed(id) => f.write_str(id),
            Self::Provisional(id) => write!(f, "tmp-{id}"),
        }
    }
}

/// Delivery state of a message as seen by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Optimistically inserted, remote persistence not yet confirmed.
    Pending,
    /// Persisted by the backend.
    Sent,
    /// Remote insert failed; eligible for retry.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_phone: Option<String>,
    pub content: String,
    pub status: SendStatus,
    pub created_at_unix_ms: i64,
}

impl Message {
    /// Total-order key within a conversation: timestamp first, id as the
    /// tie-break on identical timestamps.
    pub fn ordering_key(&self) -> (i64, &MessageId) {
        (self.created_at_unix_ms, &self.id)
    }
}
