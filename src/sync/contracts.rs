use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::domain::{conversation::Conversation, events::FeedEvent, message::Message};

const DEFAULT_MESSAGES_PAGE_SIZE: usize = 50;
const MAX_MESSAGES_PAGE_SIZE: usize = 200;

/// Normalizes a caller-supplied page size: zero falls back to the default,
/// oversized requests are capped.
pub fn normalized_page_size(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_MESSAGES_PAGE_SIZE,
        value if value > MAX_MESSAGES_PAGE_SIZE => MAX_MESSAGES_PAGE_SIZE,
        value => value,
    }
}

/// Errors surfaced by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteStoreError {
    #[error("remote backend unavailable: {0}")]
    Unavailable(String),
    #[error("not authorized")]
    Unauthorized,
    #[error("malformed backend payload: {0}")]
    InvalidData(String),
    #[error("draft rejected: {0}")]
    Validation(String),
}

/// Locally composed message not yet persisted by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_phone: Option<String>,
    pub content: String,
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeScope {
    /// Any change on the conversation table.
    Conversations,
    /// Row changes on the message table for one conversation.
    ConversationMessages { conversation_id: String },
}

/// Handle for one live subscription. Dropping the handle signals the
/// underlying channel task to stop; `RemoteStore::unsubscribe` does the
/// same explicitly.
#[derive(Debug)]
pub struct SyncSubscription {
    stop_tx: Option<watch::Sender<bool>>,
}

impl SyncSubscription {
    pub fn new(stop_tx: watch::Sender<bool>) -> Self {
        Self {
            stop_tx: Some(stop_tx),
        }
    }

    /// Handle with no channel task behind it, for stub backends.
    #[cfg(test)]
    pub fn inert() -> Self {
        Self { stop_tx: None }
    }
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }
}

/// Typed facade over the backend's query/insert/subscribe operations.
///
/// `insert_message` creates exactly one row server-side; duplicate calls
/// with identical content are not deduplicated at this layer.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Conversations ordered by most recent activity (descending).
    async fn list_conversations(&self) -> Result<Vec<Conversation>, RemoteStoreError>;

    /// Messages for one conversation, descending by creation time
    /// (backend convention; the reconciler re-orders ascending).
    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, RemoteStoreError>;

    /// Persists a draft; the returned message carries the canonical id,
    /// server timestamp, and `Sent` status.
    async fn insert_message(&self, draft: MessageDraft) -> Result<Message, RemoteStoreError>;

    /// Opens a change feed for the given scope. Events arrive on the
    /// returned receiver until the handle is released or the channel fails.
    async fn subscribe(
        &self,
        scope: SubscribeScope,
    ) -> Result<(SyncSubscription, mpsc::Receiver<FeedEvent>), RemoteStoreError>;

    /// Releases a subscription handle.
    async fn unsubscribe(&self, handle: SyncSubscription);
}

/// Auth collaborator: resolved once per controller lifecycle to stamp
/// `sender_id` on outgoing drafts.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<String>, RemoteStoreError>;
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification endpoint rejected dispatch with status {status}")]
    Rejected { status: u16 },
    #[error("notification dispatch failed: {0}")]
    Transport(String),
}

/// Outbound notification collaborator (SMS webhook). Dispatch failures do
/// not affect message status.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, message: &Message) -> Result<(), NotifyError>;
}
