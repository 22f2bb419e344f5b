use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::message::{Message, MessageId, SendStatus};

use super::contracts::MessageDraft;

/// Errors surfaced synchronously to the caller of `send`/`retry`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message content is empty")]
    EmptyContent,
    #[error("no authenticated user to send as")]
    NotAuthenticated,
    #[error("outbox entry is unknown or not in a retryable state")]
    NotRetryable,
    #[error("conversation scope is closed")]
    ScopeClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    InFlight,
    Failed,
}

#[derive(Debug)]
struct OutboxEntry {
    draft: MessageDraft,
    state: EntryState,
}

/// Tracks locally originated messages until the remote store confirms
/// persistence. Each send is tracked independently by its own temporary id;
/// concurrent sends are allowed.
#[derive(Debug, Default)]
pub struct Outbox {
    entries: HashMap<Uuid, OutboxEntry>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a send and returns the provisional message to make
    /// visible through the reconciler. Rejects drafts whose trimmed content
    /// is empty.
    pub fn begin(
        &mut self,
        temp_id: Uuid,
        draft: MessageDraft,
        now_unix_ms: i64,
    ) -> Result<Message, SendError> {
        let content = draft.content.trim();
        if content.is_empty() {
            return Err(SendError::EmptyContent);
        }

        let draft = MessageDraft {
            content: content.to_owned(),
            ..draft
        };
        let provisional = Message {
            id: MessageId::Provisional(temp_id),
            conversation_id: draft.conversation_id.clone(),
            sender_id: draft.sender_id.clone(),
            recipient_phone: draft.recipient_phone.clone(),
            content: draft.content.clone(),
            status: SendStatus::Pending,
            created_at_unix_ms: now_unix_ms,
        };

        self.entries.insert(
            temp_id,
            OutboxEntry {
                draft,
                state: EntryState::InFlight,
            },
        );
        Ok(provisional)
    }

    /// The draft behind an in-flight or failed entry.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn draft(&self, temp_id: &Uuid) -> Option<&MessageDraft> {
        self.entries.get(temp_id).map(|entry| &entry.draft)
    }

    /// Records a remote insert failure. The entry stays tracked for retry.
    pub fn mark_failed(&mut self, temp_id: &Uuid) -> bool {
        match self.entries.get_mut(temp_id) {
            Some(entry) => {
                entry.state = EntryState::Failed;
                true
            }
            None => false,
        }
    }

    /// Re-arms a failed entry and hands back its original draft for a new
    /// insert attempt. In-flight or unknown entries are not retryable.
    pub fn begin_retry(&mut self, temp_id: &Uuid) -> Result<MessageDraft, SendError> {
        match self.entries.get_mut(temp_id) {
            Some(entry) if entry.state == EntryState::Failed => {
                entry.state = EntryState::InFlight;
                Ok(entry.draft.clone())
            }
            _ => Err(SendError::NotRetryable),
        }
    }

    /// Drops a confirmed entry; ownership of the canonical record now lives
    /// in the reconciled sequence.
    pub fn complete(&mut self, temp_id: &Uuid) -> bool {
        self.entries.remove(temp_id).is_some()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(content: &str) -> MessageDraft {
        MessageDraft {
            conversation_id: "c1".to_owned(),
            sender_id: "u1".to_owned(),
            recipient_phone: Some("+15550100".to_owned()),
            content: content.to_owned(),
        }
    }

    #[test]
    fn rejects_empty_content() {
        let mut outbox = Outbox::new();

        let result = outbox.begin(Uuid::new_v4(), draft(""), 1_000);

        assert_eq!(result, Err(SendError::EmptyContent));
        assert!(outbox.is_empty());
    }

    #[test]
    fn rejects_whitespace_only_content() {
        let mut outbox = Outbox::new();

        let result = outbox.begin(Uuid::new_v4(), draft("   \n\t  "), 1_000);

        assert_eq!(result, Err(SendError::EmptyContent));
    }

    #[test]
    fn begin_returns_pending_provisional_with_trimmed_content() {
        let mut outbox = Outbox::new();
        let temp_id = Uuid::new_v4();

        let provisional = outbox
            .begin(temp_id, draft("  hello  "), 1_000)
            .expect("draft should be accepted");

        assert_eq!(provisional.id, MessageId::Provisional(temp_id));
        assert_eq!(provisional.content, "hello");
        assert_eq!(provisional.status, SendStatus::Pending);
        assert_eq!(provisional.created_at_unix_ms, 1_000);
    }

    #[test]
    fn concurrent_sends_are_tracked_independently() {
        let mut outbox = Outbox::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        outbox
            .begin(first, draft("one"), 1_000)
            .expect("first draft accepted");
        outbox
            .begin(second, draft("two"), 1_001)
            .expect("second draft accepted");

        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.draft(&first).map(|d| d.content.as_str()), Some("one"));
        assert_eq!(outbox.draft(&second).map(|d| d.content.as_str()), Some("two"));
    }

    #[test]
    fn retry_reuses_failed_draft_content() {
        let mut outbox = Outbox::new();
        let temp_id = Uuid::new_v4();
        outbox
            .begin(temp_id, draft("keep me"), 1_000)
            .expect("draft accepted");

        assert!(outbox.mark_failed(&temp_id));
        let retried = outbox.begin_retry(&temp_id).expect("failed entry retryable");

        assert_eq!(retried.content, "keep me");
    }

    #[test]
    fn in_flight_entry_is_not_retryable() {
        let mut outbox = Outbox::new();
        let temp_id = Uuid::new_v4();
        outbox
            .begin(temp_id, draft("hello"), 1_000)
            .expect("draft accepted");

        assert_eq!(outbox.begin_retry(&temp_id), Err(SendError::NotRetryable));
    }

    #[test]
    fn unknown_entry_is_not_retryable() {
        let mut outbox = Outbox::new();

        assert_eq!(
            outbox.begin_retry(&Uuid::new_v4()),
            Err(SendError::NotRetryable)
        );
    }

    #[test]
    fn complete_releases_the_entry() {
        let mut outbox = Outbox::new();
        let temp_id = Uuid::new_v4();
        outbox
            .begin(temp_id, draft("hello"), 1_000)
            .expect("draft accepted");

        assert!(outbox.complete(&temp_id));
        assert!(outbox.is_empty());
        assert!(!outbox.complete(&temp_id));
    }
}
