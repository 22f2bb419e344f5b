use super::message::{Message, MessageId};

/// Row-level change observed on the message table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted(Message),
    Updated(Message),
    Deleted(MessageId),
}

impl ChangeEvent {
    /// Stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "inserted",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// Event delivered on a subscription feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A row change on a message scope.
    Message(ChangeEvent),
    /// Any change on the conversation table; list scopes refetch.
    ConversationsTouched,
    /// The channel terminated; no further events arrive on this handle.
    Closed { reason: String },
}
