//! Conversation sync core: remote-store seams, ordered reconciliation,
//! optimistic outbox, and per-scope controllers.

pub mod backoff;
pub mod contracts;
pub mod controller;
pub mod conversation_list;
pub mod outbox;
pub mod reconciler;
