use uuid::Uuid;

use crate::domain::{
    events::ChangeEvent,
    message::{Message, MessageId, SendStatus},
};

/// Locally materialized, deduplicated, ordered view of one conversation's
/// messages.
///
/// Ordering is by `(created_at, id)`, not arrival position, so out-of-order
/// delivery self-corrects. The sequence never holds two entries with the
/// same id.
#[derive(Debug, Default)]
pub struct Reconciler {
    messages: Vec<Message>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reconciled sequence, ascending by ordering key.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Applies one row change. Returns whether the visible sequence changed.
    pub fn apply_change(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::Inserted(message) => insert_sorted(&mut self.messages, message),
            ChangeEvent::Updated(message) => self.apply_update(message),
            ChangeEvent::Deleted(id) => self.remove(&id),
        }
    }

    /// Replaces the confirmed portion of the sequence atomically after a
    /// full refetch. Locally originated entries that are still pending or
    /// failed are carried over; the fetch cannot know about them.
    pub fn replace_all(&mut self, confirmed: Vec<Message>) {
        let mut next = Vec::with_capacity(confirmed.len());
        for message in confirmed {
            insert_sorted(&mut next, message);
        }

        for local in self.messages.drain(..) {
            if local.id.is_provisional() {
                insert_sorted(&mut next, local);
            }
        }

        self.messages = next;
    }

    /// Rewrites a provisional entry to its confirmed record. A key rewrite,
    /// never a duplicate insert: if the subscription already delivered the
    /// confirmed row, the provisional entry is simply dropped.
    pub fn confirm(&mut self, temp_id: &Uuid, confirmed: Message) -> bool {
        let removed = self.remove(&MessageId::Provisional(*temp_id));
        let inserted = insert_sorted(&mut self.messages, confirmed);
        removed || inserted
    }

    /// Marks a provisional entry failed, preserving its content.
    pub fn mark_failed(&mut self, temp_id: &Uuid) -> bool {
        self.set_provisional_status(temp_id, SendStatus::Failed)
    }

    /// Flips a failed provisional entry back to pending for a retry.
    pub fn mark_pending(&mut self, temp_id: &Uuid) -> bool {
        self.set_provisional_status(temp_id, SendStatus::Pending)
    }

    fn apply_update(&mut self, message: Message) -> bool {
        let Some(index) = self.position(&message.id) else {
            // At-least-once delivery can surface an update for a row the
            // initial fetch never covered; treat it as an upsert.
            return insert_sorted(&mut self.messages, message);
        };

        if self.messages[index] == message {
            return false;
        }

        if self.messages[index].ordering_key() == message.ordering_key() {
            self.messages[index] = message;
        } else {
            self.messages.remove(index);
            insert_sorted(&mut self.messages, message);
        }
        true
    }

    fn remove(&mut self, id: &MessageId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.messages.remove(index);
                true
            }
            None => false,
        }
    }

    fn set_provisional_status(&mut self, temp_id: &Uuid, status: SendStatus) -> bool {
        match self.position(&MessageId::Provisional(*temp_id)) {
            Some(index) if self.messages[index].status != status => {
                self.messages[index].status = status;
                true
            }
            _ => false,
        }
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|message| message.id == *id)
    }
}

/// Inserts by ordering key, keeping equal keys in insertion order. No-op if
/// an entry with the same id is already present.
fn insert_sorted(messages: &mut Vec<Message>, message: Message) -> bool {
    if messages.iter().any(|existing| existing.id == message.id) {
        return false;
    }

    let key = message.ordering_key();
    let index = messages.partition_point(|existing| existing.ordering_key() <= key);
    messages.insert(index, message);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: &str, at: i64) -> Message {
        Message {
            id: MessageId::Confirmed(id.to_owned()),
            conversation_id: "c1".to_owned(),
            sender_id: "u1".to_owned(),
            recipient_phone: None,
            content: format!("msg-{id}"),
            status: SendStatus::Sent,
            created_at_unix_ms: at,
        }
    }

    fn provisional(temp_id: Uuid, content: &str, at: i64) -> Message {
        Message {
            id: MessageId::Provisional(temp_id),
            conversation_id: "c1".to_owned(),
            sender_id: "u1".to_owned(),
            recipient_phone: None,
            content: content.to_owned(),
            status: SendStatus::Pending,
            created_at_unix_ms: at,
        }
    }

    fn ids(reconciler: &Reconciler) -> Vec<String> {
        reconciler
            .messages()
            .iter()
            .map(|message| message.id.to_string())
            .collect()
    }

    #[test]
    fn applying_same_insert_twice_is_a_no_op() {
        let mut reconciler = Reconciler::new();

        assert!(reconciler.apply_change(ChangeEvent::Inserted(confirmed("a", 1_000))));
        assert!(!reconciler.apply_change(ChangeEvent::Inserted(confirmed("a", 1_000))));

        assert_eq!(reconciler.messages().len(), 1);
    }

    #[test]
    fn orders_by_key_regardless_of_delivery_order() {
        let mut reconciler = Reconciler::new();

        reconciler.apply_change(ChangeEvent::Inserted(confirmed("c", 3_000)));
        reconciler.apply_change(ChangeEvent::Inserted(confirmed("a", 1_000)));
        reconciler.apply_change(ChangeEvent::Inserted(confirmed("b", 2_000)));

        assert_eq!(ids(&reconciler), vec!["a", "b", "c"]);
    }

    #[test]
    fn descending_fetch_presents_ascending_view() {
        let mut reconciler = Reconciler::new();

        // Backend convention: newest first.
        reconciler.replace_all(vec![
            confirmed("c", 3_000),
            confirmed("b", 2_000),
            confirmed("a", 1_000),
        ]);

        assert_eq!(ids(&reconciler), vec!["a", "b", "c"]);
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let mut reconciler = Reconciler::new();

        reconciler.apply_change(ChangeEvent::Inserted(confirmed("b", 1_000)));
        reconciler.apply_change(ChangeEvent::Inserted(confirmed("a", 1_000)));

        assert_eq!(ids(&reconciler), vec!["a", "b"]);
    }

    #[test]
    fn replace_all_swaps_sequence_atomically() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_change(ChangeEvent::Inserted(confirmed("old", 500)));

        reconciler.replace_all(vec![confirmed("b", 2_000), confirmed("a", 1_000)]);

        assert_eq!(ids(&reconciler), vec!["a", "b"]);
    }

    #[test]
    fn replace_all_preserves_local_pending_entries() {
        let mut reconciler = Reconciler::new();
        let temp_id = Uuid::new_v4();
        reconciler.apply_change(ChangeEvent::Inserted(provisional(temp_id, "draft", 5_000)));

        reconciler.replace_all(vec![confirmed("a", 1_000)]);

        assert_eq!(reconciler.messages().len(), 2);
        assert_eq!(
            reconciler.messages()[1].id,
            MessageId::Provisional(temp_id)
        );
    }

    #[test]
    fn update_moves_entry_when_key_changes() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_change(ChangeEvent::Inserted(confirmed("a", 1_000)));
        reconciler.apply_change(ChangeEvent::Inserted(confirmed("b", 2_000)));

        let mut moved = confirmed("a", 3_000);
        moved.content = "edited".to_owned();
        reconciler.apply_change(ChangeEvent::Updated(moved));

        assert_eq!(ids(&reconciler), vec!["b", "a"]);
        assert_eq!(reconciler.messages()[1].content, "edited");
    }

    #[test]
    fn update_for_unknown_row_is_an_upsert() {
        let mut reconciler = Reconciler::new();

        assert!(reconciler.apply_change(ChangeEvent::Updated(confirmed("a", 1_000))));
        assert_eq!(reconciler.messages().len(), 1);
    }

    #[test]
    fn delete_removes_entry() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_change(ChangeEvent::Inserted(confirmed("a", 1_000)));

        assert!(reconciler.apply_change(ChangeEvent::Deleted(MessageId::Confirmed(
            "a".to_owned()
        ))));
        assert!(reconciler.messages().is_empty());
    }

    #[test]
    fn delete_of_unknown_row_changes_nothing() {
        let mut reconciler = Reconciler::new();

        assert!(!reconciler.apply_change(ChangeEvent::Deleted(MessageId::Confirmed(
            "ghost".to_owned()
        ))));
    }

    #[test]
    fn confirm_rewrites_provisional_key_without_duplicate() {
        let mut reconciler = Reconciler::new();
        let temp_id = Uuid::new_v4();
        reconciler.apply_change(ChangeEvent::Inserted(provisional(temp_id, "hi", 5_000)));

        let mut record = confirmed("srv-1", 5_100);
        record.content = "hi".to_owned();
        reconciler.confirm(&temp_id, record);

        assert_eq!(reconciler.messages().len(), 1);
        assert_eq!(reconciler.messages()[0].id.to_string(), "srv-1");
        assert_eq!(reconciler.messages()[0].status, SendStatus::Sent);
    }

    #[test]
    fn confirm_after_subscription_already_delivered_row_drops_provisional() {
        let mut reconciler = Reconciler::new();
        let temp_id = Uuid::new_v4();
        reconciler.apply_change(ChangeEvent::Inserted(provisional(temp_id, "hi", 5_000)));

        let mut record = confirmed("srv-1", 5_100);
        record.content = "hi".to_owned();
        reconciler.apply_change(ChangeEvent::Inserted(record.clone()));
        reconciler.confirm(&temp_id, record);

        assert_eq!(reconciler.messages().len(), 1);
        assert_eq!(reconciler.messages()[0].id.to_string(), "srv-1");
    }

    #[test]
    fn mark_failed_preserves_content() {
        let mut reconciler = Reconciler::new();
        let temp_id = Uuid::new_v4();
        reconciler.apply_change(ChangeEvent::Inserted(provisional(temp_id, "keep me", 5_000)));

        assert!(reconciler.mark_failed(&temp_id));

        assert_eq!(reconciler.messages()[0].status, SendStatus::Failed);
        assert_eq!(reconciler.messages()[0].content, "keep me");
    }

    #[test]
    fn mark_failed_for_unknown_temp_id_is_a_no_op() {
        let mut reconciler = Reconciler::new();

        assert!(!reconciler.mark_failed(&Uuid::new_v4()));
    }
}
