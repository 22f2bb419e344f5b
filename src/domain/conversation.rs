use super::participant::Participant;

const UNKNOWN_CONTACT: &str = "Unknown Contact";
const NO_MESSAGES: &str = "No messages yet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub participants: Vec<Participant>,
    /// Denormalized preview of the latest message. May be stale until the
    /// next reconcile.
    pub last_message: Option<String>,
    /// Timestamp of the latest message. Monotonically non-decreasing per
    /// conversation; see [`Conversation::absorb_projection`].
    pub last_message_at_unix_ms: Option<i64>,
    pub created_at_unix_ms: i64,
    pub updated_at_unix_ms: i64,
}

impl Conversation {
    /// Title shown in list views: explicit title, else the first
    /// participant's name, else a fixed placeholder.
    pub fn display_title(&self) -> &str {
        if let Some(title) = self.title.as_deref() {
            if !title.is_empty() {
                return title;
            }
        }

        self.participants
            .first()
            .map(|participant| participant.name.as_str())
            .unwrap_or(UNKNOWN_CONTACT)
    }

    /// Preview line shown in list views.
    pub fn display_preview(&self) -> &str {
        self.last_message.as_deref().unwrap_or(NO_MESSAGES)
    }

    /// Timestamp used for list ordering: last message if any, else creation.
    pub fn activity_at_unix_ms(&self) -> i64 {
        self.last_message_at_unix_ms
            .unwrap_or(self.created_at_unix_ms)
    }

    /// Takes over `incoming`'s fields while enforcing that the last-message
    /// projection never moves backwards. A refetch can race an already
    /// observed change notification and return an older denormalized
    /// preview; the newer projection wins.
    pub fn absorb_projection(&mut self, mut incoming: Conversation) {
        let newer_known = match (self.last_message_at_unix_ms, incoming.last_message_at_unix_ms) {
            (Some(current), Some(fetched)) => current > fetched,
            (Some(_), None) => true,
            _ => false,
        };

        if newer_known {
            incoming.last_message = self.last_message.take();
            incoming.last_message_at_unix_ms = self.last_message_at_unix_ms;
        }

        *self = incoming;
    }
}
