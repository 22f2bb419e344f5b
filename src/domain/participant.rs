/// Contact attached to a conversation. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub avatar_url: Option<String>,
}
