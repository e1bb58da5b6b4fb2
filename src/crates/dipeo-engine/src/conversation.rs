//! Person conversation state (spec §4.9, "Conversation / Memory Store").
//!
//! Each `PersonId` owns an independent append-only message list. Messages
//! are never deleted, only tombstoned into `forgotten_message_ids` by the
//! memory-selection policies a `PersonJob` handler applies before each
//! call; `get_visible_messages` is the only read path a handler should
//! use, since it reconciles the tombstone set against the live list.
//!
//! ```rust
//! use dipeo_engine::conversation::{ConversationStore, Message, Role};
//!
//! let mut store = ConversationStore::new();
//! store.add_message("person-1", Message::new(Role::User, "hello").with_node_label("Start"));
//! let visible = store.visible_messages("person-1", "person-1");
//! assert_eq!(visible.len(), 1);
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// The speaker role a message is rendered under for a given reader
/// (spec §4.9: "assistant" for the person's own messages, "user" otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single turn in a person's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub sender_person_id: Option<String>,
    pub execution_id: Option<String>,
    pub node_id: Option<String>,
    pub node_label: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub cached_tokens: Option<u32>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            sender_person_id: None,
            execution_id: None,
            node_id: None,
            node_label: None,
            input_tokens: None,
            output_tokens: None,
            cached_tokens: None,
        }
    }

    pub fn with_sender(mut self, person_id: impl Into<String>) -> Self {
        self.sender_person_id = Some(person_id.into());
        self
    }

    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>, node_label: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self.node_label = Some(node_label.into());
        self
    }

    pub fn with_node_label(mut self, node_label: impl Into<String>) -> Self {
        self.node_label = Some(node_label.into());
        self
    }

    pub fn with_token_counts(mut self, input: u32, output: u32, cached: u32) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self.cached_tokens = Some(cached);
        self
    }
}

/// A rendered, visibility-filtered view of a message as a given reader
/// would see it — the shape a `PersonJob` handler feeds to an LLM port
/// and the shape an envelope's `conversation` representation carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub messages: Vec<ViewedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewedMessage {
    pub role: Role,
    pub content: String,
    pub person_id: Option<String>,
}

/// Per-person append-only history plus its tombstone set.
#[derive(Debug, Clone, Default)]
pub struct PersonConversation {
    pub person_id: String,
    messages: Vec<Message>,
    forgotten_message_ids: HashSet<String>,
}

/// Cap on retained messages per person (spec §3 DATA MODEL supplement).
/// Oldest messages are dropped once this is exceeded; the tombstone set
/// is reconciled against the surviving ids so it never grows unbounded.
pub const MAX_MESSAGES_PER_PERSON: usize = 100;

impl PersonConversation {
    fn new(person_id: impl Into<String>) -> Self {
        Self { person_id: person_id.into(), messages: Vec::new(), forgotten_message_ids: HashSet::new() }
    }

    fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > MAX_MESSAGES_PER_PERSON {
            let overflow = self.messages.len() - MAX_MESSAGES_PER_PERSON;
            self.messages.drain(0..overflow);
            let remaining: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
            self.forgotten_message_ids.retain(|id| remaining.contains(id.as_str()));
        }
    }

    /// Tombstone every message that came from `execution_id`.
    pub fn forget_messages_from_execution(&mut self, execution_id: &str) {
        for message in &self.messages {
            if message.execution_id.as_deref() == Some(execution_id) {
                self.forgotten_message_ids.insert(message.id.clone());
            }
        }
    }

    /// Tombstone every message this person itself sent.
    pub fn forget_own_messages(&mut self) {
        for message in &self.messages {
            if message.sender_person_id.as_deref() == Some(self.person_id.as_str()) {
                self.forgotten_message_ids.insert(message.id.clone());
            }
        }
    }

    /// Tombstone this person's own messages from one execution only.
    pub fn forget_own_messages_from_execution(&mut self, execution_id: &str) {
        for message in &self.messages {
            if message.execution_id.as_deref() == Some(execution_id)
                && message.sender_person_id.as_deref() == Some(self.person_id.as_str())
            {
                self.forgotten_message_ids.insert(message.id.clone());
            }
        }
    }

    /// Non-forgotten messages, rendered from `reader_person_id`'s point
    /// of view: messages sent by the reader render as `Assistant`, all
    /// others as `User`, with the sender's node label prefixed so the
    /// model can tell collaborators apart (spec §4.9).
    pub fn visible_messages(&self, reader_person_id: &str) -> Vec<ViewedMessage> {
        self.messages
            .iter()
            .filter(|m| !self.forgotten_message_ids.contains(&m.id))
            .map(|m| {
                let is_reader = m.sender_person_id.as_deref() == Some(reader_person_id);
                let role = if is_reader { Role::Assistant } else { Role::User };
                let content = if !is_reader {
                    match &m.node_label {
                        Some(label) => format!("[{label}]: {}", m.content),
                        None => m.content.clone(),
                    }
                } else {
                    m.content.clone()
                };
                ViewedMessage { role, content, person_id: m.sender_person_id.clone() }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The execution-wide conversation store: one [`PersonConversation`] per
/// `PersonId`, created lazily on first message.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    people: HashMap<String, PersonConversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, person_id: impl Into<String>, message: Message) {
        let person_id = person_id.into();
        self.people
            .entry(person_id.clone())
            .or_insert_with(|| PersonConversation::new(person_id))
            .add_message(message);
    }

    /// Broadcast a message into every participant's history at once, the
    /// way a `PersonJob` response is appended both to the speaker's own
    /// log and to every other person addressed in the same diagram.
    pub fn broadcast(&mut self, person_ids: impl IntoIterator<Item = String>, message: Message) {
        for person_id in person_ids {
            self.add_message(person_id, message.clone());
        }
    }

    pub fn person(&self, person_id: &str) -> Option<&PersonConversation> {
        self.people.get(person_id)
    }

    pub fn person_mut(&mut self, person_id: &str) -> &mut PersonConversation {
        self.people
            .entry(person_id.to_string())
            .or_insert_with(|| PersonConversation::new(person_id))
    }

    pub fn visible_messages(&self, owner_person_id: &str, reader_person_id: &str) -> Vec<ViewedMessage> {
        self.people
            .get(owner_person_id)
            .map(|c| c.visible_messages(reader_person_id))
            .unwrap_or_default()
    }

    pub fn view(&self, owner_person_id: &str, reader_person_id: &str) -> ConversationView {
        ConversationView { messages: self.visible_messages(owner_person_id, reader_person_id) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_messages_label_non_owner_role_as_user() {
        let mut store = ConversationStore::new();
        store.add_message(
            "p1",
            Message::new(Role::User, "hi").with_sender("p2").with_node_label("Researcher"),
        );
        let visible = store.visible_messages("p1", "p1");
        assert_eq!(visible.len(), 1);
        assert!(matches!(visible[0].role, Role::User));
        assert_eq!(visible[0].content, "[Researcher]: hi");
    }

    #[test]
    fn own_messages_render_as_assistant_without_label_prefix() {
        let mut store = ConversationStore::new();
        store.add_message("p1", Message::new(Role::User, "reply").with_sender("p1"));
        let visible = store.visible_messages("p1", "p1");
        assert!(matches!(visible[0].role, Role::Assistant));
        assert_eq!(visible[0].content, "reply");
    }

    #[test]
    fn forgotten_messages_are_excluded_from_view() {
        let mut conv = PersonConversation::new("p1");
        conv.add_message(Message::new(Role::User, "a").with_execution("exec_a"));
        conv.add_message(Message::new(Role::User, "b").with_execution("exec_b"));
        conv.forget_messages_from_execution("exec_a");
        let visible = conv.visible_messages("p1");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, "b");
    }

    #[test]
    fn trimming_reconciles_tombstones_against_survivors() {
        let mut conv = PersonConversation::new("p1");
        for i in 0..MAX_MESSAGES_PER_PERSON + 5 {
            conv.add_message(Message::new(Role::User, format!("m{i}")));
        }
        assert_eq!(conv.len(), MAX_MESSAGES_PER_PERSON);
        conv.forget_own_messages();
        assert!(conv.forgotten_message_ids.len() <= MAX_MESSAGES_PER_PERSON);
    }

    #[test]
    fn forget_own_messages_from_execution_is_scoped_to_sender_and_execution() {
        let mut conv = PersonConversation::new("p1");
        conv.add_message(Message::new(Role::User, "mine").with_sender("p1").with_execution("e1"));
        conv.add_message(Message::new(Role::User, "theirs").with_sender("p2").with_execution("e1"));
        conv.forget_own_messages_from_execution("e1");
        let visible = conv.visible_messages("p1");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, "theirs");
    }
}
