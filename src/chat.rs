//! Conversation state: the transcript, the single in-flight send guard, and
//! the projection of prior turns into the transport's shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content;
use crate::gemini::{FailureKind, HistoryTurn, TurnRole};

/// Sentinel id of the greeting message. Greetings never reach the transport.
pub const WELCOME_ID: &str = "welcome";
/// Sentinel id of the apology message appended on transport failure.
pub const ERROR_ID: &str = "error";

/// Most recent turns forwarded to the transport as prior context.
const MAX_HISTORY_TURNS: usize = 40;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), Role::User, content)
    }

    /// Empty assistant message that grows in place while a response streams.
    fn assistant_placeholder() -> Self {
        Self::with_id(Uuid::new_v4().to_string(), Role::Assistant, "")
    }

    pub fn with_id(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Everything a send needs once the transcript bookkeeping is done: the text
/// to transmit, the prior-turn projection snapshotted before the user message
/// was appended, and the id of the placeholder to stream into.
#[derive(Debug)]
pub struct OutboundSend {
    pub text: String,
    pub history: Vec<HistoryTurn>,
    pub placeholder_id: String,
}

/// Serializable view of the session for the webview.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub in_flight: bool,
    pub auth_required: bool,
}

pub struct ChatSession {
    messages: Vec<ChatMessage>,
    in_flight: bool,
    auth_required: bool,
    streaming_id: Option<String>,
}

impl ChatSession {
    /// Rebuilds the session from persisted state. An absent transcript starts
    /// with the greeting; a present-but-degraded one stays as loaded.
    pub fn restore(saved: Option<Vec<ChatMessage>>, user_name: &str) -> Self {
        let messages = saved.unwrap_or_else(|| {
            vec![ChatMessage::with_id(
                WELCOME_ID,
                Role::Assistant,
                content::greeting(user_name),
            )]
        });
        Self {
            messages,
            in_flight: false,
            auth_required: false,
            streaming_id: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.messages.clone(),
            in_flight: self.in_flight,
            auth_required: self.auth_required,
        }
    }

    /// Re-personalizes an untouched greeting after the user introduces
    /// themselves on the landing screen.
    pub fn refresh_greeting(&mut self, user_name: &str) {
        if let [only] = self.messages.as_mut_slice() {
            if only.id == WELCOME_ID {
                only.content = content::greeting(user_name);
            }
        }
    }

    /// Starts a send, or returns `None` (leaving the transcript untouched)
    /// when the text is blank or another send is in flight. A second attempt
    /// is dropped, never queued.
    pub fn begin_send(&mut self, text: &str) -> Option<OutboundSend> {
        if text.trim().is_empty() || self.in_flight {
            return None;
        }
        self.auth_required = false;

        // The projection is snapshotted before the new user turn is appended;
        // the transport receives the new text separately.
        let history = self.history_for_transport();

        let placeholder = ChatMessage::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(ChatMessage::user(text));
        self.messages.push(placeholder);
        self.in_flight = true;
        self.streaming_id = Some(placeholder_id.clone());

        Some(OutboundSend {
            text: text.to_string(),
            history,
            placeholder_id,
        })
    }

    /// Appends a streamed increment to the placeholder, returning its full
    /// content for display.
    pub fn apply_increment(&mut self, delta: &str) -> String {
        let Some(id) = self.streaming_id.as_deref() else {
            return String::new();
        };
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content.push_str(delta);
                message.content.clone()
            }
            None => String::new(),
        }
    }

    pub fn finish_send(&mut self) {
        self.in_flight = false;
        self.streaming_id = None;
    }

    /// Ends a failed send. Credential failures flip the auth-required state
    /// and never touch the transcript; every other failure appends exactly
    /// one apology turn, returned for display.
    pub fn fail_send(&mut self, kind: FailureKind) -> Option<ChatMessage> {
        self.in_flight = false;
        self.streaming_id = None;
        match kind {
            FailureKind::Auth => {
                self.auth_required = true;
                None
            }
            FailureKind::Network | FailureKind::Unknown => {
                let apology =
                    ChatMessage::with_id(ERROR_ID, Role::Assistant, content::APOLOGY);
                self.messages.push(apology.clone());
                Some(apology)
            }
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    /// Clears the auth-required state once the user has been sent to the
    /// key-selection surface.
    pub fn acknowledge_auth(&mut self) {
        self.auth_required = false;
    }

    /// Resets the conversation to a single fresh greeting.
    pub fn clear(&mut self, user_name: &str) {
        self.messages = vec![ChatMessage::with_id(
            WELCOME_ID,
            Role::Assistant,
            content::clear_greeting(user_name),
        )];
        self.in_flight = false;
        self.streaming_id = None;
    }

    /// Projects the transcript into transport turns: sentinel and empty
    /// entries are dropped, assistant turns become `model`, and the result is
    /// capped to the most recent [`MAX_HISTORY_TURNS`].
    pub fn history_for_transport(&self) -> Vec<HistoryTurn> {
        let turns: Vec<HistoryTurn> = self
            .messages
            .iter()
            .filter(|m| m.id != WELCOME_ID && m.id != ERROR_ID && !m.content.trim().is_empty())
            .map(|m| HistoryTurn {
                role: match m.role {
                    Role::User => TurnRole::User,
                    Role::Assistant => TurnRole::Model,
                },
                text: m.content.clone(),
            })
            .collect();

        let skip = turns.len().saturating_sub(MAX_HISTORY_TURNS);
        turns.into_iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(messages: Vec<ChatMessage>) -> ChatSession {
        ChatSession::restore(Some(messages), "Asha")
    }

    #[test]
    fn restore_without_saved_state_greets_by_name() {
        let session = ChatSession::restore(None, "Asha");
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].id, WELCOME_ID);
        assert!(session.messages()[0].content.contains("Asha"));
    }

    #[test]
    fn restore_keeps_degraded_empty_transcript() {
        let session = ChatSession::restore(Some(Vec::new()), "Asha");
        assert!(session.messages().is_empty());
    }

    #[test]
    fn refresh_greeting_only_touches_untouched_welcome() {
        let mut session = ChatSession::restore(None, content::DEFAULT_USER_NAME);
        session.refresh_greeting("Asha");
        assert!(session.messages()[0].content.contains("Asha"));

        let mut busy = session_with(vec![
            ChatMessage::with_id(WELCOME_ID, Role::Assistant, "hi"),
            ChatMessage::user("hello"),
        ]);
        busy.refresh_greeting("Ravi");
        assert_eq!(busy.messages()[0].content, "hi");
    }

    #[test]
    fn projection_excludes_sentinels_and_empty_content() {
        let session = session_with(vec![
            ChatMessage::with_id(WELCOME_ID, Role::Assistant, "welcome text"),
            ChatMessage::user("How are you?"),
            ChatMessage::with_id("a1", Role::Assistant, "I'm listening."),
            ChatMessage::with_id("a2", Role::Assistant, "   "),
            ChatMessage::with_id(ERROR_ID, Role::Assistant, content::APOLOGY),
        ]);

        let history = session.history_for_transport();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[0].text, "How are you?");
        assert_eq!(history[1].role, TurnRole::Model);
        assert_eq!(history[1].text, "I'm listening.");
    }

    #[test]
    fn projection_caps_to_most_recent_turns() {
        let messages: Vec<ChatMessage> = (0..50)
            .map(|i| ChatMessage::user(format!("message {i}")))
            .collect();
        let session = session_with(messages);

        let history = session.history_for_transport();
        assert_eq!(history.len(), 40);
        assert_eq!(history[0].text, "message 10");
        assert_eq!(history[39].text, "message 49");
    }

    #[test]
    fn blank_send_is_a_no_op() {
        let mut session = ChatSession::restore(None, "Asha");
        assert!(session.begin_send("   ").is_none());
        assert_eq!(session.messages().len(), 1);
        assert!(!session.is_in_flight());
    }

    #[test]
    fn send_while_in_flight_is_dropped() {
        let mut session = ChatSession::restore(None, "Asha");
        session.begin_send("first").unwrap();
        let count = session.messages().len();

        assert!(session.begin_send("second").is_none());
        assert_eq!(session.messages().len(), count);
    }

    #[test]
    fn send_snapshots_history_before_appending() {
        let mut session = session_with(vec![
            ChatMessage::user("earlier"),
            ChatMessage::with_id("a1", Role::Assistant, "reply"),
        ]);

        let outbound = session.begin_send("new question").unwrap();

        assert_eq!(outbound.history.len(), 2);
        assert!(outbound.history.iter().all(|t| t.text != "new question"));
        assert_eq!(outbound.text, "new question");
        assert_eq!(session.messages().len(), 4);
        let placeholder = session.messages().last().unwrap();
        assert_eq!(placeholder.id, outbound.placeholder_id);
        assert_eq!(placeholder.role, Role::Assistant);
        assert_eq!(placeholder.content, "");
    }

    #[test]
    fn increments_grow_the_placeholder_in_place() {
        let mut session = ChatSession::restore(None, "Asha");
        let outbound = session.begin_send("hi").unwrap();

        assert_eq!(session.apply_increment("Hello"), "Hello");
        assert_eq!(session.apply_increment(" there"), "Hello there");

        session.finish_send();
        let last = session.messages().last().unwrap();
        assert_eq!(last.id, outbound.placeholder_id);
        assert_eq!(last.content, "Hello there");
        assert!(!session.is_in_flight());
    }

    #[test]
    fn auth_failure_sets_state_without_apology_bubble() {
        let mut session = ChatSession::restore(None, "Asha");
        session.begin_send("hi").unwrap();
        let count = session.messages().len();

        let appended = session.fail_send(FailureKind::Auth);

        assert!(appended.is_none());
        assert!(session.auth_required());
        assert_eq!(session.messages().len(), count);
        assert!(!session.is_in_flight());
    }

    #[test]
    fn other_failures_append_exactly_one_apology() {
        let mut session = ChatSession::restore(None, "Asha");
        session.begin_send("hi").unwrap();
        let count = session.messages().len();

        let appended = session.fail_send(FailureKind::Unknown).unwrap();

        assert_eq!(appended.id, ERROR_ID);
        assert_eq!(appended.content, content::APOLOGY);
        assert!(!session.auth_required());
        assert_eq!(session.messages().len(), count + 1);
        assert_eq!(
            session
                .messages()
                .iter()
                .filter(|m| m.id == ERROR_ID)
                .count(),
            1
        );
    }

    #[test]
    fn next_send_clears_auth_state() {
        let mut session = ChatSession::restore(None, "Asha");
        session.begin_send("hi").unwrap();
        session.fail_send(FailureKind::Auth);
        assert!(session.auth_required());

        session.begin_send("retry").unwrap();
        assert!(!session.auth_required());
    }

    #[test]
    fn clear_resets_to_single_greeting() {
        let mut session = ChatSession::restore(None, "Asha");
        session.begin_send("hi").unwrap();
        session.apply_increment("partial");
        session.fail_send(FailureKind::Unknown);

        session.clear("Asha");

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].id, WELCOME_ID);
        assert!(session.messages()[0].content.contains("Hello again Asha"));
        assert!(!session.is_in_flight());
    }
}
