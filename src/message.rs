//! Chat turns: the role-tagged text units a chat request is made of.

use serde::{Deserialize, Serialize};

/// A single turn in a chat conversation, with a role and text content.
///
/// A chat request is an ordered sequence of turns. The orchestrator in
/// [`crate::chat`] splits that sequence into system prompt, history, and the
/// latest user message.
///
/// # Examples
///
/// ```
/// use ragmill::message::ChatTurn;
///
/// let system = ChatTurn::system("You are a helpful assistant.");
/// let question = ChatTurn::user("What changed in Q3?");
/// assert!(question.has_role(ChatTurn::USER));
///
/// // Turns serialize to the `{role, content}` wire shape.
/// let json = serde_json::to_string(&question).unwrap();
/// assert_eq!(json, r#"{"role":"user","content":"What changed in Q3?"}"#);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatTurn {
    /// The role of the sender: `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// The text content of the turn.
    pub content: String,
}

impl ChatTurn {
    /// User input role.
    pub const USER: &'static str = "user";
    /// Assistant response role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt role.
    pub const SYSTEM: &'static str = "system";

    /// Creates a turn with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    /// Creates a user turn.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system turn.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Returns true if this turn has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convenience_constructors() {
        assert_eq!(ChatTurn::user("hi").role, ChatTurn::USER);
        assert_eq!(ChatTurn::assistant("hello").role, ChatTurn::ASSISTANT);
        assert_eq!(ChatTurn::system("rules").role, ChatTurn::SYSTEM);
    }

    #[test]
    fn role_checking() {
        let turn = ChatTurn::user("hi");
        assert!(turn.has_role(ChatTurn::USER));
        assert!(!turn.has_role(ChatTurn::SYSTEM));
    }

    #[test]
    fn serde_round_trip() {
        let original = ChatTurn::assistant("It went up 20%.");
        let json = serde_json::to_string(&original).expect("serialize");
        let parsed: ChatTurn = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(original, parsed);
    }
}
