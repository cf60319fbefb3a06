use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a conversation entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The authenticated end user
    User,
    /// The plain-text echo responder
    Assistant,
    /// The command interpreter itself
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line of the conversation
///
/// Serialized as `{"role": ..., "content": ..., "user": ...}` where `user`
/// is only present on entries submitted by an end user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatEntry {
    pub fn user(username: &str, content: impl Into<String>) -> Self {
        ChatEntry {
            role: Role::User,
            content: content.into(),
            user: Some(username.to_string()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatEntry {
            role: Role::Assistant,
            content: content.into(),
            user: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        ChatEntry {
            role: Role::System,
            content: content.into(),
            user: None,
        }
    }
}

/// Append-only log of the entries in one chat session
///
/// Insertion order is the canonical order. Entries cannot be removed or
/// edited once pushed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    entries: Vec<ChatEntry>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    pub fn as_slice(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Lines for the display sink, newest first
    pub fn render_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .rev()
            .map(|entry| format!("{}: {}", entry.role, entry.content))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_insertion_order() {
        let mut history = ConversationHistory::new();
        history.push(ChatEntry::user("alice", "hi"));
        history.push(ChatEntry::assistant("You said: hi"));

        let roles: Vec<Role> = history.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_render_lines_newest_first() {
        let mut history = ConversationHistory::new();
        history.push(ChatEntry::user("alice", "hi"));
        history.push(ChatEntry::system("ok"));

        assert_eq!(history.render_lines(), vec!["system: ok", "user: hi"]);
    }

    #[test]
    fn test_entry_serialization_omits_missing_user() {
        let json = serde_json::to_value(ChatEntry::system("done")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "done"}));

        let json = serde_json::to_value(ChatEntry::user("bob", "yo")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "user", "content": "yo", "user": "bob"})
        );
    }

    #[test]
    fn test_history_is_a_plain_json_array() {
        let history: ConversationHistory = serde_json::from_str(
            r#"[{"role": "user", "content": "a", "user": "u"}, {"role": "assistant", "content": "b"}]"#,
        )
        .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().map(|e| e.role), Some(Role::Assistant));
    }
}
