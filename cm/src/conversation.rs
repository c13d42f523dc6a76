//! Branchable conversation state
//!
//! A conversation is a persistent, append-only list of turns. Cloning one is
//! a checkpoint: the clone shares every existing turn with its source, and
//! anything appended afterwards to either side is invisible to the other.
//! Restoring a checkpoint is just going back to the saved value.

use std::sync::Arc;

use crate::llm::{Message, Role};

/// One message in a dialogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Message {
            role: turn.role,
            content: turn.text.clone(),
        }
    }
}

#[derive(Debug)]
struct Node {
    turn: Turn,
    parent: Option<Arc<Node>>,
}

/// Ordered, append-only dialogue with O(1) checkpoints
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    head: Option<Arc<Node>>,
    len: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A conversation opened by a system turn
    pub fn with_system(text: impl Into<String>) -> Self {
        Self::new().append(Turn::system(text))
    }

    /// A new conversation extending this one by `turn`; `self` is unchanged
    #[must_use]
    pub fn append(&self, turn: Turn) -> Self {
        Self {
            head: Some(Arc::new(Node {
                turn,
                parent: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Append in place; earlier checkpoints of this conversation are unaffected
    pub fn push(&mut self, turn: Turn) {
        *self = self.append(turn);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Turn> {
        self.head.as_deref().map(|n| &n.turn)
    }

    /// All turns, oldest first
    pub fn turns(&self) -> Vec<Turn> {
        let mut out = Vec::with_capacity(self.len);
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            out.push(n.turn.clone());
            node = n.parent.as_deref();
        }
        out.reverse();
        out
    }

    /// The system turns joined, and the remaining turns as messages
    pub fn to_request_parts(&self) -> (String, Vec<Message>) {
        let turns = self.turns();
        let system = turns
            .iter()
            .filter(|t| t.role == Role::System)
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let messages = turns.iter().filter(|t| t.role != Role::System).map(Message::from).collect();
        (system, messages)
    }

    /// Whether `self` is a checkpoint that `other` grew from (shares storage)
    #[cfg(test)]
    pub fn is_prefix_of(&self, other: &Conversation) -> bool {
        if self.len > other.len {
            return false;
        }
        let mut node = other.head.as_ref();
        for _ in 0..(other.len - self.len) {
            node = node.and_then(|n| n.parent.as_ref());
        }
        match (node, self.head.as_ref()) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Drop for Conversation {
    // Unlink uniquely-owned nodes iteratively so long chains can't blow the stack
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut n) => next = n.parent.take(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(c: &Conversation) -> Vec<String> {
        c.turns().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_append_leaves_source_untouched() {
        let base = Conversation::with_system("sys");
        let extended = base.append(Turn::user("q"));

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert_eq!(texts(&extended), vec!["sys", "q"]);
        assert_eq!(extended.last().unwrap().role, Role::User);
    }

    #[test]
    fn test_checkpoint_isolation_between_siblings() {
        let mut trunk = Conversation::with_system("sys");
        trunk.push(Turn::user("values?"));
        trunk.push(Turn::assistant("85%"));
        let checkpoint = trunk.clone();

        let mut branch_a = checkpoint.clone();
        branch_a.push(Turn::user("material A?"));
        branch_a.push(Turn::assistant("A"));

        let mut branch_b = checkpoint.clone();
        branch_b.push(Turn::user("material B?"));

        assert_eq!(texts(&checkpoint), vec!["sys", "values?", "85%"]);
        assert_eq!(texts(&branch_b), vec!["sys", "values?", "85%", "material B?"]);
        assert!(!texts(&branch_b).iter().any(|t| t.contains('A')));
        assert!(checkpoint.is_prefix_of(&branch_a));
        assert!(checkpoint.is_prefix_of(&branch_b));
        assert!(!branch_a.is_prefix_of(&branch_b));
    }

    #[test]
    fn test_to_request_parts_splits_system() {
        let conv = Conversation::with_system("be terse")
            .append(Turn::user("q"))
            .append(Turn::assistant("a"));
        let (system, messages) = conv.to_request_parts();
        assert_eq!(system, "be terse");
        assert_eq!(messages, vec![Message::user("q"), Message::assistant("a")]);
    }

    #[test]
    fn test_empty_conversation() {
        let conv = Conversation::new();
        assert!(conv.is_empty());
        assert!(conv.last().is_none());
        assert!(conv.is_prefix_of(&conv.append(Turn::user("x"))));
        let (system, messages) = conv.to_request_parts();
        assert!(system.is_empty());
        assert!(messages.is_empty());
    }

    #[test]
    fn test_long_chain_drops() {
        let mut conv = Conversation::new();
        for i in 0..100_000 {
            conv.push(Turn::user(i.to_string()));
        }
        assert_eq!(conv.len(), 100_000);
        drop(conv);
    }
}
