use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts a caller-supplied id, treating blank input as absent.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        value.map(str::trim).filter(|value| !value.is_empty()).map(|value| Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operator,
    Collaborator,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn operator(text: impl Into<String>) -> Self {
        Self { role: Role::Operator, text: text.into() }
    }

    pub fn collaborator(text: impl Into<String>) -> Self {
        Self { role: Role::Collaborator, text: text.into() }
    }
}

/// Append-only turn log that forgets its oldest entries past `max_turns`.
/// After trimming the log never opens on a collaborator turn, so an odd
/// bound cannot leave a reply without the message it answered.
#[derive(Clone, Debug)]
pub struct Transcript {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl Transcript {
    pub fn new(max_turns: usize) -> Self {
        Self { turns: VecDeque::new(), max_turns: max_turns.max(1) }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        if self.turns.len() <= self.max_turns {
            return;
        }
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
        while self.turns.front().is_some_and(|turn| turn.role == Role::Collaborator) {
            self.turns.pop_front();
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
