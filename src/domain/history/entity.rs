//! Per-user transcript record

use serde::{Deserialize, Serialize};

use crate::domain::hashing::PseudonymizedUserId;
use crate::domain::store::ContainerDocument;

/// One exchange between the user and the responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub asker_text: String,
    pub responder_text: String,
}

impl Turn {
    pub fn new(asker_text: impl Into<String>, responder_text: impl Into<String>) -> Self {
        Self {
            asker_text: asker_text.into(),
            responder_text: responder_text.into(),
        }
    }
}

/// Stored transcript of one user, keyed by the hashed user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    id: String,
    user_id: String,
    #[serde(default)]
    turns: Vec<Turn>,
}

impl HistoryRecord {
    pub fn new(user: &PseudonymizedUserId) -> Self {
        Self {
            id: user.as_str().to_string(),
            user_id: user.as_str().to_string(),
            turns: Vec::new(),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    /// The last `limit` turns in chronological order
    pub fn recent(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// Append a turn, dropping the oldest ones beyond `max_turns`
    pub fn push_turn(&mut self, turn: Turn, max_turns: usize) {
        self.turns.push(turn);

        if self.turns.len() > max_turns {
            let overflow = self.turns.len() - max_turns;
            self.turns.drain(..overflow);
        }
    }
}

impl ContainerDocument for HistoryRecord {
    const PARTITION_KEY_PATH: &'static str = "user_id";

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> HistoryRecord {
        HistoryRecord::new(&PseudonymizedUserId::from_raw("user-1"))
    }

    #[test]
    fn test_new_record_is_keyed_by_hash() {
        let user = PseudonymizedUserId::from_raw("user-1");
        let record = HistoryRecord::new(&user);

        assert_eq!(record.id(), user.as_str());
        assert_eq!(record.partition_key(), user.as_str());
        assert!(record.turns().is_empty());
    }

    #[test]
    fn test_push_turn_keeps_window() {
        let mut record = record();

        for i in 0..7 {
            record.push_turn(Turn::new(format!("q{}", i), format!("a{}", i)), 5);
        }

        let asked: Vec<&str> = record.turns().iter().map(|t| t.asker_text.as_str()).collect();
        assert_eq!(asked, vec!["q2", "q3", "q4", "q5", "q6"]);
    }

    #[test]
    fn test_recent_turns() {
        let mut record = record();
        record.push_turn(Turn::new("q0", "a0"), 5);
        record.push_turn(Turn::new("q1", "a1"), 5);
        record.push_turn(Turn::new("q2", "a2"), 5);

        assert_eq!(record.recent(2), &[Turn::new("q1", "a1"), Turn::new("q2", "a2")]);
        assert_eq!(record.recent(10).len(), 3);
        assert!(record.recent(0).is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let mut record = record();
        record.push_turn(Turn::new("hi", "hello"), 5);

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], json["user_id"]);
        assert_eq!(json["turns"][0]["asker_text"], "hi");
        assert_eq!(json["turns"][0]["responder_text"], "hello");
    }
}
