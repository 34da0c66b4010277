//! Prompt construction policies.
//!
//! A policy turns the stored conversation history into the message list sent for a turn.  The
//! stored history is never modified; anything a policy adds is recomputed for every request.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::signal::ProgressTracker;
use crate::{ChatMessage, ChatRole};

/// Builds the prompt for a turn from the stored history.
pub trait PromptPolicy: Send {
    /// Return the messages to send, oldest first.
    fn build_prompt(&self, history: &[ChatMessage]) -> Vec<ChatMessage>;
}

/// Sends the history as stored.
///
/// Only the leading system message (the NPC's backstory) is kept; later System-role messages are
/// error markers meant for the player, not the model.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawHistory;

impl PromptPolicy for RawHistory {
    fn build_prompt(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        dialogue(history)
    }
}

fn dialogue(history: &[ChatMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .enumerate()
        .filter(|(idx, msg)| *idx == 0 || msg.role != ChatRole::System)
        .map(|(_, msg)| msg.clone())
        .collect()
}

////////////////////////////////////////// SessionContext /////////////////////////////////////////

/// How hard the NPC should pitch its explanations.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Difficulty {
    /// New to the subject.
    #[default]
    Beginner,
    /// Knows the basics.
    Intermediate,
    /// Ready for depth.
    Advanced,
}

impl Difficulty {
    /// Interpret a signal payload naming a level, either by name or as 1..=3.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => match n.as_u64()? {
                1 => Some(Difficulty::Beginner),
                2 => Some(Difficulty::Intermediate),
                3 => Some(Difficulty::Advanced),
                _ => None,
            },
            Value::Object(map) => map
                .get("level")
                .or_else(|| map.get("difficulty"))
                .and_then(Difficulty::from_value),
            _ => None,
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" | "easy" => Ok(Difficulty::Beginner),
            "intermediate" | "medium" => Ok(Difficulty::Intermediate),
            "advanced" | "hard" => Ok(Difficulty::Advanced),
            other => Err(format!("unknown difficulty {other:?}")),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Beginner => write!(f, "beginner"),
            Difficulty::Intermediate => write!(f, "intermediate"),
            Difficulty::Advanced => write!(f, "advanced"),
        }
    }
}

/// What the NPC knows about the player's progress.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Sessions played so far, including the current one.
    pub session_count: u32,
    /// Topics the player has completed, in completion order, without duplicates.
    pub mastered_topics: Vec<String>,
    /// Current pitch.
    pub difficulty: Difficulty,
}

impl SessionState {
    fn master(&mut self, topic: String) {
        if !self.mastered_topics.contains(&topic) {
            self.mastered_topics.push(topic);
        }
    }

    /// The block appended to the leading system message.
    pub fn describe(&self) -> String {
        let topics = if self.mastered_topics.is_empty() {
            "none yet".to_string()
        } else {
            self.mastered_topics.join(", ")
        };
        format!(
            "Session context:\n- Session number: {}\n- Mastered topics: {}\n- Difficulty: {}",
            self.session_count, topics, self.difficulty
        )
    }
}

/// Rewrites the leading system message with the player's progress.
///
/// The state is shared with the [`SessionProgress`] tracker returned by
/// [`SessionContext::tracker`], so progress signals from one turn shape the prompt of the next.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    state: Arc<Mutex<SessionState>>,
}

impl SessionContext {
    /// Create a policy seeded with `state`.
    pub fn new(state: SessionState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A progress tracker that records into this context.
    pub fn tracker(&self) -> SessionProgress {
        SessionProgress {
            state: Arc::clone(&self.state),
            forward: None,
        }
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Override the difficulty.
    pub fn set_difficulty(&self, difficulty: Difficulty) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .difficulty = difficulty;
    }
}

impl PromptPolicy for SessionContext {
    fn build_prompt(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut prompt = dialogue(history);
        let context = self.state().describe();
        if prompt.first().is_some_and(|m| m.role == ChatRole::System) {
            prompt[0].content = format!("{}\n\n{}", prompt[0].content, context);
        } else {
            prompt.insert(0, ChatMessage::system(context));
        }
        prompt
    }
}

/// Records progress signals into a [`SessionContext`], optionally forwarding them on.
pub struct SessionProgress {
    state: Arc<Mutex<SessionState>>,
    forward: Option<Box<dyn ProgressTracker>>,
}

impl SessionProgress {
    /// Also deliver every event to `tracker` after recording it.
    pub fn forwarding(mut self, tracker: Box<dyn ProgressTracker>) -> Self {
        self.forward = Some(tracker);
        self
    }

    fn with_state(&self, f: impl FnOnce(&mut SessionState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *state);
    }
}

impl fmt::Debug for SessionProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProgress")
            .field("forwarding", &self.forward.is_some())
            .finish_non_exhaustive()
    }
}

/// The topic named by a signal: `data.topic`, a bare string payload, or else the reason.
fn topic_of(reason: &str, data: &Value) -> Option<String> {
    let topic = match data {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("topic").and_then(Value::as_str).unwrap_or(reason),
        _ => reason,
    };
    let topic = topic.trim();
    (!topic.is_empty()).then(|| topic.to_string())
}

impl ProgressTracker for SessionProgress {
    fn on_topic_completed(&mut self, reason: &str, data: &Value) {
        if let Some(topic) = topic_of(reason, data) {
            self.with_state(|state| state.master(topic));
        }
        if let Some(forward) = self.forward.as_mut() {
            forward.on_topic_completed(reason, data);
        }
    }

    fn on_checkpoint_reached(&mut self, reason: &str, data: &Value) {
        if let Some(forward) = self.forward.as_mut() {
            forward.on_checkpoint_reached(reason, data);
        }
    }

    fn on_assessment_completed(&mut self, reason: &str, data: &Value) {
        if let Some(forward) = self.forward.as_mut() {
            forward.on_assessment_completed(reason, data);
        }
    }

    fn on_difficulty_changed(&mut self, reason: &str, data: &Value) {
        match Difficulty::from_value(data) {
            Some(difficulty) => self.with_state(|state| state.difficulty = difficulty),
            None => tracing::warn!(payload = %data, "difficulty signal without a usable level"),
        }
        if let Some(forward) = self.forward.as_mut() {
            forward.on_difficulty_changed(reason, data);
        }
    }

    fn on_session_ended(&mut self, reason: &str, data: &Value) {
        self.with_state(|state| state.session_count = state.session_count.saturating_add(1));
        if let Some(forward) = self.forward.as_mut() {
            forward.on_session_ended(reason, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are Mira, the lighthouse keeper."),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Ahoy!"),
            ChatMessage::user("Why is the sea salty?"),
            ChatMessage::system("Error: Server error: HTTP 500"),
        ]
    }

    #[test]
    fn raw_history_drops_error_markers() {
        let prompt = RawHistory.build_prompt(&history());
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, ChatRole::System);
        assert!(prompt[1..].iter().all(|m| m.role != ChatRole::System));
    }

    #[test]
    fn session_context_rewrites_leading_system_message() {
        let context = SessionContext::new(SessionState {
            session_count: 3,
            mastered_topics: vec!["tides".to_string(), "salinity".to_string()],
            difficulty: Difficulty::Intermediate,
        });
        let stored = history();
        let prompt = context.build_prompt(&stored);

        assert!(prompt[0].content.starts_with("You are Mira, the lighthouse keeper."));
        assert!(prompt[0].content.contains("Session number: 3"));
        assert!(prompt[0].content.contains("Mastered topics: tides, salinity"));
        assert!(prompt[0].content.contains("Difficulty: intermediate"));
        // The stored history is untouched.
        assert_eq!(stored, history());
    }

    #[test]
    fn session_context_inserts_system_message_when_missing() {
        let context = SessionContext::default();
        let prompt = context.build_prompt(&[ChatMessage::user("Hi")]);
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, ChatRole::System);
        assert!(prompt[0].content.contains("Mastered topics: none yet"));
    }

    #[test]
    fn progress_signals_shape_the_next_prompt() {
        let context = SessionContext::default();
        let mut tracker = context.tracker();

        tracker.on_topic_completed("", &json!({"topic": "buoyancy"}));
        tracker.on_topic_completed("buoyancy", &Value::Null);
        tracker.on_topic_completed("", &json!("currents"));
        tracker.on_difficulty_changed("doing well", &json!({"level": "advanced"}));
        tracker.on_session_ended("", &Value::Null);

        let state = context.state();
        assert_eq!(state.mastered_topics, vec!["buoyancy", "currents"]);
        assert_eq!(state.difficulty, Difficulty::Advanced);
        assert_eq!(state.session_count, 1);

        let prompt = context.build_prompt(&[ChatMessage::system("Backstory")]);
        assert!(prompt[0].content.contains("buoyancy, currents"));
    }

    #[test]
    fn unusable_difficulty_is_ignored() {
        let context = SessionContext::default();
        context.tracker().on_difficulty_changed("", &json!(7));
        assert_eq!(context.state().difficulty, Difficulty::Beginner);
        context.set_difficulty(Difficulty::Advanced);
        assert_eq!(context.state().difficulty, Difficulty::Advanced);
    }

    #[test]
    fn difficulty_parsing() {
        assert_eq!(Difficulty::from_value(&json!(2)), Some(Difficulty::Intermediate));
        assert_eq!(Difficulty::from_value(&json!("Hard")), Some(Difficulty::Advanced));
        assert_eq!(Difficulty::from_value(&json!(null)), None);
    }
}
