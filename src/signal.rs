//! Routing structured-reply signals to progress handlers.
//!
//! A signal names its event in snake case (`topic_completed`).  The name is turned into a handler
//! name (`OnTopicCompleted`) and resolved against the closed set in [`SignalKind`].  Anything that
//! does not resolve is reported and dropped; a bad signal never ends a conversation.

use serde_json::Value;

use crate::Signal;
use crate::observability::{SIGNALS_DISPATCHED, SIGNALS_UNHANDLED};

/// Signal types that mean "nothing happened".
pub const NO_OP_SIGNALS: &[&str] = &["other", "none"];

/// The handlers a signal can resolve to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The player demonstrated understanding of a topic.
    TopicCompleted,
    /// The player reached a milestone within the current topic.
    CheckpointReached,
    /// The NPC finished quizzing the player.
    AssessmentCompleted,
    /// The NPC judged the material too easy or too hard.
    DifficultyChanged,
    /// The NPC closed the session.
    SessionEnded,
}

impl SignalKind {
    /// Every kind, in declaration order.
    pub const ALL: [SignalKind; 5] = [
        SignalKind::TopicCompleted,
        SignalKind::CheckpointReached,
        SignalKind::AssessmentCompleted,
        SignalKind::DifficultyChanged,
        SignalKind::SessionEnded,
    ];

    /// Resolve a handler name such as `OnTopicCompleted`.
    pub fn from_handler_name(name: &str) -> Option<Self> {
        match name {
            "OnTopicCompleted" => Some(SignalKind::TopicCompleted),
            "OnCheckpointReached" => Some(SignalKind::CheckpointReached),
            "OnAssessmentCompleted" => Some(SignalKind::AssessmentCompleted),
            "OnDifficultyChanged" => Some(SignalKind::DifficultyChanged),
            "OnSessionEnded" => Some(SignalKind::SessionEnded),
            _ => None,
        }
    }

    /// The handler name this kind answers to.
    pub fn handler_name(self) -> &'static str {
        match self {
            SignalKind::TopicCompleted => "OnTopicCompleted",
            SignalKind::CheckpointReached => "OnCheckpointReached",
            SignalKind::AssessmentCompleted => "OnAssessmentCompleted",
            SignalKind::DifficultyChanged => "OnDifficultyChanged",
            SignalKind::SessionEnded => "OnSessionEnded",
        }
    }
}

/// Convert a snake-case signal type into its handler name.
///
/// Each `_`-separated segment has its first letter upper-cased and the segments are joined
/// behind an `On` prefix: `topic_completed` becomes `OnTopicCompleted`.
pub fn handler_name(kind: &str) -> String {
    let mut name = String::from("On");
    for segment in kind.split('_') {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// Receives progress events.  Owned by the game; the dispatcher only calls into it.
pub trait ProgressTracker: Send {
    /// The player completed a topic.
    fn on_topic_completed(&mut self, reason: &str, data: &Value);

    /// The player reached a checkpoint.
    fn on_checkpoint_reached(&mut self, reason: &str, data: &Value);

    /// The player finished an assessment.
    fn on_assessment_completed(&mut self, reason: &str, data: &Value);

    /// The NPC wants the difficulty changed.
    fn on_difficulty_changed(&mut self, reason: &str, data: &Value) {
        _ = reason;
        _ = data;
    }

    /// The NPC ended the session.
    fn on_session_ended(&mut self, reason: &str, data: &Value) {
        _ = reason;
        _ = data;
    }
}

/// What became of a dispatched signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// There was no signal, or its type was empty.
    Ignored,
    /// The signal was the reserved no-op sentinel.
    NoOp,
    /// The matching handler ran.
    Handled(SignalKind),
    /// No handler exists under this name.
    Unhandled(String),
}

/// Routes signals to a [`ProgressTracker`].
pub struct SignalDispatcher {
    tracker: Box<dyn ProgressTracker>,
}

impl SignalDispatcher {
    /// Create a dispatcher that forwards to `tracker`.
    pub fn new(tracker: Box<dyn ProgressTracker>) -> Self {
        Self { tracker }
    }

    /// A dispatcher whose handlers do nothing.
    pub fn discard() -> Self {
        Self::new(Box::new(NullTracker))
    }

    /// Route `signal` to its handler.
    pub fn dispatch(&mut self, signal: Option<&Signal>) -> Dispatch {
        let Some(signal) = signal else {
            return Dispatch::Ignored;
        };
        let kind = signal.kind.trim();
        if kind.is_empty() {
            return Dispatch::Ignored;
        }
        if NO_OP_SIGNALS.contains(&kind) {
            return Dispatch::NoOp;
        }

        let name = handler_name(kind);
        let Some(resolved) = SignalKind::from_handler_name(&name) else {
            SIGNALS_UNHANDLED.click();
            tracing::warn!(signal = %kind, handler = %name, "no handler for signal");
            return Dispatch::Unhandled(name);
        };

        let (reason, data) = (signal.reason.as_str(), &signal.data);
        match resolved {
            SignalKind::TopicCompleted => self.tracker.on_topic_completed(reason, data),
            SignalKind::CheckpointReached => self.tracker.on_checkpoint_reached(reason, data),
            SignalKind::AssessmentCompleted => self.tracker.on_assessment_completed(reason, data),
            SignalKind::DifficultyChanged => self.tracker.on_difficulty_changed(reason, data),
            SignalKind::SessionEnded => self.tracker.on_session_ended(reason, data),
        }
        SIGNALS_DISPATCHED.click();
        tracing::info!(signal = %kind, reason = %reason, "signal dispatched");
        Dispatch::Handled(resolved)
    }
}

impl std::fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalDispatcher").finish_non_exhaustive()
    }
}

struct NullTracker;

impl ProgressTracker for NullTracker {
    fn on_topic_completed(&mut self, _: &str, _: &Value) {}
    fn on_checkpoint_reached(&mut self, _: &str, _: &Value) {}
    fn on_assessment_completed(&mut self, _: &str, _: &Value) {}
}
