//! The per-NPC conversation state machine.
//!
//! A [`Conversation`] owns the message history and is either idle or awaiting a reply.  The
//! synchronous steps ([`Conversation::submit`], [`Conversation::apply`], [`Conversation::fail`],
//! [`Conversation::finish_incomplete`]) can be driven by hand; [`Conversation::take_turn`] runs a
//! whole turn against the transport and keeps a [`ConversationView`] up to date.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::Value;

use crate::client::Transport;
use crate::observability::{
    CONVERSATION_TURN_DURATION, CONVERSATION_TURN_ERRORS, CONVERSATION_TURNS,
};
use crate::prompt::{PromptPolicy, RawHistory};
use crate::render::ConversationView;
use crate::signal::{Dispatch, SignalDispatcher};
use crate::{ChatMessage, ChatRole, FetchResult};

/// Shown in place of a reply when the player aborts a turn.
pub const ABORTED: &str = "request aborted";

/// Whether a conversation can accept input.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TurnState {
    /// Ready for the next player message.
    #[default]
    Idle,
    /// A request is in flight; input is ignored.
    AwaitingReply,
}

/// The effect of applying one step of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// No turn was in flight, so nothing changed.
    Ignored,
    /// The reply grew; the turn continues.
    Updated,
    /// The reply completed.  Carries what became of its signal.
    Completed(Dispatch),
    /// The stream ended without completing and the partial reply was kept.
    Incomplete,
    /// The turn failed with this message.
    Failed(String),
}

/// How a turn driven by [`Conversation::take_turn`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The input was blank or a turn was already in flight.
    Ignored,
    /// The NPC replied.  `reply` is the display text.
    Completed {
        /// Text shown to the player.
        reply: String,
        /// What became of the reply's signal.
        dispatch: Dispatch,
    },
    /// The reply stopped early; `reply` is what arrived.
    Incomplete {
        /// Text shown to the player.
        reply: String,
    },
    /// The turn failed.
    Failed {
        /// Why.
        error: String,
    },
}

/// One NPC's conversation with the player.
pub struct Conversation {
    transport: Arc<dyn Transport>,
    model: String,
    format: Option<Value>,
    backstory: Option<String>,
    policy: Box<dyn PromptPolicy>,
    dispatcher: SignalDispatcher,
    history: Vec<ChatMessage>,
    state: TurnState,
    refresh_pending: bool,
    turn_started: Option<Instant>,
}

impl Conversation {
    /// Create an idle conversation with `model` that sends the history as stored and discards
    /// signals.
    pub fn new(transport: Arc<dyn Transport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            format: None,
            backstory: None,
            policy: Box::new(RawHistory),
            dispatcher: SignalDispatcher::discard(),
            history: Vec::new(),
            state: TurnState::Idle,
            refresh_pending: false,
            turn_started: None,
        }
    }

    /// Seed the history with the NPC's backstory as its leading system message.
    ///
    /// The backstory survives [`Conversation::reset`].
    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        let backstory = backstory.into();
        let seeded = self.backstory.is_some()
            && self.history.first().is_some_and(|m| m.role == ChatRole::System);
        if seeded {
            self.history[0].content = backstory.clone();
        } else {
            self.history.insert(0, ChatMessage::system(backstory.clone()));
        }
        self.backstory = Some(backstory);
        self
    }

    /// Constrain replies with a JSON schema.
    pub fn with_format(mut self, format: Option<Value>) -> Self {
        self.format = format;
        self
    }

    /// Replace the prompt policy.
    pub fn with_policy(mut self, policy: Box<dyn PromptPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Route signals through `dispatcher`.
    pub fn with_dispatcher(mut self, dispatcher: SignalDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// The model addressed by the next turn.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch models.  Takes effect on the next turn.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// The stored history, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The current turn state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// True while a reply is outstanding.
    pub fn is_awaiting_reply(&self) -> bool {
        self.state == TurnState::AwaitingReply
    }

    /// Returns whether the history changed since the last call, and clears the flag.
    pub fn take_refresh_pending(&mut self) -> bool {
        std::mem::take(&mut self.refresh_pending)
    }

    /// Begin a turn.
    ///
    /// Appends the player's message and an empty reply placeholder, and returns the prompt to
    /// send.  Blank input, or input while a reply is outstanding, is ignored.
    pub fn submit(&mut self, input: &str) -> Option<Vec<ChatMessage>> {
        let input = input.trim();
        if input.is_empty() || self.is_awaiting_reply() {
            return None;
        }
        self.history.push(ChatMessage::user(input));
        let prompt = self.policy.build_prompt(&self.history);
        self.history.push(ChatMessage::assistant(""));
        self.state = TurnState::AwaitingReply;
        self.refresh_pending = true;
        self.turn_started = Some(Instant::now());
        CONVERSATION_TURNS.click();
        Some(prompt)
    }

    /// Apply one result of the in-flight request.
    pub fn apply(&mut self, result: &FetchResult) -> TurnEvent {
        if !self.is_awaiting_reply() {
            return TurnEvent::Ignored;
        }
        if !result.success {
            return self.fail(&result.error);
        }
        self.set_placeholder(ChatRole::Assistant, result.reply.clone());
        if !result.is_final {
            return TurnEvent::Updated;
        }
        self.end_turn();
        let dispatch = match &result.structured {
            Some(structured) => self.dispatcher.dispatch(structured.signal.as_ref()),
            None => Dispatch::Ignored,
        };
        TurnEvent::Completed(dispatch)
    }

    /// End the in-flight turn with an error shown in place of the reply.
    pub fn fail(&mut self, error: &str) -> TurnEvent {
        if !self.is_awaiting_reply() {
            return TurnEvent::Ignored;
        }
        CONVERSATION_TURN_ERRORS.click();
        tracing::warn!(error = %error, "turn failed");
        self.set_placeholder(ChatRole::System, format!("Error: {error}"));
        self.end_turn();
        TurnEvent::Failed(error.to_string())
    }

    /// End a turn whose reply stream stopped before its final frame.
    ///
    /// An aborted turn fails.  Otherwise whatever arrived stands as the reply, unparsed.
    pub fn finish_incomplete(&mut self, aborted: bool) -> TurnEvent {
        if !self.is_awaiting_reply() {
            return TurnEvent::Ignored;
        }
        if aborted {
            return self.fail(ABORTED);
        }
        tracing::debug!("reply ended without a final frame");
        self.end_turn();
        TurnEvent::Incomplete
    }

    /// Run one whole turn.
    ///
    /// Input on `view` is disabled for the duration of the turn and re-enabled however it ends,
    /// including when the returned future is dropped part way; a dropped turn is aborted and
    /// fails.  The view is refreshed after every applied result, in arrival order.
    pub async fn take_turn(
        &mut self,
        input: &str,
        view: &mut dyn ConversationView,
    ) -> TurnOutcome {
        let Some(prompt) = self.submit(input) else {
            return TurnOutcome::Ignored;
        };
        let turn = TurnGuard {
            conversation: self,
            view,
        };
        turn.view.set_input_enabled(false);
        turn.conversation.refresh(&mut *turn.view);

        let transport = Arc::clone(&turn.conversation.transport);
        let mut results = transport
            .fetch(
                &turn.conversation.model,
                &prompt,
                turn.conversation.format.as_ref(),
            )
            .await;
        let mut event = None;
        while let Some(result) = results.next().await {
            match turn.conversation.apply(&result) {
                TurnEvent::Updated => turn.conversation.refresh(&mut *turn.view),
                TurnEvent::Ignored => {}
                terminal => {
                    event = Some(terminal);
                    break;
                }
            }
        }
        let event = match event {
            Some(event) => event,
            None => turn.conversation.finish_incomplete(results.was_aborted()),
        };
        turn.conversation.refresh(&mut *turn.view);

        match event {
            TurnEvent::Completed(dispatch) => {
                if let Dispatch::Unhandled(handler) = &dispatch {
                    turn.view.print_error(&format!(
                        "The NPC sent a signal nobody handles: {handler}"
                    ));
                }
                TurnOutcome::Completed {
                    reply: turn.conversation.last_reply(),
                    dispatch,
                }
            }
            TurnEvent::Incomplete => TurnOutcome::Incomplete {
                reply: turn.conversation.last_reply(),
            },
            TurnEvent::Failed(error) => TurnOutcome::Failed { error },
            // The turn cannot be ended elsewhere while `self` is borrowed here.
            TurnEvent::Ignored | TurnEvent::Updated => TurnOutcome::Ignored,
        }
    }

    /// Forget the dialogue, keeping only the backstory, and return to idle.
    ///
    /// A request still in flight is aborted.
    pub fn reset(&mut self) {
        if self.is_awaiting_reply() {
            self.transport.abort();
        }
        self.history.clear();
        if let Some(backstory) = &self.backstory {
            self.history.push(ChatMessage::system(backstory.clone()));
        }
        self.state = TurnState::Idle;
        self.turn_started = None;
        self.refresh_pending = true;
        tracing::info!("conversation reset");
    }

    /// Abort the in-flight request.
    pub fn abort(&self) {
        self.transport.abort();
    }

    fn refresh(&mut self, view: &mut dyn ConversationView) {
        if self.take_refresh_pending() {
            view.refresh(&self.history);
        }
    }

    fn set_placeholder(&mut self, role: ChatRole, content: String) {
        if let Some(last) = self.history.last_mut() {
            last.role = role;
            last.content = content;
            self.refresh_pending = true;
        }
    }

    fn end_turn(&mut self) {
        self.state = TurnState::Idle;
        if let Some(started) = self.turn_started.take() {
            CONVERSATION_TURN_DURATION.add(started.elapsed().as_secs_f64());
        }
    }

    fn last_reply(&self) -> String {
        self.history
            .last()
            .map(|msg| crate::reply::extract_display_text(&msg.content))
            .unwrap_or_default()
    }
}

/// Holds a turn started by [`Conversation::take_turn`].  Dropping it ends the turn: a reply still
/// outstanding is aborted and fails, and input is re-enabled.
struct TurnGuard<'c, 'v> {
    conversation: &'c mut Conversation,
    view: &'v mut dyn ConversationView,
}

impl Drop for TurnGuard<'_, '_> {
    fn drop(&mut self) {
        if self.conversation.is_awaiting_reply() {
            self.conversation.transport.abort();
            self.conversation.fail(ABORTED);
            self.conversation.refresh(&mut *self.view);
        }
        self.view.set_input_enabled(true);
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("model", &self.model)
            .field("state", &self.state)
            .field("messages", &self.history.len())
            .finish_non_exhaustive()
    }
}
