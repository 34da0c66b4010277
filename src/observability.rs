use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("colloquy.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("colloquy.client.request_errors");
pub(crate) static CLIENT_ABORTS: Counter = Counter::new("colloquy.client.aborts");
pub(crate) static CLIENT_HEADER_LATENCY: Moments =
    Moments::new("colloquy.client.header_latency_seconds");

pub(crate) static STREAM_FRAMES: Counter = Counter::new("colloquy.stream.frames");
pub(crate) static STREAM_SKIPPED_LINES: Counter = Counter::new("colloquy.stream.skipped_lines");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("colloquy.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("colloquy.stream.bytes");

pub(crate) static STRUCTURED_PARSE_FAILURES: Counter =
    Counter::new("colloquy.reply.structured_parse_failures");

pub(crate) static CONVERSATION_TURNS: Counter = Counter::new("colloquy.conversation.turns");
pub(crate) static CONVERSATION_TURN_ERRORS: Counter =
    Counter::new("colloquy.conversation.turn_errors");
pub(crate) static CONVERSATION_TURN_DURATION: Moments =
    Moments::new("colloquy.conversation.turn_duration_seconds");

pub(crate) static SIGNALS_DISPATCHED: Counter = Counter::new("colloquy.signal.dispatched");
pub(crate) static SIGNALS_UNHANDLED: Counter = Counter::new("colloquy.signal.unhandled");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_ABORTS);
    collector.register_moments(&CLIENT_HEADER_LATENCY);

    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_SKIPPED_LINES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&STRUCTURED_PARSE_FAILURES);

    collector.register_counter(&CONVERSATION_TURNS);
    collector.register_counter(&CONVERSATION_TURN_ERRORS);
    collector.register_moments(&CONVERSATION_TURN_DURATION);

    collector.register_counter(&SIGNALS_DISPATCHED);
    collector.register_counter(&SIGNALS_UNHANDLED);
}
