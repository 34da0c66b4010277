//! Folding decoded frames into per-turn fetch results.
//!
//! [`FrameAccumulator`] owns the growing reply for one turn.  [`FetchStream`] drives it from a
//! frame stream and is what callers consume: one [`FetchResult`] per frame, ending after the
//! final frame, after a transport failure, or as soon as the request is aborted.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::reply::parse_structured;
use crate::{Error, FetchResult, Result, StreamFrame};

/// Accumulates the assistant reply of a single turn.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buffer: String,
    finished: bool,
}

impl FrameAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `frame` and returns the result describing the reply so far.
    ///
    /// When the frame completes the reply and the reply is non-empty, the structured parse is
    /// attempted and its outcome attached.
    pub fn push(&mut self, frame: &StreamFrame) -> FetchResult {
        self.buffer.push_str(&frame.message.content);
        let result = FetchResult::fragment(self.buffer.clone(), frame.done);
        if !frame.done {
            return result;
        }
        self.finished = true;
        if self.buffer.is_empty() {
            result
        } else {
            result.with_structured(parse_structured(&self.buffer))
        }
    }

    /// The reply accumulated so far.
    pub fn reply(&self) -> &str {
        &self.buffer
    }

    /// True once a frame with `done` set has been pushed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// The lazily evaluated results of one chat request.
pub struct FetchStream {
    inner: Pin<Box<dyn Stream<Item = FetchResult> + Send>>,
    cancel: CancellationToken,
}

impl FetchStream {
    /// Wraps a frame stream.  Cancelling `cancel` ends the stream promptly, even mid-read.
    pub fn new<S>(frames: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Result<StreamFrame>> + Send + 'static,
    {
        let inner = stream::unfold(
            (Box::pin(frames), FrameAccumulator::new(), cancel.clone(), false),
            |(mut frames, mut accumulator, cancel, finished)| async move {
                if finished {
                    return None;
                }
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    next = frames.next() => next,
                };
                match next {
                    Some(Ok(frame)) => {
                        let result = accumulator.push(&frame);
                        let finished = result.is_final;
                        Some((result, (frames, accumulator, cancel, finished)))
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "chat stream failed");
                        Some((FetchResult::from(err), (frames, accumulator, cancel, true)))
                    }
                    None => None,
                }
            },
        );
        Self {
            inner: Box::pin(inner),
            cancel,
        }
    }

    /// A stream that yields exactly one failure result, unless `cancel` fires first.
    pub fn failed(err: Error, cancel: CancellationToken) -> Self {
        Self {
            inner: Box::pin(stream::once(async move { FetchResult::from(err) })),
            cancel,
        }
    }

    /// True when the request behind this stream was aborted.
    pub fn was_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for FetchStream {
    type Item = FetchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FetchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStream")
            .field("aborted", &self.was_aborted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::time::Duration;

    fn frames(items: Vec<Result<StreamFrame>>) -> FetchStream {
        FetchStream::new(stream::iter(items), CancellationToken::new())
    }

    #[tokio::test]
    async fn fragments_accumulate_in_order() {
        let results: Vec<FetchResult> = frames(vec![
            Ok(StreamFrame::new("The ", false)),
            Ok(StreamFrame::new("tide ", false)),
            Ok(StreamFrame::new("turns", false)),
        ])
        .collect()
        .await;
        let replies: Vec<&str> = results.iter().map(|r| r.reply.as_str()).collect();
        assert_eq!(replies, vec!["The ", "The tide ", "The tide turns"]);
        assert!(results.iter().all(|r| r.success && !r.is_final));
        assert!(results.iter().all(|r| r.structured.is_none()));
    }

    #[tokio::test]
    async fn stops_after_first_final_frame() {
        let results: Vec<FetchResult> = frames(vec![
            Ok(StreamFrame::new("a", false)),
            Ok(StreamFrame::new("b", true)),
            Ok(StreamFrame::new("c", false)),
            Ok(StreamFrame::new("d", true)),
        ])
        .collect()
        .await;
        assert_eq!(results.len(), 2);
        assert!(results[1].is_final);
        assert_eq!(results[1].reply, "ab");
    }

    #[tokio::test]
    async fn final_structured_reply_is_attached() {
        let results: Vec<FetchResult> = frames(vec![
            Ok(StreamFrame::new("{\"message\":\"Hel", false)),
            Ok(StreamFrame::new(
                "lo\",\"signal\":{\"type\":\"other\",\"reason\":\"\",\"data\":null}}",
                false,
            )),
            Ok(StreamFrame::new("", true)),
        ])
        .collect()
        .await;
        let last = results.last().unwrap();
        assert!(last.is_final);
        let structured = last.structured.as_ref().unwrap();
        assert_eq!(structured.message, "Hello");
        assert_eq!(structured.signal.as_ref().unwrap().kind, "other");
    }

    #[tokio::test]
    async fn plain_text_final_reply_has_no_structure() {
        let results: Vec<FetchResult> = frames(vec![
            Ok(StreamFrame::new("Just prose", false)),
            Ok(StreamFrame::new(", no JSON.", true)),
        ])
        .collect()
        .await;
        let last = results.last().unwrap();
        assert!(last.success);
        assert!(last.is_final);
        assert!(last.structured.is_none());
        assert_eq!(last.reply, "Just prose, no JSON.");
    }

    #[tokio::test]
    async fn empty_final_reply_skips_parse() {
        let results: Vec<FetchResult> = frames(vec![Ok(StreamFrame::new("", true))])
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_final);
        assert!(results[0].structured.is_none());
    }

    #[tokio::test]
    async fn body_ending_without_done_just_ends() {
        let results: Vec<FetchResult> = frames(vec![Ok(StreamFrame::new("half", false))])
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_final);
    }

    #[tokio::test]
    async fn stream_error_is_a_single_terminal_failure() {
        let results: Vec<FetchResult> = frames(vec![
            Ok(StreamFrame::new("a", false)),
            Err(Error::streaming("connection reset", None)),
            Ok(StreamFrame::new("b", true)),
        ])
        .collect()
        .await;
        assert_eq!(results.len(), 2);
        assert!(!results[1].success);
        assert!(results[1].is_final);
        assert!(results[1].error.contains("connection reset"));
    }

    #[tokio::test]
    async fn failed_yields_exactly_one_result() {
        let results: Vec<FetchResult> =
            FetchStream::failed(Error::api(500, "boom"), CancellationToken::new())
                .collect()
                .await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }

    #[tokio::test]
    async fn abort_stops_further_results() {
        let (tx, rx) = mpsc::unbounded::<Result<StreamFrame>>();
        let cancel = CancellationToken::new();
        let mut fetch = FetchStream::new(rx, cancel.clone());

        tx.unbounded_send(Ok(StreamFrame::new("one", false))).unwrap();
        let first = fetch.next().await.unwrap();
        assert_eq!(first.reply, "one");

        cancel.cancel();
        tx.unbounded_send(Ok(StreamFrame::new(" two", false))).unwrap();
        tx.unbounded_send(Ok(StreamFrame::new(" three", true))).unwrap();

        assert!(fetch.next().await.is_none());
        assert!(fetch.was_aborted());
    }

    #[tokio::test]
    async fn abort_wakes_a_pending_read() {
        let cancel = CancellationToken::new();
        let mut fetch = FetchStream::new(stream::pending::<Result<StreamFrame>>(), cancel.clone());
        let reader = tokio::spawn(async move { fetch.next().await });
        tokio::task::yield_now().await;
        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("read should end promptly")
            .unwrap();
        assert!(next.is_none());
    }

    #[test]
    fn accumulator_tracks_completion() {
        let mut accumulator = FrameAccumulator::new();
        accumulator.push(&StreamFrame::new("x", false));
        assert!(!accumulator.is_finished());
        accumulator.push(&StreamFrame::new("y", true));
        assert!(accumulator.is_finished());
        assert_eq!(accumulator.reply(), "xy");
    }
}
