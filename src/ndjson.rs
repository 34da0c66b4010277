//! Newline-delimited JSON processing for streaming chat responses.
//!
//! The model server answers `/api/chat` with one JSON object per line.  This module turns the raw
//! byte stream of the response body into a stream of decoded [`StreamFrame`]s, buffering partial
//! lines across chunk boundaries.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_FRAMES, STREAM_SKIPPED_LINES};
use crate::{Error, Result, StreamFrame};

/// Process a stream of bytes into a stream of decoded frames.
///
/// Blank lines are ignored.  Lines that are not valid UTF-8 or do not decode as a frame are
/// skipped without ending the stream.  An error from the underlying body is yielded as
/// [`Error::Streaming`]; so is a frame in which the server reports an error.  A final line that is
/// missing its newline is still decoded when the body ends.
pub fn process_ndjson<S, E>(byte_stream: S) -> impl Stream<Item = Result<StreamFrame>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (byte_stream, buffer, false),
        move |(mut stream, mut buffer, mut eof)| async move {
            loop {
                // Drain complete lines before reading more.
                if let Some(line) = next_line(&mut buffer, eof) {
                    match decode_line(&line) {
                        Some(item) => return Some((item, (stream, buffer, eof))),
                        None => continue,
                    }
                }
                if eof {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((
                            Err(Error::streaming(
                                format!("Error in HTTP stream: {e}"),
                                Some(Box::new(e)),
                            )),
                            (stream, buffer, eof),
                        ));
                    }
                    None => eof = true,
                }
            }
        },
    )
}

/// Remove and return the next line from `buffer`, without its terminator.
///
/// Once the body has ended, whatever remains is the last line.
fn next_line(buffer: &mut Vec<u8>, eof: bool) -> Option<Vec<u8>> {
    if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        line.pop();
        Some(line)
    } else if eof && !buffer.is_empty() {
        Some(std::mem::take(buffer))
    } else {
        None
    }
}

/// Decode one line.  `None` means the line is skipped.
fn decode_line(line: &[u8]) -> Option<Result<StreamFrame>> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(err) => {
            STREAM_SKIPPED_LINES.click();
            tracing::debug!(error = %err, "skipping stream line that is not UTF-8");
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamFrame>(text) {
        Ok(frame) => {
            if let Some(message) = frame.error {
                STREAM_ERRORS.click();
                return Some(Err(Error::streaming(message, None)));
            }
            STREAM_FRAMES.click();
            Some(Ok(frame))
        }
        Err(err) => {
            STREAM_SKIPPED_LINES.click();
            tracing::debug!(error = %err, line = %text, "skipping malformed stream line");
            None
        }
    }
}
