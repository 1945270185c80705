//! SSE streaming response parser for OpenAI-compatible chat completions.
//!
//! Reads a byte stream, splits on SSE boundaries (`data: …\n\n`), parses each
//! chunk as JSON and yields the `content` deltas as text fragments. The byte
//! buffer is kept as raw bytes so multi-byte characters split across network
//! chunks decode correctly.

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::ChatCompletionChunk;

/// Outcome of one SSE event.
enum SseEvent {
    Text(String),
    Done,
    Skip,
}

// ─── SSE line parser ─────────────────────────────────────────────────────────

/// Parse raw SSE bytes into text fragments.
///
/// Generic over the byte source so it can be driven by
/// `reqwest::Response::bytes_stream()` or by an in-memory stream in tests.
/// Ends on `[DONE]`, on end of input, or after the first error item.
pub fn parse_sse_stream<S, B, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<String, InferenceError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let byte_stream = Box::pin(byte_stream);

    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                // Check if we have a complete SSE event in the buffer
                if let Some((event_end, sep_len)) = find_event_boundary(&buffer) {
                    let event: Vec<u8> = buffer.drain(..event_end + sep_len).collect();
                    let event = String::from_utf8_lossy(&event[..event_end]).into_owned();

                    match process_event(&event) {
                        Ok(SseEvent::Text(text)) => {
                            return Some((Ok(text), (byte_stream, buffer, false)))
                        }
                        Ok(SseEvent::Skip) => continue,
                        Ok(SseEvent::Done) => return None,
                        Err(e) => return Some((Err(e), (byte_stream, buffer, true))),
                    }
                }

                // Need more data from the stream
                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, buffer, true),
                        ));
                    }
                    None => {
                        // Stream ended, check for any remaining buffer content
                        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
                        buffer.clear();
                        if rest.is_empty() {
                            return None;
                        }
                        return match process_event(&rest) {
                            Ok(SseEvent::Text(text)) => Some((Ok(text), (byte_stream, buffer, true))),
                            Ok(_) => None,
                            Err(e) => Some((Err(e), (byte_stream, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

/// Locate the first blank-line event separator (`\n\n` or `\r\n\r\n`).
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Process a single SSE event string (may contain multiple `data:` lines).
fn process_event(event: &str) -> Result<SseEvent, InferenceError> {
    let mut data_content = String::new();

    for line in event.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
            let data = data.trim();
            if data == "[DONE]" {
                return Ok(SseEvent::Done);
            }
            data_content.push_str(data);
        }
        // Ignore non-data lines (comments, event types, etc.)
    }

    if data_content.is_empty() {
        return Ok(SseEvent::Skip); // Keep-alive or comment
    }

    let chunk: ChatCompletionChunk =
        serde_json::from_str(&data_content).map_err(|e| InferenceError::StreamError {
            reason: format!("failed to parse SSE chunk: {e}"),
        })?;

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();

    if text.is_empty() {
        Ok(SseEvent::Skip)
    } else {
        Ok(SseEvent::Text(text))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
