//! Generation port: the seam between the orchestrator and a text generator.
//!
//! A port turns ordered history plus a system prompt into a stream of text
//! fragments. Dropping the stream cancels the generation. A failure is
//! delivered as a final `Err` item; the orchestrator folds it into the
//! visible assistant text and ends the step.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};

use super::errors::InferenceError;
use super::types::ChatMessage;

/// Stream of generated text fragments.
pub type FragmentStream = BoxStream<'static, Result<String, InferenceError>>;

/// End-of-turn markers emitted by common chat templates.
pub const DEFAULT_END_OF_TURN_MARKERS: [&str; 4] =
    ["<|im_end|>", "<|eot_id|>", "<end_of_turn>", "<|endoftext|>"];

/// Produces generation streams.
pub trait GenerationPort: Send + Sync {
    fn generate(&self, history: Vec<ChatMessage>, system_prompt: &str) -> FragmentStream;
}

// ─── End-of-turn filter ──────────────────────────────────────────────────────

struct MarkerFilter {
    inner: FragmentStream,
    markers: Vec<String>,
    pending: String,
    outbox: VecDeque<Result<String, InferenceError>>,
    finished: bool,
}

impl MarkerFilter {
    /// Move whatever part of `pending` can no longer start a marker into the
    /// outbox. Returns true if a complete marker was found.
    fn drain(&mut self) -> bool {
        let hit = self
            .markers
            .iter()
            .filter_map(|m| self.pending.find(m.as_str()))
            .min();
        if let Some(at) = hit {
            self.pending.truncate(at);
            self.flush();
            return true;
        }

        let keep_from = self.held_suffix_start();
        if keep_from > 0 {
            let held = self.pending.split_off(keep_from);
            let ready = std::mem::replace(&mut self.pending, held);
            self.outbox.push_back(Ok(ready));
        }
        false
    }

    /// Byte offset of the longest suffix of `pending` that is a proper
    /// prefix of some marker (`pending.len()` if none).
    fn held_suffix_start(&self) -> usize {
        self.pending
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| {
                let tail = &self.pending[i..];
                self.markers
                    .iter()
                    .any(|m| m.len() > tail.len() && m.starts_with(tail))
            })
            .unwrap_or(self.pending.len())
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.outbox.push_back(Ok(std::mem::take(&mut self.pending)));
        }
    }
}

/// Wrap a stream so that end-of-turn markers never reach the consumer.
///
/// A marker ends the stream; text after it is discarded. Markers split
/// across fragments are recognised because a possible marker prefix at the
/// end of a fragment is held back until the next fragment decides it.
pub fn strip_end_of_turn(inner: FragmentStream, markers: Vec<String>) -> FragmentStream {
    let markers: Vec<String> = markers.into_iter().filter(|m| !m.is_empty()).collect();
    let filter = MarkerFilter {
        inner,
        markers,
        pending: String::new(),
        outbox: VecDeque::new(),
        finished: false,
    };

    stream::unfold(filter, |mut f| async move {
        loop {
            if let Some(item) = f.outbox.pop_front() {
                return Some((item, f));
            }
            if f.finished {
                return None;
            }
            match f.inner.next().await {
                Some(Ok(fragment)) => {
                    f.pending.push_str(&fragment);
                    if f.drain() {
                        f.finished = true;
                    }
                }
                Some(Err(e)) => {
                    f.flush();
                    f.outbox.push_back(Err(e));
                    f.finished = true;
                }
                None => {
                    f.flush();
                    f.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Default markers as owned strings.
pub fn default_end_of_turn_markers() -> Vec<String> {
    DEFAULT_END_OF_TURN_MARKERS
        .iter()
        .map(|m| m.to_string())
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(parts: &[&str]) -> FragmentStream {
        let items: Vec<Result<String, InferenceError>> =
            parts.iter().map(|p| Ok(p.to_string())).collect();
        stream::iter(items).boxed()
    }

    async fn collect(stream: FragmentStream) -> (String, Option<InferenceError>) {
        let mut text = String::new();
        let mut error = None;
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(f) => text.push_str(&f),
                Err(e) => error = Some(e),
            }
        }
        (text, error)
    }

    #[tokio::test]
    async fn test_passthrough_without_markers() {
        let out = strip_end_of_turn(fragments(&["Hello", ", ", "world"]), default_end_of_turn_markers());
        assert_eq!(collect(out).await.0, "Hello, world");
    }

    #[tokio::test]
    async fn test_marker_in_single_fragment_ends_stream() {
        let out = strip_end_of_turn(
            fragments(&["Done.<|im_end|>junk", "more junk"]),
            default_end_of_turn_markers(),
        );
        assert_eq!(collect(out).await.0, "Done.");
    }

    #[tokio::test]
    async fn test_marker_split_across_fragments() {
        let out = strip_end_of_turn(
            fragments(&["Answer<|eo", "t_", "id|>"]),
            default_end_of_turn_markers(),
        );
        assert_eq!(collect(out).await.0, "Answer");
    }

    #[tokio::test]
    async fn test_false_prefix_is_released() {
        let out = strip_end_of_turn(fragments(&["a <|", "b"]), default_end_of_turn_markers());
        assert_eq!(collect(out).await.0, "a <|b");
    }

    #[tokio::test]
    async fn test_held_prefix_flushed_at_end() {
        let out = strip_end_of_turn(fragments(&["tail <end_of"]), default_end_of_turn_markers());
        assert_eq!(collect(out).await.0, "tail <end_of");
    }

    #[tokio::test]
    async fn test_error_passes_through_after_text() {
        let items: Vec<Result<String, InferenceError>> = vec![
            Ok("partial".into()),
            Err(InferenceError::StreamError {
                reason: "reset".into(),
            }),
            Ok("never".into()),
        ];
        let out = strip_end_of_turn(stream::iter(items).boxed(), default_end_of_turn_markers());
        let (text, err) = collect(out).await;
        assert_eq!(text, "partial");
        assert!(matches!(err, Some(InferenceError::StreamError { .. })));
    }

    #[tokio::test]
    async fn test_multibyte_text_is_not_split() {
        let out = strip_end_of_turn(fragments(&["héllo wörld ✓", "<|endoftext|>"]), default_end_of_turn_markers());
        assert_eq!(collect(out).await.0, "héllo wörld ✓");
    }
}
