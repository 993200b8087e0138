//! Stream Adapter (C9): segments a finished assistant turn into SSE frames
//! and drives the producer/consumer split spec.md §9 calls for in place of
//! the donor's thread-pool-plus-callback-trio bridge.
//!
//! A single `mpsc` channel carries typed `StreamEvent`s from the task that
//! runs the agent loop (the producer) to the task that owns the SSE
//! response body (the consumer); the emitter never touches the agent loop
//! directly and closes the channel on `Done`/`Error`.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::ToolCallRecord;

const INTER_SEGMENT_PACING: Duration = Duration::from_millis(30);

/// Sentence terminators a segment may end on, per spec.md §4.6. Kept with
/// the preceding segment rather than split onto its own frame.
const TERMINATORS: [char; 7] = ['.', '!', '?', '。', '！', '？', '\n'];

/// One event on the producer/consumer channel. Mirrors the four variants
/// spec.md §9 names for the replacement of the callback-trio pattern.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Segment(String),
    History(Vec<ToolCallRecord>),
    Done(String),
    Error(AppError),
}

/// Split `text` into sentence-sized, non-empty segments, each terminator
/// kept with its preceding text. Concatenating the result reproduces `text`
/// exactly (spec.md §8 round-trip property) — this function never trims or
/// inserts whitespace.
pub fn segment(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if TERMINATORS.contains(&ch) {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Sender half handed to the agent-running task; a thin wrapper so callers
/// don't need to name the channel's event type at every call site.
#[derive(Clone)]
pub struct EventProducer(mpsc::Sender<StreamEvent>);

impl EventProducer {
    pub async fn emit_final_text(&self, text: &str) {
        for piece in segment(text) {
            let _ = self.0.send(StreamEvent::Segment(piece)).await;
            tokio::time::sleep(INTER_SEGMENT_PACING).await;
        }
    }

    pub async fn emit_history(&self, records: Vec<ToolCallRecord>) {
        let _ = self.0.send(StreamEvent::History(records)).await;
    }

    pub async fn emit_done(&self, conversation_id: &str) {
        let _ = self
            .0
            .send(StreamEvent::Done(conversation_id.to_string()))
            .await;
    }

    pub async fn emit_error(&self, error: AppError) {
        let _ = self.0.send(StreamEvent::Error(error)).await;
    }
}

/// Build a fresh channel for one request. The agent-running task gets the
/// producer; the handler turns the receiver into the SSE response body.
pub fn channel() -> (EventProducer, mpsc::Receiver<StreamEvent>) {
    let (tx, rx) = mpsc::channel(32);
    (EventProducer(tx), rx)
}

/// Adapt the receiving half into the `axum::response::sse::Sse` body spec.md
/// §6 describes: `message*` frames, then exactly one `agent-history`, then
/// exactly one `done` on success, or `message*` then one `error` on failure
/// (spec.md §8 invariant on the event-sequence regex).
pub fn into_sse_response(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let mut rx = rx;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Segment(text) => {
                    yield Ok(Event::default().event("message").data(text));
                }
                StreamEvent::History(records) => {
                    let data = serde_json::to_string(&records).unwrap_or_else(|_| "[]".to_string());
                    yield Ok(Event::default().event("agent-history").data(data));
                }
                StreamEvent::Done(conversation_id) => {
                    yield Ok(Event::default().event("done").data(conversation_id));
                }
                StreamEvent::Error(err) => {
                    yield Ok(Event::default().event("error").data(err.to_sse_data()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_keep_terminators_with_preceding_text() {
        let segments = segment("Hello world. How are you? I'm fine!");
        assert_eq!(
            segments,
            vec![
                "Hello world.".to_string(),
                " How are you?".to_string(),
                " I'm fine!".to_string(),
            ]
        );
    }

    #[test]
    fn segments_handle_mixed_cjk_terminators() {
        let segments = segment("你好。今天天气怎么样？很好！");
        assert_eq!(
            segments,
            vec![
                "你好。".to_string(),
                "今天天气怎么样？".to_string(),
                "很好！".to_string(),
            ]
        );
    }

    #[test]
    fn segmenting_then_concatenating_reproduces_original_text() {
        let samples = [
            "no terminator here",
            "One. Two. Three.",
            "trailing newline\n",
            "",
            "只有一个词",
        ];
        for text in samples {
            let segments = segment(text);
            assert_eq!(segments.concat(), text);
        }
    }

    #[test]
    fn empty_text_produces_no_segments() {
        assert!(segment("").is_empty());
    }
}
