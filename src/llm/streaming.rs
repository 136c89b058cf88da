//! Server-sent-event decoding of streamed chat completions

use super::{ChatAnswer, LlmError};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

/// Data payload that ends the stream
pub const DONE_MARKER: &str = "[DONE]";

/// Server-Sent Events (SSE) parser for streaming responses
///
/// Bytes are buffered until a full frame (terminated by a blank line) has
/// arrived, so frames and multi-byte characters may be split across chunks.
pub struct SseParser {
    pending: Vec<u8>,
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            buffer: String::new(),
        }
    }

    /// Feed raw bytes and extract complete SSE events
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let decoded = self.take_decoded();
        self.parse(&decoded)
    }

    /// Feed decoded text and extract complete SSE events
    pub fn parse(&mut self, data: &str) -> Vec<SseEvent> {
        self.buffer.push_str(data);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(event_end) = self.buffer.find("\n\n") {
            let event_data: String = self.buffer.drain(..event_end + 2).collect();
            if let Some(event) = Self::parse_event(&event_data) {
                events.push(event);
            }
        }
        events
    }

    /// Whether a partial frame is still buffered
    pub fn has_partial(&self) -> bool {
        !self.buffer.trim().is_empty() || !self.pending.is_empty()
    }

    // Decode the longest valid UTF-8 prefix, keeping an incomplete trailing
    // sequence for the next chunk
    fn take_decoded(&mut self) -> String {
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                let rest = self.pending.split_off(e.valid_up_to());
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending = rest;
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }

    fn parse_event(data: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut event_data = String::new();
        let mut has_data = false;
        let mut event_id = None;

        for line in data.lines() {
            // Comment lines, used by servers as keep-alives
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.find(':') {
                Some(colon_pos) => (&line[..colon_pos], line[colon_pos + 1..].trim_start()),
                None => (line, ""),
            };

            match field {
                "event" => event_type = Some(value.to_string()),
                "data" => {
                    if has_data {
                        event_data.push('\n');
                    }
                    event_data.push_str(value);
                    has_data = true;
                }
                "id" => event_id = Some(value.to_string()),
                _ => {}
            }
        }

        has_data.then(|| SseEvent {
            event_type,
            data: event_data,
            id: event_id,
        })
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents a Server-Sent Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Check if this is the terminal `[DONE]` event
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_MARKER
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Lifecycle of one streamed answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

/// Assembles an answer from streamed completion chunks
pub struct AnswerStream {
    parser: SseParser,
    answer: ChatAnswer,
    state: StreamState,
}

impl AnswerStream {
    pub fn new() -> Self {
        Self {
            parser: SseParser::new(),
            answer: ChatAnswer::default(),
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn answer(&self) -> &ChatAnswer {
        &self.answer
    }

    /// Feed one network chunk, calling `on_progress` for every delta frame
    ///
    /// Frames with an unparsable payload are logged and skipped.
    pub fn feed<F>(&mut self, chunk: &[u8], on_progress: &mut F)
    where
        F: FnMut(&ChatAnswer) + ?Sized,
    {
        if self.state == StreamState::Idle {
            self.state = StreamState::Streaming;
        }
        if self.state != StreamState::Streaming {
            return;
        }

        for event in self.parser.feed(chunk) {
            if event.is_done() {
                self.state = StreamState::Completed;
                return;
            }

            match serde_json::from_str::<CompletionChunk>(&event.data) {
                Ok(frame) => {
                    if let Some(id) = frame.id.filter(|id| !id.is_empty()) {
                        self.answer.id = id;
                    }
                    if let Some(content) = frame
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                    {
                        self.answer.text.push_str(&content);
                    }
                    on_progress(&self.answer);
                }
                Err(e) => {
                    warn!("Skipping malformed stream frame ({}): {}", e, event.data);
                }
            }
        }
    }

    /// Whether the `[DONE]` frame has been seen
    pub fn is_complete(&self) -> bool {
        self.state == StreamState::Completed
    }

    /// Mark the stream as ended by the server
    pub fn finish(&mut self) -> ChatAnswer {
        if self.parser.has_partial() {
            debug!("Stream ended with an incomplete frame, discarding it");
        }
        self.state = StreamState::Completed;
        self.answer.clone()
    }

    pub fn fail(&mut self) {
        self.state = StreamState::Failed;
    }
}

impl Default for AnswerStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive a byte stream to completion, reporting every answer snapshot
///
/// Reading stops at the `[DONE]` frame or when the stream ends. The stream is
/// owned here and dropped on every exit path, which releases the underlying
/// connection.
pub async fn consume_stream<S, E, F>(stream: S, on_progress: &mut F) -> Result<ChatAnswer, LlmError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<LlmError>,
    F: FnMut(&ChatAnswer) + ?Sized,
{
    futures::pin_mut!(stream);
    let mut answer = AnswerStream::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                answer.fail();
                return Err(e.into());
            }
        };

        answer.feed(&chunk, on_progress);
        if answer.is_complete() {
            break;
        }
    }

    Ok(answer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn delta(id: &str, content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"id": id, "choices": [{"delta": {"content": content}}]})
        )
    }

    fn hello_world_body() -> String {
        format!(
            "{}{}{}data: [DONE]\n\n",
            delta("chatcmpl-1", "Hello"),
            delta("chatcmpl-1", " "),
            delta("chatcmpl-1", "world")
        )
    }

    fn chunked(body: &str, sizes: &[usize]) -> Vec<Result<Bytes, LlmError>> {
        let bytes = body.as_bytes();
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while start < bytes.len() {
            let size = sizes[i % sizes.len()];
            let end = (start + size).min(bytes.len());
            chunks.push(Ok(Bytes::copy_from_slice(&bytes[start..end])));
            start = end;
            i += 1;
        }
        chunks
    }

    #[test]
    fn test_sse_parser() {
        let mut parser = SseParser::new();

        let events = parser.parse("event: message\ndata: Hello\n\nevent: done\ndata: [DONE]\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, Some("message".to_string()));
        assert_eq!(events[0].data, "Hello");
        assert_eq!(events[1].event_type, Some("done".to_string()));
        assert!(events[1].is_done());
    }

    #[test]
    fn test_sse_parser_buffers_partial_frames() {
        let mut parser = SseParser::new();
        assert!(parser.parse("data: {\"a\"").is_empty());
        assert!(parser.has_partial());
        assert!(parser.parse(": 1}\n").is_empty());

        let events = parser.parse("\ndata: second\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\": 1}");
        assert_eq!(events[1].data, "second");
        assert!(!parser.has_partial());
    }

    #[test]
    fn test_sse_parser_skips_comments_and_joins_data_lines() {
        let mut parser = SseParser::new();
        let events = parser.parse(": keep-alive\n\ndata: one\ndata: two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn test_sse_parser_keeps_split_multibyte_characters() {
        let mut parser = SseParser::new();
        let body = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(parser.feed(&body[..split]).is_empty());
        let events = parser.feed(&body[split..]);
        assert_eq!(events[0].data, "héllo");
    }

    #[tokio::test]
    async fn test_accumulates_deltas_across_arbitrary_chunk_boundaries() {
        for sizes in [vec![1], vec![3, 7], vec![17], vec![64], vec![10_000]] {
            let mut progress = Vec::new();
            let answer = consume_stream(stream::iter(chunked(&hello_world_body(), &sizes)), &mut |a: &ChatAnswer| {
                progress.push(a.text.clone())
            })
            .await
            .unwrap();

            assert_eq!(progress, vec!["Hello", "Hello ", "Hello world"], "chunk sizes {:?}", sizes);
            assert_eq!(answer.text, "Hello world");
            assert_eq!(answer.id, "chatcmpl-1");
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let body = format!(
            "{}data: {{not json\n\n{}data: [DONE]\n\n",
            delta("c", "first"),
            delta("c", " second")
        );
        let mut progress = Vec::new();
        let answer = consume_stream(stream::iter(chunked(&body, &[5])), &mut |a: &ChatAnswer| {
            progress.push(a.text.clone())
        })
        .await
        .unwrap();

        assert_eq!(progress, vec!["first", "first second"]);
        assert_eq!(answer.text, "first second");
    }

    #[tokio::test]
    async fn test_frame_without_content_reports_unchanged_text() {
        let body = format!(
            "data: {}\n\n{}",
            serde_json::json!({"id": "c", "choices": [{"delta": {"role": "assistant"}}]}),
            delta("c", "hi")
        );
        let mut progress = Vec::new();
        let answer = consume_stream(stream::iter(chunked(&body, &[8])), &mut |a: &ChatAnswer| {
            progress.push(a.text.clone())
        })
        .await
        .unwrap();

        assert_eq!(progress, vec!["", "hi"]);
        assert_eq!(answer.text, "hi");
    }

    #[tokio::test]
    async fn test_null_or_missing_id_keeps_text_and_last_id() {
        let body = format!(
            "{}data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
            delta("chatcmpl-7", "Hi"),
            serde_json::json!({"id": null, "choices": [{"delta": {"content": " there"}}]}),
            serde_json::json!({"choices": [{"delta": {"content": "!"}}]}),
        );
        let mut progress = Vec::new();
        let answer = consume_stream(stream::iter(chunked(&body, &[16])), &mut |a: &ChatAnswer| {
            progress.push(a.text.clone())
        })
        .await
        .unwrap();

        assert_eq!(progress, vec!["Hi", "Hi there", "Hi there!"]);
        assert_eq!(answer.text, "Hi there!");
        assert_eq!(answer.id, "chatcmpl-7");
    }

    #[tokio::test]
    async fn test_null_id_frame_alone_is_not_dropped() {
        let body = "data: {\"id\":null,\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        let answer = consume_stream(stream::iter(chunked(body, &[1000])), &mut |_: &ChatAnswer| {})
            .await
            .unwrap();
        assert_eq!(answer.text, "Hi");
        assert_eq!(answer.id, "");
    }

    #[tokio::test]
    async fn test_stream_end_without_done_completes() {
        let body = delta("c", "partial answer");
        let answer = consume_stream(stream::iter(chunked(&body, &[4])), &mut |_: &ChatAnswer| {})
            .await
            .unwrap();
        assert_eq!(answer.text, "partial answer");
    }

    #[tokio::test]
    async fn test_frames_after_done_are_ignored() {
        let body = format!("{}data: [DONE]\n\n{}", delta("c", "kept"), delta("c", " dropped"));
        let mut calls = 0;
        let answer = consume_stream(stream::iter(chunked(&body, &[1000])), &mut |_: &ChatAnswer| calls += 1)
            .await
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(answer.text, "kept");
    }

    #[tokio::test]
    async fn test_transport_error_fails_the_stream() {
        let chunks: Vec<Result<Bytes, LlmError>> = vec![
            Ok(Bytes::from(delta("c", "Hel"))),
            Err(LlmError::InvalidResponse {
                message: "connection reset".to_string(),
            }),
        ];
        let mut progress = Vec::new();
        let err = consume_stream(stream::iter(chunks), &mut |a: &ChatAnswer| progress.push(a.text.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::InvalidResponse { .. }));
        assert_eq!(progress, vec!["Hel"]);
    }

    #[test]
    fn test_answer_stream_states() {
        let mut answer = AnswerStream::new();
        assert_eq!(answer.state(), StreamState::Idle);

        answer.feed(delta("c", "x").as_bytes(), &mut |_: &ChatAnswer| {});
        assert_eq!(answer.state(), StreamState::Streaming);

        answer.feed(b"data: [DONE]\n\n", &mut |_: &ChatAnswer| {});
        assert_eq!(answer.state(), StreamState::Completed);

        let mut failed = AnswerStream::new();
        failed.fail();
        assert_eq!(failed.state(), StreamState::Failed);
    }
}
