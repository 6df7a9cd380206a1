//! Incremental SSE re-encoding.
//!
//! [`OpenAiToClaudeStream`] is a single-pass transducer: it consumes an
//! OpenAI-compatible `data: <json>` chunk stream, arriving in arbitrary
//! read boundaries, and produces Claude-shaped SSE frames with correct event
//! ordering and exactly-once termination. The transducer itself is
//! synchronous; [`transform_sse_stream`] pumps an upstream byte stream
//! through it.

use super::claude::{
    ClaudeUsage, ContentBlock, ContentDelta, MessageDelta, StopReason, StreamEvent, StreamMessage,
};
use super::openai::OpenAiStreamChunk;
use super::StreamTransform;
use crate::core::error::{AppError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};

const SSE_DATA_PREFIX: &str = "data: ";
const SSE_DONE: &str = "[DONE]";

/// Stateful OpenAI-chunk to Claude-event stream transducer.
///
/// State is scoped to one stream's lifetime: the line-assembly buffer plus
/// the started/completed flags. Once `completed` is set nothing further is
/// emitted and closing again is a no-op.
pub struct OpenAiToClaudeStream {
    message_id: String,
    buffer: Vec<u8>,
    message_started: bool,
    text_block_started: bool,
    completed: bool,
}

impl OpenAiToClaudeStream {
    pub fn new() -> Self {
        OpenAiToClaudeStream {
            message_id: format!(
                "msg_{}",
                &uuid::Uuid::new_v4().to_string().replace('-', "")[..24]
            ),
            buffer: Vec::new(),
            message_started: false,
            text_block_started: false,
            completed: false,
        }
    }

    /// Handle one complete `data:` line.
    fn process_line(&mut self, line: &str, frames: &mut Vec<String>) -> Result<()> {
        let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) else {
            return Ok(());
        };

        if payload == SSE_DONE {
            frames.extend(self.close()?);
            return Ok(());
        }

        // A malformed frame is skipped, never fatal for the stream.
        let chunk: OpenAiStreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                let parse_error = AppError::StreamParse(err.to_string());
                tracing::warn!(line = payload, "{}", parse_error);
                return Ok(());
            }
        };

        let Some(choice) = chunk.choices.first() else {
            return Ok(());
        };

        if !self.message_started {
            self.message_started = true;
            let event = StreamEvent::MessageStart {
                message: StreamMessage {
                    id: self.message_id.clone(),
                    message_type: "message".to_string(),
                    role: "assistant".to_string(),
                    content: vec![],
                    model: chunk
                        .model
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: ClaudeUsage {
                        input_tokens: 1,
                        output_tokens: 1,
                    },
                },
            };
            frames.push(event.to_sse()?);
        }

        if let Some(text) = choice.delta.content.as_deref().filter(|t| !t.is_empty()) {
            if !self.text_block_started {
                self.text_block_started = true;
                let start = StreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlock::Text {
                        text: String::new(),
                    },
                };
                frames.push(start.to_sse()?);
            }

            let delta = StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta {
                    text: text.to_string(),
                },
            };
            frames.push(delta.to_sse()?);
        }

        // A finish reason is terminal, not merely informational.
        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            if self.text_block_started {
                frames.push(StreamEvent::ContentBlockStop { index: 0 }.to_sse()?);
            }

            let event = StreamEvent::MessageDelta {
                delta: MessageDelta {
                    stop_reason: StopReason::from_finish_reason(reason),
                    stop_sequence: None,
                },
                usage: chunk.usage.map(ClaudeUsage::from).unwrap_or_default(),
            };
            frames.push(event.to_sse()?);
            frames.extend(self.close()?);
        }

        Ok(())
    }

    /// Terminate the stream. Idempotent.
    fn close(&mut self) -> Result<Vec<String>> {
        if self.completed {
            return Ok(Vec::new());
        }
        self.completed = true;
        Ok(vec![StreamEvent::MessageStop.to_sse()?])
    }
}

impl Default for OpenAiToClaudeStream {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTransform for OpenAiToClaudeStream {
    fn process_chunk(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let mut frames = Vec::new();
        if self.completed {
            return Ok(frames);
        }

        self.buffer.extend_from_slice(chunk);

        // Process complete lines only; the trailing fragment stays buffered
        // for the next read.
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            consumed = end + 1;

            self.process_line(line.trim_end_matches('\r'), &mut frames)?;
            if self.completed {
                break;
            }
        }
        self.buffer.drain(..consumed);

        Ok(frames)
    }

    fn finish(&mut self) -> Result<Vec<String>> {
        self.close()
    }

    fn abort(&mut self) -> Vec<String> {
        // Best-effort terminal event; only meaningful once output exists.
        if self.message_started && !self.completed {
            self.completed = true;
            StreamEvent::MessageStop
                .to_sse()
                .map(|frame| vec![frame])
                .unwrap_or_default()
        } else {
            self.completed = true;
            Vec::new()
        }
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}

/// Pump an upstream byte stream through a [`StreamTransform`].
///
/// The output stream is pull-driven: the consumer's reads drive upstream
/// reads, so consumer backpressure naturally throttles the producer. The
/// upstream body is dropped on every exit path, including errors and early
/// consumer cancellation. An upstream read failure surfaces to the consumer
/// as an error after a best-effort terminal `message_stop`.
pub fn transform_sse_stream<S>(
    upstream: S,
    mut transform: Box<dyn StreamTransform>,
) -> impl Stream<Item = Result<Bytes>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(upstream);

        while let Some(read) = upstream.next().await {
            match read {
                Ok(chunk) => match transform.process_chunk(&chunk) {
                    Ok(frames) => {
                        for frame in frames {
                            yield Ok(Bytes::from(frame));
                        }
                        if transform.is_completed() {
                            // Terminal frame seen; stop reading.
                            return;
                        }
                    }
                    Err(err) => {
                        for frame in transform.abort() {
                            yield Ok(Bytes::from(frame));
                        }
                        yield Err(err);
                        return;
                    }
                },
                Err(err) => {
                    tracing::error!("upstream stream read failed: {}", err);
                    for frame in transform.abort() {
                        yield Ok(Bytes::from(frame));
                    }
                    yield Err(AppError::from(err));
                    return;
                }
            }
        }

        // Upstream ended without a terminal frame.
        match transform.finish() {
            Ok(frames) => {
                for frame in frames {
                    yield Ok(Bytes::from(frame));
                }
            }
            Err(err) => yield Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Split emitted frames back into (event, data-json) pairs.
    fn parse_frames(frames: &[String]) -> Vec<(String, serde_json::Value)> {
        frames
            .iter()
            .map(|frame| {
                let mut lines = frame.lines();
                let event = lines
                    .next()
                    .and_then(|l| l.strip_prefix("event: "))
                    .expect("event line")
                    .to_string();
                let data = lines
                    .next()
                    .and_then(|l| l.strip_prefix("data: "))
                    .expect("data line");
                (event, serde_json::from_str(data).expect("data json"))
            })
            .collect()
    }

    fn feed(transducer: &mut OpenAiToClaudeStream, input: &str) -> Vec<String> {
        transducer.process_chunk(input.as_bytes()).unwrap()
    }

    #[test]
    fn test_full_stream_event_sequence() {
        let mut transducer = OpenAiToClaudeStream::new();
        let mut frames = Vec::new();

        frames.extend(feed(
            &mut transducer,
            "data: {\"model\":\"m1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
        ));
        frames.extend(feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
        ));
        frames.extend(feed(&mut transducer, "data: [DONE]\n"));
        frames.extend(transducer.finish().unwrap());

        let events = parse_frames(&frames);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        let (_, start) = &events[0];
        assert_eq!(start["message"]["model"], "m1");
        assert!(start["message"]["id"]
            .as_str()
            .unwrap()
            .starts_with("msg_"));

        let (_, delta) = &events[2];
        assert_eq!(delta["index"], 0);
        assert_eq!(delta["delta"]["text"], "Hi");

        let (_, message_delta) = &events[4];
        assert_eq!(message_delta["delta"]["stop_reason"], "end_turn");
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut transducer = OpenAiToClaudeStream::new();

        let mut frames = feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{\"con",
        );
        assert!(frames.is_empty());

        frames.extend(feed(&mut transducer, "tent\":\"Hello\"}}]}\ndata: [DONE]\n"));

        let events = parse_frames(&frames);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "message_stop",
            ]
        );
        assert_eq!(events[2].1["delta"]["text"], "Hello");
    }

    #[test]
    fn test_malformed_line_is_skipped_not_fatal() {
        let mut transducer = OpenAiToClaudeStream::new();
        let mut frames = Vec::new();

        frames.extend(feed(&mut transducer, "data: {broken json\n"));
        assert!(frames.is_empty());

        frames.extend(feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        ));

        let events = parse_frames(&frames);
        assert_eq!(events[0].0, "message_start");
        assert_eq!(events[2].1["delta"]["text"], "ok");
        assert!(!transducer.is_completed());
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut transducer = OpenAiToClaudeStream::new();
        let frames = feed(
            &mut transducer,
            ": comment\nevent: something\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
        );

        let events = parse_frames(&frames);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].0, "message_start");
    }

    #[test]
    fn test_frames_without_choices_emit_nothing() {
        let mut transducer = OpenAiToClaudeStream::new();
        let frames = feed(&mut transducer, "data: {\"choices\":[]}\n");
        assert!(frames.is_empty());
        assert!(!transducer.is_completed());
    }

    #[test]
    fn test_missing_model_tolerated() {
        let mut transducer = OpenAiToClaudeStream::new();
        let frames = feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
        );
        let events = parse_frames(&frames);
        assert_eq!(events[0].1["message"]["model"], "unknown");
    }

    #[test]
    fn test_finish_reason_is_terminal() {
        let mut transducer = OpenAiToClaudeStream::new();
        let mut frames = feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":3}}\n",
        );
        assert!(transducer.is_completed());

        // Later frames must be ignored entirely.
        frames.extend(feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ));

        let events = parse_frames(&frames);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        // No text block was started, so none is closed.
        assert_eq!(names, vec!["message_start", "message_delta", "message_stop"]);
        assert_eq!(events[1].1["delta"]["stop_reason"], "max_tokens");
        assert_eq!(events[1].1["usage"]["input_tokens"], 7);
        assert_eq!(events[1].1["usage"]["output_tokens"], 3);
    }

    #[test]
    fn test_upstream_end_without_terminal_frame_still_stops() {
        let mut transducer = OpenAiToClaudeStream::new();
        let mut frames = feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
        );
        frames.extend(transducer.finish().unwrap());

        let events = parse_frames(&frames);
        assert_eq!(events.last().unwrap().0, "message_stop");
        assert!(transducer.is_completed());
    }

    #[test]
    fn test_termination_is_idempotent() {
        let mut transducer = OpenAiToClaudeStream::new();
        feed(&mut transducer, "data: [DONE]\n");
        assert!(transducer.is_completed());

        assert!(transducer.finish().unwrap().is_empty());
        assert!(transducer.finish().unwrap().is_empty());
        assert!(transducer.abort().is_empty());
        assert!(feed(&mut transducer, "data: [DONE]\n").is_empty());
    }

    #[test]
    fn test_abort_before_any_output_emits_nothing() {
        let mut transducer = OpenAiToClaudeStream::new();
        assert!(transducer.abort().is_empty());
        assert!(transducer.is_completed());
    }

    #[test]
    fn test_abort_after_partial_output_closes_stream() {
        let mut transducer = OpenAiToClaudeStream::new();
        feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
        );

        let frames = transducer.abort();
        let events = parse_frames(&frames);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "message_stop");
    }

    #[test]
    fn test_exactly_one_message_start() {
        let mut transducer = OpenAiToClaudeStream::new();
        let mut frames = Vec::new();
        for _ in 0..3 {
            frames.extend(feed(
                &mut transducer,
                "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
            ));
        }

        let events = parse_frames(&frames);
        let starts = events
            .iter()
            .filter(|(name, _)| name == "message_start")
            .count();
        let block_starts = events
            .iter()
            .filter(|(name, _)| name == "content_block_start")
            .count();
        assert_eq!(starts, 1);
        assert_eq!(block_starts, 1);
    }

    #[test]
    fn test_crlf_lines_handled() {
        let mut transducer = OpenAiToClaudeStream::new();
        let frames = feed(
            &mut transducer,
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\ndata: [DONE]\r\n",
        );
        let events = parse_frames(&frames);
        assert_eq!(events.last().unwrap().0, "message_stop");
    }

    // -------------------------------------------------------------------------
    // Async pump
    // -------------------------------------------------------------------------

    fn chunk_stream(
        chunks: Vec<reqwest::Result<Bytes>>,
    ) -> impl Stream<Item = reqwest::Result<Bytes>> + Send {
        futures::stream::iter(chunks)
    }

    async fn collect_output(
        stream: impl Stream<Item = Result<Bytes>> + Send,
    ) -> (String, Option<AppError>) {
        futures::pin_mut!(stream);
        let mut output = String::new();
        let mut error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => output.push_str(&String::from_utf8_lossy(&bytes)),
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }
        (output, error)
    }

    #[tokio::test]
    async fn test_pump_produces_terminated_stream() {
        let upstream = chunk_stream(vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
            )),
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
            )),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ]);

        let stream = transform_sse_stream(upstream, Box::new(OpenAiToClaudeStream::new()));
        let (output, error) = collect_output(stream).await;

        assert!(error.is_none());
        let stops = output.matches("event: message_stop").count();
        assert_eq!(stops, 1);
        assert!(output.ends_with("data: {\"type\":\"message_stop\"}\n\n"));
        assert!(output.starts_with("event: message_start"));
    }

    #[tokio::test]
    async fn test_pump_stops_reading_after_terminal_frame() {
        // The [DONE] line after the finish_reason frame must never be pulled;
        // a frame following termination is simply not read.
        let upstream = chunk_stream(vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
            )),
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
            )),
        ]);

        let stream = transform_sse_stream(upstream, Box::new(OpenAiToClaudeStream::new()));
        let (output, error) = collect_output(stream).await;

        assert!(error.is_none());
        assert!(!output.contains("late"));
        assert_eq!(output.matches("event: message_stop").count(), 1);
    }

    #[tokio::test]
    async fn test_pump_ends_stream_on_upstream_end() {
        let upstream = chunk_stream(vec![Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
        ))]);

        let stream = transform_sse_stream(upstream, Box::new(OpenAiToClaudeStream::new()));
        let (output, error) = collect_output(stream).await;

        assert!(error.is_none());
        assert!(output.contains("event: content_block_delta"));
        assert!(output.ends_with("data: {\"type\":\"message_stop\"}\n\n"));
    }
}
