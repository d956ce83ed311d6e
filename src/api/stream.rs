use super::logging::emit_sse_parse_error;
use super::service::FragmentStream;
use crate::types::{AnthropicEvent, OpenAiChunk, StreamEvent};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Buffers raw bytes until a blank line closes a frame. Frames are decoded
/// only once complete, so a character split across chunks stays intact.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.contains(&b'\r') {
            normalize_crlf(&mut self.buffer);
        }
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = find_frame_end(&self.buffer[start..]) {
            let event_end = start + end + 2;
            let frame = String::from_utf8_lossy(&self.buffer[start..event_end]);
            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
            start = event_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(events)
    }

    /// Parses whatever is left once the transport closed without a final
    /// blank line.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let remainder = self.flush();
        parse_frame(&remainder).into_iter().collect()
    }

    pub fn flush(&mut self) -> String {
        let remainder = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&remainder).into_owned()
    }
}

fn find_frame_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|pair| pair == b"\n\n")
}

/// A trailing `\r` is kept until the next chunk shows whether `\n` follows.
fn normalize_crlf(buffer: &mut Vec<u8>) {
    let mut normalized = Vec::with_capacity(buffer.len());
    let mut bytes = buffer.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        normalized.push(byte);
    }
    *buffer = normalized;
}

fn parse_frame(frame: &str) -> Option<StreamEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    let data = data_lines.join("\n");
    let data = data.trim();
    if data == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(error) => {
            emit_sse_parse_error(event_type.as_deref(), data, &error);
            return None;
        }
    };

    let anthropic_shaped = event_type.is_some() || value.get("type").is_some();
    if anthropic_shaped {
        match serde_json::from_value::<AnthropicEvent>(value) {
            Ok(event) => anthropic_to_stream_event(event),
            Err(error) => {
                emit_sse_parse_error(event_type.as_deref(), data, &error);
                None
            }
        }
    } else {
        match serde_json::from_value::<OpenAiChunk>(value) {
            Ok(chunk) => openai_to_stream_event(chunk),
            Err(error) => {
                emit_sse_parse_error(event_type.as_deref(), data, &error);
                None
            }
        }
    }
}

fn anthropic_to_stream_event(event: AnthropicEvent) -> Option<StreamEvent> {
    match event {
        AnthropicEvent::ContentBlockDelta { delta } => delta
            .text
            .filter(|text| !text.is_empty())
            .map(StreamEvent::TextDelta),
        AnthropicEvent::MessageStop => Some(StreamEvent::Done),
        AnthropicEvent::Error { error } => Some(StreamEvent::Error(error.describe())),
        AnthropicEvent::MessageStart
        | AnthropicEvent::ContentBlockStart
        | AnthropicEvent::ContentBlockStop
        | AnthropicEvent::MessageDelta
        | AnthropicEvent::Ping
        | AnthropicEvent::Unknown => None,
    }
}

fn openai_to_stream_event(chunk: OpenAiChunk) -> Option<StreamEvent> {
    if let Some(error) = chunk.error {
        return Some(StreamEvent::Error(error.describe()));
    }
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
        .map(StreamEvent::TextDelta)
}

struct FragmentState {
    bytes: ByteStream,
    parser: StreamParser,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

/// Turns a raw SSE byte stream into text fragments. A `Done` event ends the
/// stream even if the transport stays open.
pub fn fragment_stream(bytes: ByteStream) -> FragmentStream {
    let state = FragmentState {
        bytes,
        parser: StreamParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                match event {
                    StreamEvent::TextDelta(text) => return Some((Ok(text), state)),
                    StreamEvent::Done => {
                        state.finished = true;
                        state.pending.clear();
                        return None;
                    }
                    StreamEvent::Error(message) => {
                        state.finished = true;
                        state.pending.clear();
                        return Some((
                            Err(anyhow!("completion stream reported an error: {message}")),
                            state,
                        ));
                    }
                }
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.parser.process(&chunk) {
                    Ok(events) => state.pending.extend(events),
                    Err(error) => {
                        state.finished = true;
                        return Some((Err(error), state));
                    }
                },
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(error), state));
                }
                None => {
                    state.finished = true;
                    let trailing = state.parser.finish();
                    state.pending.extend(trailing);
                }
            }
        }
    }))
}
