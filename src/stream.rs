use std::collections::VecDeque;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::logprobs::{RawLogprobs, TokenLogprobs, merge_logprobs};

/// One step of an in-flight generation: the text accumulated so far and the
/// merged logprob data for the token that produced this step, when the server
/// was asked for probabilities.
#[derive(Debug, Clone)]
pub struct GenerationChunk {
    pub text: String,
    pub logprobs: Option<TokenLogprobs>,
}

/// Incremental server-sent-event framing. Feed it raw bytes, get back the
/// `data` payload of every completed event. Field lines other than `data` and
/// comment lines are ignored; CRLF line endings are tolerated.
#[derive(Default)]
pub struct SseParser {
    buf: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                // Blank line closes the event.
                if !self.data_lines.is_empty() {
                    events.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data_lines
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        events
    }
}

/// Pulls the user-facing message out of a provider error record, which spells
/// it as `message`, `error` or `error.message` depending on the failure.
pub(crate) fn error_message(data: &Value) -> Option<String> {
    if let Some(message) = data.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    match data.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Object(error)) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

struct DecodeState<S> {
    inner: S,
    parser: SseParser,
    pending: VecDeque<String>,
    text: String,
}

/// Turns the response byte stream into a lazy sequence of generation chunks.
/// Forward-only and non-restartable; ends when the transport stream ends. An
/// error record from the server fails the whole stream with its message.
/// Dropping the returned stream drops the transport and aborts the request.
pub fn decode_sse<S, E>(stream: S) -> impl Stream<Item = Result<GenerationChunk>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<anyhow::Error>,
{
    let state = DecodeState {
        inner: stream,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        text: String::new(),
    };
    futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                let chunk = apply_event(&mut state.text, &data)?;
                return Ok(Some((chunk, state)));
            }
            match state.inner.next().await {
                Some(Ok(bytes)) => {
                    let events = state.parser.push(&bytes);
                    state.pending.extend(events);
                }
                Some(Err(err)) => return Err(err.into()),
                None => return Ok(None),
            }
        }
    })
}

fn apply_event(text: &mut String, data: &str) -> Result<GenerationChunk> {
    let event: Value = serde_json::from_str(data).context("Malformed stream record")?;

    if let Some(message) = error_message(&event) {
        bail!("{message}");
    }

    if let Some(token) = event.get("token").and_then(Value::as_str) {
        text.push_str(token);
    }

    let logprobs = match event.get("logprobs") {
        Some(value) if !value.is_null() => {
            let raw: RawLogprobs =
                serde_json::from_value(value.clone()).context("Malformed logprobs record")?;
            merge_logprobs(&raw)
        }
        _ => None,
    };

    Ok(GenerationChunk {
        text: text.clone(),
        logprobs,
    })
}
