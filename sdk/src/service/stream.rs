//! Event stream decoder for live command output
//!
//! The server answers a streamed run with a text body of `data: <json>`
//! lines. Lines without that marker (keep-alives, comments, blank
//! separators) are skipped. The decoder pulls one transport chunk at a time
//! and only when no complete line is buffered, so the consumer's pace bounds
//! how much is read off the connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::types::{CommandResult, ProcessEvent};
use crate::error::{Error, Result};

/// Marker in front of every event frame
const DATA_PREFIX: &str = "data:";

/// Splits a byte stream into lines
#[derive(Debug, Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&rest);
        Some(line.trim_end_matches('\r').to_string())
    }
}

/// Event frame as sent by the server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Stdout { data: String },
    Stderr { data: String },
    Exit { code: i32 },
    Error { message: String },
    #[serde(other)]
    Unknown,
}

/// Decode one line of the event stream.
///
/// Returns `Ok(None)` for lines that carry no event.
pub(crate) fn decode_line(line: &str) -> Result<Option<ProcessEvent>> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload).trim_end();
    if payload.is_empty() {
        return Ok(None);
    }

    let event: WireEvent = serde_json::from_str(payload)
        .map_err(|e| Error::Protocol(format!("malformed event frame: {}", e)))?;

    Ok(match event {
        WireEvent::Stdout { data } => Some(ProcessEvent::Stdout { data }),
        WireEvent::Stderr { data } => Some(ProcessEvent::Stderr { data }),
        WireEvent::Exit { code } => Some(ProcessEvent::Exit { code }),
        WireEvent::Error { message } => Some(ProcessEvent::Error { message }),
        WireEvent::Unknown => {
            warn!("Ignoring event with unrecognized type: {}", payload);
            None
        }
    })
}

struct DecodeState {
    /// Open connection; dropped as soon as the stream is done with it
    body: Option<BoxStream<'static, Result<Bytes>>>,
    lines: LineDecoder,
    /// Body ended before a terminal event was seen
    closed_early: bool,
}

impl DecodeState {
    fn close(&mut self) {
        self.body = None;
    }
}

fn closed_early_error() -> Error {
    Error::Protocol("event stream closed before exit event".to_string())
}

/// Lazy sequence of process events from one streamed run.
///
/// Ends after yielding `Exit` or `Error`, after yielding a transport or
/// decode error, or when dropped. Every one of those paths drops the
/// underlying connection. Not restartable.
pub struct ProcessEventStream {
    inner: BoxStream<'static, Result<ProcessEvent>>,
}

impl ProcessEventStream {
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        Self::from_body(response.bytes_stream())
    }

    pub(crate) fn from_body<S, E>(body: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<Error>,
    {
        let state = DecodeState {
            body: Some(body.map(|chunk| chunk.map_err(Into::into)).boxed()),
            lines: LineDecoder::default(),
            closed_early: false,
        };

        let inner = stream::unfold(state, |mut state| async move {
            loop {
                let Some(body) = state.body.as_mut() else {
                    if std::mem::take(&mut state.closed_early) {
                        return Some((Err(closed_early_error()), state));
                    }
                    return None;
                };

                if let Some(line) = state.lines.next_line() {
                    match decode_line(&line) {
                        Ok(Some(event)) => {
                            if event.is_terminal() {
                                debug!("Event stream finished: {:?}", event);
                                state.close();
                            }
                            return Some((Ok(event), state));
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            state.close();
                            return Some((Err(e), state));
                        }
                    }
                }

                match body.next().await {
                    Some(Ok(chunk)) => state.lines.push(&chunk),
                    Some(Err(e)) => {
                        state.close();
                        return Some((Err(e), state));
                    }
                    None => {
                        state.close();
                        warn!("Event stream closed before a terminal event");
                        let trailing = state.lines.finish();
                        return match trailing.as_deref().map(decode_line) {
                            Some(Ok(Some(event))) => {
                                state.closed_early = !event.is_terminal();
                                Some((Ok(event), state))
                            }
                            Some(Err(e)) => Some((Err(e), state)),
                            Some(Ok(None)) | None => Some((Err(closed_early_error()), state)),
                        };
                    }
                }
            }
        });

        Self {
            inner: inner.boxed(),
        }
    }

    /// Drain the stream into a buffered result.
    ///
    /// An `Error` event becomes [`Error::ProcessExecution`].
    pub async fn collect_output(mut self) -> Result<CommandResult> {
        let mut stdout = String::new();
        let mut stderr = String::new();

        while let Some(event) = self.next().await {
            match event? {
                ProcessEvent::Stdout { data } => stdout.push_str(&data),
                ProcessEvent::Stderr { data } => stderr.push_str(&data),
                ProcessEvent::Exit { code } => {
                    return Ok(CommandResult {
                        exit_code: code,
                        stdout,
                        stderr,
                    })
                }
                ProcessEvent::Error { message } => return Err(Error::ProcessExecution(message)),
            }
        }

        Err(closed_early_error())
    }
}

impl Stream for ProcessEventStream {
    type Item = Result<ProcessEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ProcessEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEventStream").finish_non_exhaustive()
    }
}
