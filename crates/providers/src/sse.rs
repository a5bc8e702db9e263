//! Server-sent events framing.
//!
//! [`SseDecoder`] turns raw byte chunks into [`SseFrame`]s without knowing
//! anything about the payloads. [`spawn_decoder`] drives a byte stream
//! through the decoder and a provider-specific [`FrameParser`], delivering
//! [`StreamEvent`]s on a bounded channel.

use cardsmith_core::error::ProviderError;
use cardsmith_core::provider::{FragmentReceiver, StreamEvent};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Channel depth between the decode task and the agent loop.
const CHANNEL_CAPACITY: usize = 64;

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field, if the server sent one.
    pub event: Option<String>,

    /// All `data:` lines of the event, joined with `\n`.
    pub data: String,
}

/// Incremental SSE line decoder.
///
/// Lines may be split across chunks anywhere, including inside a
/// multi-byte UTF-8 sequence; bytes are buffered until a full line is
/// available. Comment lines and unknown fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush at end of input: a trailing unterminated line and any event
    /// that never saw its blank-line terminator.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.process_line(line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseFrame {
            event: self.event.take(),
            data,
        })
    }
}

/// Why a frame could not become stream events.
#[derive(Debug)]
pub enum FrameError {
    /// The payload is not what the parser expects; the frame is skipped.
    Malformed(String),

    /// The provider reported an error in-band; the stream ends.
    Provider(ProviderError),
}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Provider-specific translation of SSE frames into stream events.
pub trait FrameParser: Send + 'static {
    /// Translate one frame. Returning [`StreamEvent::Done`] ends the stream.
    fn parse(&mut self, frame: &SseFrame) -> Result<Vec<StreamEvent>, FrameError>;
}

/// Decode `byte_stream` on a background task.
///
/// The task stops reading as soon as the receiver is dropped, which drops
/// the underlying response and aborts the connection. A stream that ends
/// without the provider's sentinel is a dropped connection and ends with
/// [`ProviderError::StreamInterrupted`], never `Done`.
pub fn spawn_decoder<S, B, E, P>(byte_stream: S, parser: P, provider: String) -> FragmentReceiver
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
    P: FrameParser,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut decoder = SseDecoder::new();
        let mut parser = parser;

        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!(provider = %provider, "Stream receiver dropped, abandoning read");
                    return;
                }
                next = byte_stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    for frame in decoder.feed(bytes.as_ref()) {
                        if !forward(&tx, &mut parser, &frame, &provider).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                        .await;
                    return;
                }
                None => break,
            }
        }

        if let Some(frame) = decoder.finish() {
            if !forward(&tx, &mut parser, &frame, &provider).await {
                return;
            }
        }

        debug!(provider = %provider, "Stream ended without sentinel");
        let _ = tx
            .send(Err(ProviderError::StreamInterrupted(
                "stream ended before end-of-turn sentinel".into(),
            )))
            .await;
    });

    rx
}

/// Parse one frame and send its events. Returns `false` once the stream is
/// over: sentinel seen, in-band error, or receiver gone.
async fn forward<P: FrameParser>(
    tx: &mpsc::Sender<Result<StreamEvent, ProviderError>>,
    parser: &mut P,
    frame: &SseFrame,
    provider: &str,
) -> bool {
    match parser.parse(frame) {
        Ok(events) => {
            for event in events {
                let done = event == StreamEvent::Done;
                if tx.send(Ok(event)).await.is_err() || done {
                    return false;
                }
            }
            true
        }
        Err(FrameError::Malformed(reason)) => {
            trace!(
                provider = %provider,
                data = %frame.data,
                error = %reason,
                "Ignoring unparseable SSE event"
            );
            true
        }
        Err(FrameError::Provider(e)) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
