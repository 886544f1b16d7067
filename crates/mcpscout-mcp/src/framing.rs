//! Stream framing: capped line reads for stdio and SSE frame parsing.
//!
//! Both readers work on an explicit buffer with a per-line cap. A line longer
//! than the cap is skipped without ever being held in memory in full.

use std::io;
use std::sync::OnceLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{trace, warn};

/// Static regex for terminal escape sequences, compiled once.
static ANSI_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn ansi_regex() -> &'static regex::Regex {
    ANSI_REGEX.get_or_init(|| {
        regex::Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Remove terminal colour and cursor escape sequences from diagnostic text.
///
/// Input longer than `max_len` is truncated before matching.
pub fn strip_ansi(text: &str, max_len: usize) -> String {
    let bounded = match text.char_indices().nth(max_len) {
        Some((idx, _)) => &text[..idx],
        None => text,
    };
    ansi_regex().replace_all(bounded, "").into_owned()
}

/// Outcome of one capped line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundedLine {
    /// A complete line, without its terminator.
    Line(String),
    /// A line that exceeded the cap: its full length and its first bytes.
    Oversized { len: usize, head: String },
    /// End of stream.
    Eof,
}

/// Read one `\n`-terminated line, keeping at most `max_len` bytes.
///
/// The whole line is always consumed from `reader`, so the next call starts
/// on the following line even when this one was oversized.
pub async fn read_bounded_line<R>(reader: &mut R, max_len: usize) -> io::Result<BoundedLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut seen = 0usize;

    loop {
        let (consumed, complete) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                if seen == 0 {
                    return Ok(BoundedLine::Eof);
                }
                break;
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    append_capped(&mut buf, &mut seen, max_len, &available[..pos]);
                    (pos + 1, true)
                }
                None => {
                    append_capped(&mut buf, &mut seen, max_len, available);
                    (available.len(), false)
                }
            }
        };
        reader.consume(consumed);
        if complete {
            break;
        }
    }

    if seen > max_len {
        return Ok(BoundedLine::Oversized {
            len: seen,
            head: String::from_utf8_lossy(&buf).into_owned(),
        });
    }
    let mut line = String::from_utf8_lossy(&buf).into_owned();
    if line.ends_with('\r') {
        line.pop();
    }
    Ok(BoundedLine::Line(line))
}

/// Bytes of an oversized line kept for inspection.
const OVERSIZED_HEAD: usize = 256;

fn append_capped(buf: &mut Vec<u8>, seen: &mut usize, max_len: usize, chunk: &[u8]) {
    *seen += chunk.len();
    if *seen <= max_len {
        buf.extend_from_slice(chunk);
    } else if buf.len() > OVERSIZED_HEAD {
        buf.truncate(OVERSIZED_HEAD);
        buf.shrink_to_fit();
    } else {
        // Still a prefix of the line: earlier chunks were kept in full.
        let take = (OVERSIZED_HEAD - buf.len()).min(chunk.len());
        buf.extend_from_slice(&chunk[..take]);
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `message` when the frame had no `event:` field.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` parser.
#[derive(Debug)]
pub struct SseFrameParser {
    pending: Vec<u8>,
    max_line: usize,
    discarding: bool,
    dropped: usize,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseFrameParser {
    pub fn new(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            discarding: false,
            dropped: 0,
            event: None,
            data: Vec::new(),
            id: None,
        }
    }

    /// Feed a chunk of bytes, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            let line = &raw[..raw.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.len() > self.max_line {
                warn!(len = line.len(), "Skipping oversized SSE line");
                self.dropped += 1;
                continue;
            }
            if let Some(event) = self.process_line(&String::from_utf8_lossy(line)) {
                events.push(event);
            }
        }

        if self.pending.len() > self.max_line {
            warn!(len = self.pending.len(), "Discarding oversized SSE line");
            self.pending.clear();
            self.discarding = true;
            self.dropped += 1;
        }

        events
    }

    /// Number of lines discarded for exceeding the cap so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Flush a trailing event when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() && !self.discarding {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            other => trace!(field = other, "Ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.clone(),
        })
    }
}
