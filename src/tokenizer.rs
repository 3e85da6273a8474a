//! Streaming splitter for the child's stderr.
//!
//! [`LogCodec`] is a [`Decoder`] that turns a raw byte stream into
//! [`LogRecord`]s. A physical line whose newline is followed by whitespace
//! is continued by the next line, so an indented stack trace stays attached
//! to the message that produced it:
//!
//! ```text
//! ERROR: boom\n  at foo\n  at bar\nNEXT: ok\n
//! => "ERROR: boom\n  at foo\n  at bar", "NEXT: ok"
//! ```
//!
//! Indentation is the only signal. An indented line that actually starts an
//! unrelated message is folded into the record before it. A line whose
//! newline is the last byte read so far is emitted at once, so continuation
//! lines fold only when they are already buffered behind the line they
//! continue. An empty line is a continuation too (`\n` is whitespace), so a
//! blank line folds into the record before it, which then ends in `\n`.

use crate::record::LogRecord;
use bytes::{Buf, BytesMut};
use regex::bytes::Regex;
use std::io;
use std::sync::OnceLock;
use tokio_util::codec::Decoder;
use tracing::warn;

// Bytes that continue a record when they follow a newline.
const CONTINUATION_BYTES: &[u8] = b"\t\n\x0C\r ";

// First line, one or more continuation lines, then a complete line that
// starts the next record.
fn multi_line_record() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?-u)\A[^\n]*(?:\n[\t\n\x0C\r ][^\n]*)+\n[^\t\n\x0C\r ][^\n]*\n")
            .expect("static pattern compiles")
    })
}

// A newline that ends the current record.
fn record_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?-u)\n[^\t\n\x0C\r ]").expect("static pattern compiles"))
}

fn is_continuation(byte: u8) -> bool {
    CONTINUATION_BYTES.contains(&byte)
}

/// Outcome of inspecting the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Split {
    /// `record` bytes form a record; skip `advance` bytes in total.
    Record { record: usize, advance: usize },
    /// The boundary cannot be confirmed yet.
    NeedMore,
}

/*
    @@@
    @split();
    . Looks only at the first record in the buffer; later records are handled once it is consumed.
    . First line followed by an indented line: waits until the line that starts the next record is complete.
    . First line followed by anything else, or by the end of the buffer: emits it right away.
    . No newline at all: waits.
*/
fn split(data: &[u8]) -> Split {
    let Some(first_nl) = data.iter().position(|&b| b == b'\n') else {
        return Split::NeedMore;
    };

    match data.get(first_nl + 1) {
        Some(&next) if is_continuation(next) => {
            let Some(m) = multi_line_record().find(data) else {
                return Split::NeedMore;
            };
            // the match ends with the next record's newline; the record ends one line earlier
            let end = m.end() - 1;
            let record = data[..end]
                .iter()
                .rposition(|&b| b == b'\n')
                .unwrap_or(end);
            let advance = record + 1;
            if advance > data.len() {
                return Split::Record {
                    record: data.len(),
                    advance: data.len(),
                };
            }
            Split::Record { record, advance }
        }
        _ => Split::Record {
            record: first_nl,
            advance: first_nl + 1,
        },
    }
}

/// Splits the stream at end-of-input, when no more bytes can arrive to
/// confirm a boundary.
fn split_at_eof(data: &[u8]) -> Split {
    match record_boundary().find(data) {
        Some(m) => Split::Record {
            record: m.start(),
            advance: m.start() + 1,
        },
        None => Split::Record {
            record: data.strip_suffix(b"\n").unwrap_or(data).len(),
            advance: data.len(),
        },
    }
}

/// Frames the child's stderr into [`LogRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct LogCodec {
    max_record_len: Option<usize>,
}

impl LogCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flushes a pending record once it reaches `max` bytes instead of
    /// buffering it further.
    pub fn with_max_record_len(max: usize) -> Self {
        Self {
            max_record_len: Some(max.max(1)),
        }
    }

    fn take(src: &mut BytesMut, record: usize, advance: usize) -> LogRecord {
        let mut taken = src.split_to(advance);
        taken.truncate(record);
        LogRecord::new(taken.freeze())
    }
}

impl Decoder for LogCodec {
    type Item = LogRecord;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LogRecord>, io::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        match split(src) {
            Split::Record { record, advance } => Ok(Some(Self::take(src, record, advance))),
            Split::NeedMore => match self.max_record_len {
                Some(max) if src.len() >= max => {
                    warn!(
                        buffered = src.len(),
                        max_record_len = max,
                        "record exceeds maximum length; flushing it unterminated"
                    );
                    let record = src.split_to(max).freeze();
                    Ok(Some(LogRecord::new(record)))
                }
                _ => Ok(None),
            },
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<LogRecord>, io::Error> {
        if let Some(record) = self.decode(src)? {
            return Ok(Some(record));
        }
        if src.is_empty() {
            return Ok(None);
        }

        match split_at_eof(src) {
            Split::Record { record, advance } => Ok(Some(Self::take(src, record, advance))),
            Split::NeedMore => {
                // unreachable for split_at_eof; drop what is left rather than loop
                src.advance(src.len());
                Ok(None)
            }
        }
    }
}
