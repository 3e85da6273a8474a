use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::fmt;

/// One logical log line read from the child's stderr.
///
/// Continuation lines are already folded in and the trailing newline is
/// stripped. The content is immutable once the tokenizer hands it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    content: Bytes,
    received_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            received_at: Utc::now(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.content
    }

    /// Record content as text; invalid UTF-8 is replaced, not rejected.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Number of physical lines folded into this record.
    pub fn line_count(&self) -> usize {
        self.content.iter().filter(|&&b| b == b'\n').count() + 1
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
