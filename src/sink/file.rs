use super::Sink;
use crate::error::SinkError;
use crate::record::LogRecord;
use async_trait::async_trait;
use chrono::SecondsFormat;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// Appends `<rfc3339 timestamp> <record>` lines to a file.
///
/// Writes are buffered; `cleanup` flushes and syncs.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn setup(&mut self) -> Result<(), SinkError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        debug!(path = %self.path.display(), "file sink opened");
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    async fn emit(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NotReady { sink: "file" })?;
        let stamp = record
            .received_at()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        writer.write_all(stamp.as_bytes()).await?;
        writer.write_all(b" ").await?;
        writer.write_all(record.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), SinkError> {
        // nothing to flush when setup never opened the file
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_appended_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("child.log");
        let mut sink = FileSink::new(&path);

        sink.setup().await.unwrap();
        sink.emit(&LogRecord::new(&b"hello"[..])).await.unwrap();
        sink.emit(&LogRecord::new(&b"ERROR\n  at x"[..])).await.unwrap();
        sink.cleanup().await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" hello"));
        assert!(lines[1].ends_with(" ERROR"));
        assert_eq!(lines[2], "  at x");
    }

    #[tokio::test]
    async fn emit_before_setup_is_an_error() {
        let mut sink = FileSink::new("/nonexistent/never-opened.log");
        let err = sink.emit(&LogRecord::new(&b"x"[..])).await.unwrap_err();
        assert!(matches!(err, SinkError::NotReady { sink: "file" }));
    }

    #[tokio::test]
    async fn cleanup_after_failed_setup_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for appending
        let mut sink = FileSink::new(dir.path());
        assert!(sink.setup().await.is_err());
        sink.cleanup().await.unwrap();
    }
}
