use super::Sink;
use crate::error::SinkError;
use crate::record::LogRecord;
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stderr};

/// Writes each record, newline-terminated, to the supervisor's own stderr.
#[derive(Debug, Default)]
pub struct StderrSink {
    out: Option<Stderr>,
}

impl StderrSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sink for StderrSink {
    fn name(&self) -> &'static str {
        "stderr"
    }

    async fn setup(&mut self) -> Result<(), SinkError> {
        self.out = Some(tokio::io::stderr());
        Ok(())
    }

    async fn emit(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        let out = self.out.as_mut().ok_or(SinkError::NotReady { sink: "stderr" })?;
        out.write_all(record.as_bytes()).await?;
        out.write_all(b"\n").await?;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), SinkError> {
        if let Some(mut out) = self.out.take() {
            out.flush().await?;
        }
        Ok(())
    }
}
