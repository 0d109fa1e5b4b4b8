//! Newline-delimited JSON over byte streams, used by the binary on stdin and stdout.

use super::{BusError, EventPublisher, MessageSource, PublishError};
use crate::events::{Envelope, ExtractCompleted};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

pub struct LineSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        LineSource {
            lines: reader.lines(),
        }
    }
}

impl LineSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        LineSource::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageSource for LineSource<R> {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, BusError> {
        while let Some(line) = self.lines.next_line().await? {
            if !line.trim().is_empty() {
                return Ok(Some(line.into_bytes()));
            }
        }
        Ok(None)
    }
}

/// Writes each envelope as one JSON line. The routing key is the envelope's saga id.
pub struct LinePublisher<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> LinePublisher<W> {
    pub fn new(writer: W) -> Self {
        LinePublisher {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl LinePublisher<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        LinePublisher::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventPublisher for LinePublisher<W> {
    async fn publish(
        &self,
        _key: &str,
        envelope: &Envelope<ExtractCompleted>,
    ) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(envelope)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
