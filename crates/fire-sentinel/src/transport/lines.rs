use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{RawPayload, TelemetrySource, TransportError};

/// Newline-delimited JSON, one message per line. Blank lines are skipped.
pub struct LineSource<R> {
    reader: R,
    origin: String,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, origin: impl Into<String>) -> Self {
        Self {
            reader,
            origin: origin.into(),
        }
    }
}

impl LineSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

#[async_trait]
impl<R> TelemetrySource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawPayload>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let Self { reader, origin } = *self;
        let mut lines = reader.lines();
        let mut forwarded = 0u64;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                info!(origin = %origin, forwarded, "End of input");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if tx
                .send(RawPayload::new(line.as_bytes().to_vec(), origin.as_str()))
                .await
                .is_err()
            {
                debug!("Detector inbox closed; stopping line source");
                break;
            }
            forwarded += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forwards_non_blank_lines() {
        let input: &[u8] = b"{\"temp\":20,\"hum\":50,\"luz\":100}\n\n  \n{\"command\":\"reset\"}\n";
        let source = Box::new(LineSource::new(input, "test"));
        let (tx, mut rx) = mpsc::channel(8);

        source.run(tx, CancellationToken::new()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(&first.payload[..], b"{\"temp\":20,\"hum\":50,\"luz\":100}");
        assert_eq!(first.origin, "test");
        let second = rx.recv().await.unwrap();
        assert_eq!(&second.payload[..], b"{\"command\":\"reset\"}");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_when_inbox_closed() {
        let input: &[u8] = b"a\nb\nc\n";
        let source = Box::new(LineSource::new(input, "test"));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(source.run(tx, CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let input: &[u8] = b"a\n";
        let source = Box::new(LineSource::new(input, "test"));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        source.run(tx, cancel).await.unwrap();
        // The select may still win the read; at most one line gets through.
        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert!(received <= 1);
    }
}
