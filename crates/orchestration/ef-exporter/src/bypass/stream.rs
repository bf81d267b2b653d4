//! Raw stream forwarding from a reader to a writer.

use ef_error::{ExportError, Result};
use ef_traits::{ByteStream, Persistence, ReadStream, Reader, Writer};
use ef_types::{Metadata, StreamTransferState};
use ef_writers::WRITER_MODULE;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::info;

/// Counts the bytes read through it.
pub struct CountingReader {
    inner: ByteStream,
    count: Arc<AtomicU64>,
}

impl CountingReader {
    pub fn new(inner: ByteStream) -> (Self, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                count: count.clone(),
            },
            count,
        )
    }
}

impl AsyncRead for CountingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = this.inner.as_mut().poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.count
                .fetch_add((buf.filled().len() - before) as u64, Ordering::Relaxed);
        }
        poll
    }
}

/// Forwards every stream the reader exposes that the job has not copied yet.
pub async fn run_stream_transfer(
    reader: &mut dyn Reader,
    writer: &mut dyn Writer,
    persistence: &mut dyn Persistence,
    metadata: &Metadata,
) -> Result<()> {
    let mut state: StreamTransferState = match persistence.get_last_position()? {
        Some(position) => serde_json::from_value(position).map_err(|e| {
            ExportError::persistence(format!("invalid stream transfer state: {e}"))
        })?,
        None => StreamTransferState::default(),
    };

    let streams = reader.get_read_streams().await?;
    info!(streams = streams.len(), done = state.done.len(), "Forwarding streams");

    for info in streams {
        if state.is_done(&info.filename) {
            continue;
        }
        let stream = reader.open_read_stream(&info).await?;
        let (counting, count) = CountingReader::new(stream.reader);
        writer
            .write_stream(ReadStream {
                info: stream.info,
                reader: Box::pin(counting),
            })
            .await?;

        let bytes = count.load(Ordering::Relaxed);
        state.mark_done(&info.filename, bytes);
        persistence.commit_position(serde_json::to_value(&state)?)?;
        info!(file = %info.filename, bytes, writer = writer.name(), "Forwarded stream");
    }
    writer.finish().await?;

    metadata.set_metadata(WRITER_MODULE, "written_files", state.done.len() as u64);
    metadata.set_metadata(WRITER_MODULE, "bytes_copied", state.stats.bytes_copied);
    metadata.set_accurate_items_count(false);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_counting_reader() {
        let inner: ByteStream = Box::pin(std::io::Cursor::new(vec![7u8; 10_000]));
        let (mut counting, count) = CountingReader::new(inner);
        let mut out = Vec::new();
        counting.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 10_000);
        assert_eq!(count.load(Ordering::Relaxed), 10_000);
    }
}
