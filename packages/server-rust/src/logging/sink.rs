//! Background writer for cloud log entries.
//!
//! Rendered entries are pushed onto an unbounded channel and written by a
//! dedicated thread, so logging calls never block on the output stream.
//! The sink is closed at most once; closing flushes the writer and reports
//! any write error seen since startup.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors reported when closing the sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("log sink writer is no longer running")]
    Closed,
    #[error("log sink write failed: {0}")]
    Io(#[from] io::Error),
}

/// Messages processed by the writer thread.
#[derive(Debug)]
pub enum SinkMessage {
    /// One rendered log entry, without trailing newline.
    Entry(String),
    /// Flush, report the first error seen, and stop.
    Close(oneshot::Sender<io::Result<()>>),
}

/// Owning handle to the writer thread.
#[derive(Debug)]
pub struct CloudLogSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
    closed: AtomicBool,
}

impl CloudLogSink {
    /// Starts the writer thread over `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(writer: Box<dyn Write + Send>) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("gantry-log-sink".to_string())
            .spawn(move || run_writer(rx, writer))?;
        Ok(Self {
            tx,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns a sender that producers use to enqueue entries.
    ///
    /// Entries sent after the sink is closed are dropped.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<SinkMessage> {
        self.tx.clone()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flushes pending entries and stops the writer thread.
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if any write or the final flush failed, and
    /// [`SinkError::Closed`] if the writer thread already exited.
    pub async fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SinkMessage::Close(reply_tx))
            .map_err(|_| SinkError::Closed)?;
        reply_rx.await.map_err(|_| SinkError::Closed)??;
        Ok(())
    }
}

impl Drop for CloudLogSink {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let (reply_tx, _reply_rx) = oneshot::channel();
            let _ = self.tx.send(SinkMessage::Close(reply_tx));
        }
    }
}

fn run_writer(mut rx: mpsc::UnboundedReceiver<SinkMessage>, mut writer: Box<dyn Write + Send>) {
    let mut first_error: Option<io::Error> = None;

    while let Some(message) = rx.blocking_recv() {
        match message {
            SinkMessage::Entry(line) => {
                let written = writer
                    .write_all(line.as_bytes())
                    .and_then(|()| writer.write_all(b"\n"))
                    .and_then(|()| writer.flush());
                if let Err(err) = written {
                    first_error.get_or_insert(err);
                }
            }
            SinkMessage::Close(reply) => {
                let result = match (first_error.take(), writer.flush()) {
                    (Some(err), _) | (None, Err(err)) => Err(err),
                    (None, Ok(())) => Ok(()),
                };
                let _ = reply.send(result);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryWriter;

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn entries_are_written_before_close_returns() {
        let out = MemoryWriter::new();
        let sink = CloudLogSink::spawn(Box::new(out.clone())).unwrap();
        let tx = sink.sender();
        tx.send(SinkMessage::Entry("{\"message\":\"one\"}".to_string())).unwrap();
        tx.send(SinkMessage::Entry("{\"message\":\"two\"}".to_string())).unwrap();

        sink.close().await.unwrap();

        assert_eq!(out.lines(), vec!["{\"message\":\"one\"}", "{\"message\":\"two\"}"]);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn second_close_is_a_noop() {
        let sink = CloudLogSink::spawn(Box::new(MemoryWriter::new())).unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn entries_after_close_are_dropped() {
        let out = MemoryWriter::new();
        let sink = CloudLogSink::spawn(Box::new(out.clone())).unwrap();
        let tx = sink.sender();
        sink.close().await.unwrap();

        // The writer thread has exited; the send may fail or be ignored.
        let _ = tx.send(SinkMessage::Entry("late".to_string()));
        assert!(out.contents().is_empty());
    }

    #[tokio::test]
    async fn write_failure_surfaces_on_close() {
        let sink = CloudLogSink::spawn(Box::new(BrokenWriter)).unwrap();
        sink.sender()
            .send(SinkMessage::Entry("lost".to_string()))
            .unwrap();

        let err = sink.close().await.unwrap_err();
        assert!(matches!(err, SinkError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
