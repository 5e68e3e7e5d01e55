//! Bidirectional byte relay between two established streams.
//!
//! Each direction runs as its own task. When a direction's source reaches
//! EOF, the destination's write side is shut down so the far peer sees EOF
//! while the opposite direction keeps flowing. [`relay`] joins both tasks
//! before returning.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;

use crate::error::{Error, Result};

/// Copy buffer size per direction.
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Direction of a copy task within `relay(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `a` → `b`
    Forward,
    /// `b` → `a`
    Backward,
}

/// Outcome of one copy direction.
#[derive(Debug, Default)]
pub struct DirectionReport {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Error that ended the direction, if it did not end on EOF
    pub error: Option<io::Error>,
    /// Task was aborted after the other direction failed
    pub aborted: bool,
}

impl DirectionReport {
    /// Whether the direction ended on a clean EOF.
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && !self.aborted
    }
}

/// Result of a finished relay.
#[derive(Debug, Default)]
pub struct RelayReport {
    /// `a` → `b`
    pub forward: DirectionReport,
    /// `b` → `a`
    pub backward: DirectionReport,
}

impl RelayReport {
    /// Total bytes moved in both directions.
    pub fn total_bytes(&self) -> u64 {
        self.forward.bytes + self.backward.bytes
    }

    /// First direction error, as a [`Error::RelayIo`].
    pub fn error(&self) -> Option<Error> {
        self.forward
            .error
            .as_ref()
            .or(self.backward.error.as_ref())
            .map(|e| Error::RelayIo(io::Error::new(e.kind(), e.to_string())))
    }

    fn slot(&mut self, direction: Direction) -> &mut DirectionReport {
        match direction {
            Direction::Forward => &mut self.forward,
            Direction::Backward => &mut self.backward,
        }
    }
}

struct PipeOutcome {
    direction: Direction,
    bytes: u64,
    error: Option<io::Error>,
}

/// Shut down the write side of `writer`, ignoring errors.
///
/// Safe to call more than once on the same stream.
pub async fn close_write<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Err(e) = writer.shutdown().await {
        tracing::trace!("shutdown on closed stream: {}", e);
    }
}

async fn pipe<R, W>(direction: Direction, mut reader: R, mut writer: W) -> PipeOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut bytes = 0u64;

    let error = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => {
                if let Err(e) = writer.write_all(&buf[..n]).await {
                    break Some(e);
                }
                bytes += n as u64;
            }
            Err(e) => break Some(e),
        }
    };

    close_write(&mut writer).await;
    tracing::trace!("{:?} finished after {} bytes", direction, bytes);

    PipeOutcome {
        direction,
        bytes,
        error,
    }
}

/// Relay bytes between `a` and `b` until both directions have finished.
///
/// An I/O error in one direction aborts the other, which drops both
/// streams. A panicking copy task is reported as [`Error::RelayAborted`]
/// after the other task has been stopped.
pub async fn relay<A, B>(a: A, b: B) -> Result<RelayReport>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let mut tasks = JoinSet::new();
    tasks.spawn(pipe(Direction::Forward, a_read, b_write));
    tasks.spawn(pipe(Direction::Backward, b_read, a_write));

    let mut report = RelayReport {
        forward: DirectionReport {
            aborted: true,
            ..Default::default()
        },
        backward: DirectionReport {
            aborted: true,
            ..Default::default()
        },
    };
    let mut fault = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                if outcome.error.is_some() {
                    tasks.abort_all();
                }
                let slot = report.slot(outcome.direction);
                slot.bytes = outcome.bytes;
                slot.error = outcome.error;
                slot.aborted = false;
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                tasks.abort_all();
                fault = Some(e.to_string());
            }
        }
    }

    match fault {
        Some(msg) => Err(Error::RelayAborted(msg)),
        None => Ok(report),
    }
}
