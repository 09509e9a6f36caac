//! Accumulates fare records and writes them to a sink in batches.
//!
//! A flush happens when the pending batch reaches `batch_size`, on every
//! timer tick, and once more on shutdown. The pending records and the sink
//! share one lock, so a size-triggered flush and a timer-triggered flush can
//! never interleave.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

use crate::config::BatchConfig;
use crate::models::FareRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a whole flush. The batch is gone from the buffer when this is returned.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("dropped batch of {dropped} fares after {attempts} failed write attempt(s): {source}")]
    SinkWrite {
        dropped: usize,
        attempts: u32,
        #[source]
        source: SinkError,
    },
}

/// Final destination of fare batches.
#[async_trait]
pub trait FareSink: Send {
    /// Persists `fares` in order. Must append, never replace earlier batches.
    async fn write_batch(&mut self, fares: &[FareRecord]) -> Result<(), SinkError>;
}

/// How often a failed batch write is retried before the batch is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub flushes: usize,
    pub records_written: usize,
    pub records_dropped: usize,
}

struct Pending<S> {
    records: Vec<FareRecord>,
    sink: S,
    stats: BufferStats,
}

pub struct BatchBuffer<S> {
    inner: Mutex<Pending<S>>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<S: FareSink> BatchBuffer<S> {
    pub fn new(sink: S, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(Pending {
                records: Vec::with_capacity(batch_size),
                sink,
                stats: BufferStats::default(),
            }),
            batch_size: batch_size.max(1),
            retry,
        }
    }

    pub fn from_config(sink: S, config: &BatchConfig) -> Self {
        Self::new(
            sink,
            config.batch_size,
            RetryPolicy {
                max_attempts: config.max_attempts,
                backoff: config.retry_backoff(),
            },
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Appends `record`, flushing first if that fills the batch.
    ///
    /// Returns how many records were written by the triggered flush (0 if none).
    pub async fn add(&self, record: FareRecord) -> Result<usize, FlushError> {
        let mut pending = self.inner.lock().await;
        pending.records.push(record);
        if pending.records.len() >= self.batch_size {
            debug!(size = pending.records.len(), "Batch full, flushing");
            return self.flush_locked(&mut pending).await;
        }
        Ok(0)
    }

    /// Timer-driven flush. Does nothing when the buffer is empty.
    pub async fn on_timer(&self) -> Result<usize, FlushError> {
        self.flush().await
    }

    /// Writes all pending records to the sink and clears the buffer.
    pub async fn flush(&self) -> Result<usize, FlushError> {
        let mut pending = self.inner.lock().await;
        self.flush_locked(&mut pending).await
    }

    /// Final flush on shutdown.
    pub async fn drain(&self) -> Result<usize, FlushError> {
        let written = self.flush().await?;
        info!(written, "Fare buffer drained");
        Ok(written)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> BufferStats {
        self.inner.lock().await.stats
    }

    /// Consumes the buffer and hands back the sink. Pending records are discarded.
    pub fn into_sink(self) -> S {
        self.inner.into_inner().sink
    }

    async fn flush_locked(&self, pending: &mut Pending<S>) -> Result<usize, FlushError> {
        if pending.records.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::take(&mut pending.records);
        let size = batch.len();
        let mut attempt = 1;

        loop {
            match pending.sink.write_batch(&batch).await {
                Ok(()) => {
                    pending.stats.flushes += 1;
                    pending.stats.records_written += size;
                    info!(batch_size = size, attempt, "Flushed fare batch");
                    return Ok(size);
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(batch_size = size, attempt, error = %e, "Batch write failed, retrying");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    pending.stats.records_dropped += size;
                    error!(batch_size = size, attempts = attempt, error = %e, "Dropping fare batch");
                    return Err(FlushError::SinkWrite {
                        dropped: size,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

/// Handle to a running flush timer.
pub struct FlushTimer {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushTimer {
    /// Stops the timer and waits for it to exit. A flush already in progress
    /// runs to completion first.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            error!(error = %e, "Flush timer task failed");
        }
    }
}

/// Calls [`BatchBuffer::on_timer`] every `period` until [`FlushTimer::stop`].
///
/// The first tick fires one full period after spawning.
pub fn spawn_flush_timer<S>(buffer: Arc<BatchBuffer<S>>, period: Duration) -> FlushTimer
where
    S: FareSink + 'static,
{
    let (stop, mut stopped) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => match buffer.on_timer().await {
                    Ok(0) => {}
                    Ok(written) => debug!(written, "Timer flush"),
                    Err(e) => error!(error = %e, "Timer flush failed"),
                },
            }
        }
    });
    FlushTimer { stop, handle }
}
