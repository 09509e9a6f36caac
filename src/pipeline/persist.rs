//! Stage 3: fares in, batched rows out.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::batch::{BatchBuffer, BufferStats, FareSink, spawn_flush_timer};
use crate::models::FareRecord;
use crate::transport::{Consumer, decode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub received: usize,
    pub rejected: usize,
    pub buffer: BufferStats,
}

/// Buffers every fare from `consumer` and flushes on size, on each
/// `flush_interval`, and once more after the queue closes.
#[tracing::instrument(name = "persist", skip(consumer, buffer))]
pub async fn run<C, S>(
    mut consumer: C,
    buffer: Arc<BatchBuffer<S>>,
    flush_interval: Duration,
) -> PersistReport
where
    C: Consumer,
    S: FareSink + 'static,
{
    let timer = spawn_flush_timer(buffer.clone(), flush_interval);
    let mut report = PersistReport::default();

    while let Some(body) = consumer.consume().await {
        report.received += 1;
        let fare: FareRecord = match decode(&body) {
            Ok(fare) => fare,
            Err(e) => {
                report.rejected += 1;
                warn!(error = %e, "Dropping undecodable fare");
                continue;
            }
        };

        if let Err(e) = buffer.add(fare).await {
            error!(error = %e, "Size-triggered flush failed");
        }
    }

    timer.stop().await;
    if let Err(e) = buffer.drain().await {
        error!(error = %e, "Final flush failed");
    }

    report.buffer = buffer.stats().await;
    info!(
        received = report.received,
        rejected = report.rejected,
        written = report.buffer.records_written,
        dropped = report.buffer.records_dropped,
        flushes = report.buffer.flushes,
        "Persist finished"
    );
    report
}
