//! In-process wiring of the three stages.
//!
//! ```text
//! points --> ingest --[trips]--> pricing (N workers) --[fares]--> persist --> sink
//! ```
//!
//! Stages talk over bounded [`memory`](crate::transport::memory) queues.
//! Shutdown cascades through queue closure: when the point stream stops,
//! ingest publishes its last trip and drops its publisher, pricing finishes
//! in-flight work, and persist drains the buffer.

pub mod ingest;
pub mod persist;
pub mod pricing;

use anyhow::{Context, Result};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::batch::{BatchBuffer, FareSink};
use crate::config::AppConfig;
use crate::fare::FareCalculator;
use crate::input::{PointReader, ReadStats, spawn_point_stream};
use crate::models::{FareRecord, Trip};
use crate::segments::SegmentAggregator;
use crate::transport::memory;

use self::ingest::IngestReport;
use self::persist::PersistReport;
use self::pricing::PricingReport;

/// What each stage did during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub read: ReadStats,
    pub ingest: IngestReport,
    pub pricing: PricingReport,
    pub persist: PersistReport,
}

impl PipelineReport {
    pub fn trips(&self) -> usize {
        self.ingest.aggregator.trips
    }

    pub fn fares_written(&self) -> usize {
        self.persist.buffer.records_written
    }

    pub fn fares_dropped(&self) -> usize {
        self.persist.buffer.records_dropped
    }
}

/// Runs the full pipeline over `reader`, persisting fares into `sink`.
///
/// Returns once every stage has finished, either because the input ran out
/// or because `shutdown` turned `true`.
pub async fn run<R, S>(
    config: &AppConfig,
    reader: PointReader<R>,
    sink: S,
    shutdown: watch::Receiver<bool>,
) -> Result<PipelineReport>
where
    R: Read + Send + 'static,
    S: FareSink + 'static,
{
    let capacity = config.pipeline.queue_capacity;
    let (points_tx, points_rx) = mpsc::channel(capacity);
    let (trip_publisher, trip_consumer) = memory::queue(capacity);
    let (fare_publisher, fare_consumer) = memory::queue(capacity);

    let calculator = Arc::new(FareCalculator::new(config.tariff.clone()));
    let buffer = Arc::new(BatchBuffer::from_config(sink, &config.batch));

    info!(
        workers = config.pipeline.workers,
        queue_capacity = capacity,
        batch_size = config.batch.batch_size,
        flush_interval_secs = config.batch.flush_interval_secs,
        "Starting pipeline"
    );

    let reader_task = spawn_point_stream(reader, points_tx, shutdown);
    let ingest_task = tokio::spawn(ingest::run(points_rx, trip_publisher));
    let pricing_task = tokio::spawn(pricing::run(
        trip_consumer,
        fare_publisher,
        calculator,
        config.pipeline.workers,
    ));
    let persist_task = tokio::spawn(persist::run(
        fare_consumer,
        buffer,
        config.batch.flush_interval(),
    ));

    let read = reader_task.await.context("point reader task failed")?;
    let ingest = ingest_task.await.context("ingest task failed")?;
    let pricing = pricing_task.await.context("pricing task failed")?;
    let persist = persist_task.await.context("persist task failed")?;

    let report = PipelineReport {
        read,
        ingest,
        pricing,
        persist,
    };
    info!(
        points = report.read.points,
        skipped_rows = report.read.skipped,
        trips = report.trips(),
        fares = report.pricing.priced,
        written = report.fares_written(),
        dropped = report.fares_dropped(),
        "Pipeline finished"
    );
    Ok(report)
}

/// Aggregates and prices every point of `reader` on the current thread,
/// without queues or persistence.
pub fn price_points<R: Read>(
    reader: PointReader<R>,
    calculator: &FareCalculator,
) -> Vec<(Trip, FareRecord)> {
    let mut aggregator = SegmentAggregator::new();
    let mut trips: Vec<Trip> = reader.filter_map(|p| aggregator.ingest(p)).collect();
    let (last, _) = aggregator.finish();
    trips.extend(last);

    trips
        .into_iter()
        .map(|trip| {
            let fare = calculator.calculate(&trip);
            (trip, fare)
        })
        .collect()
}
