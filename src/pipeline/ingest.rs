//! Stage 1: points in, finalized trips out.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{GeoPoint, Trip};
use crate::segments::{AggregatorStats, SegmentAggregator};
use crate::transport::{Publisher, TransportError, encode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub aggregator: AggregatorStats,
    pub published: usize,
    pub failed: usize,
}

/// Aggregates `points` in arrival order and publishes every trip it closes.
///
/// Runs until the point channel closes, then publishes the trip still in
/// progress. Returning drops `publisher`, which closes the trip queue.
#[tracing::instrument(name = "ingest", skip_all)]
pub async fn run<P: Publisher>(mut points: mpsc::Receiver<GeoPoint>, publisher: P) -> IngestReport {
    let mut aggregator = SegmentAggregator::new();
    let mut report = IngestReport::default();

    while let Some(point) = points.recv().await {
        if let Some(trip) = aggregator.ingest(point) {
            publish(&publisher, &trip, &mut report).await;
        }
    }

    let (last, stats) = aggregator.finish();
    if let Some(trip) = last {
        publish(&publisher, &trip, &mut report).await;
    }
    report.aggregator = stats;

    info!(
        points = stats.points,
        trips = stats.trips,
        segments = stats.segments,
        rejected_degenerate = stats.rejected_degenerate,
        rejected_out_of_order = stats.rejected_out_of_order,
        rejected_speed = stats.rejected_speed,
        rejected_invalid = stats.rejected_invalid,
        published = report.published,
        failed = report.failed,
        "Ingest finished"
    );
    report
}

async fn publish<P: Publisher>(publisher: &P, trip: &Trip, report: &mut IngestReport) {
    match publish_trip(publisher, trip).await {
        Ok(()) => {
            report.published += 1;
            debug!(trip_id = trip.id, segments = trip.segments.len(), "Trip published");
        }
        Err(e) => {
            report.failed += 1;
            warn!(trip_id = trip.id, error = %e, "Failed to publish trip");
        }
    }
}

async fn publish_trip<P: Publisher>(publisher: &P, trip: &Trip) -> Result<(), TransportError> {
    let body = encode(trip)?;
    publisher.publish(body).await
}
