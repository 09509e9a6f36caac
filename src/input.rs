//! CSV point source.
//!
//! Each row is `trip_id,latitude,longitude,timestamp` with no header. Rows
//! that do not parse, or that carry coordinates outside the valid range, are
//! logged and skipped; they never reach the aggregator.

use anyhow::{Context, Result};
use csv::{DeserializeRecordsIntoIter, ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::geo::is_valid_coordinate;
use crate::models::GeoPoint;

type RawRow = (i64, f64, f64, i64);

/// Counters for one pass over an input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub rows: usize,
    pub points: usize,
    pub skipped: usize,
}

/// Iterates over the valid points of a CSV source, in file order.
pub struct PointReader<R> {
    rows: DeserializeRecordsIntoIter<R, RawRow>,
    stats: ReadStats,
}

impl PointReader<File> {
    /// Opens the CSV file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open point file '{}'", path.display()))?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> PointReader<R> {
    pub fn from_reader(reader: R) -> Self {
        let rows = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader)
            .into_deserialize();
        Self {
            rows,
            stats: ReadStats::default(),
        }
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }
}

impl<R: Read> Iterator for PointReader<R> {
    type Item = GeoPoint;

    fn next(&mut self) -> Option<GeoPoint> {
        loop {
            let row = self.rows.next()?;
            self.stats.rows += 1;
            let line = self.stats.rows;

            match row {
                Ok((trip_id, latitude, longitude, timestamp)) => {
                    if !is_valid_coordinate(latitude, longitude) {
                        self.stats.skipped += 1;
                        warn!(line, latitude, longitude, "Skipping row with invalid coordinates");
                        continue;
                    }
                    self.stats.points += 1;
                    return Some(GeoPoint::new(trip_id, latitude, longitude, timestamp));
                }
                Err(e) => {
                    self.stats.skipped += 1;
                    warn!(line, error = %e, "Skipping malformed row");
                }
            }
        }
    }
}

/// Feeds every point of `reader` into `tx` on a blocking thread.
///
/// Stops early when `shutdown` turns `true` or the receiver is gone. Dropping
/// `tx` at the end is what signals end-of-stream downstream.
pub fn spawn_point_stream<R>(
    mut reader: PointReader<R>,
    tx: mpsc::Sender<GeoPoint>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<ReadStats>
where
    R: Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        for point in reader.by_ref() {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping point stream");
                break;
            }
            if tx.blocking_send(point).is_err() {
                warn!("Point receiver dropped, stopping point stream");
                break;
            }
        }

        let stats = reader.stats();
        info!(
            rows = stats.rows,
            points = stats.points,
            skipped = stats.skipped,
            "Point stream finished"
        );
        stats
    })
}
