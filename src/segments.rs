//! Turns an ordered stream of GPS points into validated trip segments.
//!
//! Points for one logical stream must be fed in arrival order by a single
//! worker: every segment depends on the point that came right before it.

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{GeoPoint, Segment, Trip};

/// Fastest plausible speed for a delivery vehicle. Inclusive.
pub const MAX_SPEED_KMH: f64 = 100.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Why a pair of points could not become a [`Segment`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    /// `timestamp` is the start of the interval.
    #[error("zero elapsed time between points at timestamp {timestamp}")]
    DegenerateInterval { timestamp: i64 },

    #[error("point at {current} is earlier than its predecessor at {previous}")]
    OutOfOrder { previous: i64, current: i64 },

    #[error("interval from {previous} to {current} does not fit in an i64")]
    IntervalOverflow { previous: i64, current: i64 },

    #[error("invalid measurement: {distance_km} km over {elapsed_hours} h")]
    InvalidMeasurement { distance_km: f64, elapsed_hours: f64 },

    #[error("implausible speed {speed_kmh:.2} km/h (max {MAX_SPEED_KMH})")]
    ImplausibleSpeed { speed_kmh: f64 },
}

impl SegmentError {
    /// Whether the aggregator should move its base point past the rejected point.
    ///
    /// Only a speed rejection advances; interval problems keep the old base so
    /// the next point is measured against it.
    pub fn advances_base(&self) -> bool {
        matches!(self, SegmentError::ImplausibleSpeed { .. })
    }
}

impl Segment {
    /// Builds the segment travelled from `start` to `end`.
    ///
    /// # Errors
    ///
    /// Fails when the timestamps are equal or go backwards, or when the implied
    /// speed exceeds [`MAX_SPEED_KMH`].
    pub fn between(start: &GeoPoint, end: &GeoPoint) -> Result<Self, SegmentError> {
        let Some(elapsed_seconds) = end.timestamp.checked_sub(start.timestamp) else {
            return Err(SegmentError::IntervalOverflow {
                previous: start.timestamp,
                current: end.timestamp,
            });
        };
        if elapsed_seconds == 0 {
            return Err(SegmentError::DegenerateInterval {
                timestamp: start.timestamp,
            });
        }
        if elapsed_seconds < 0 {
            return Err(SegmentError::OutOfOrder {
                previous: start.timestamp,
                current: end.timestamp,
            });
        }

        let elapsed_hours = elapsed_seconds as f64 / SECONDS_PER_HOUR;
        Self::from_measurements(start.timestamp, start.distance_km(end), elapsed_hours)
    }

    /// Builds a segment from already measured distance and duration.
    ///
    /// Distance must be finite and non-negative, duration finite and positive.
    pub fn from_measurements(
        start_timestamp: i64,
        distance_km: f64,
        elapsed_hours: f64,
    ) -> Result<Self, SegmentError> {
        if elapsed_hours == 0.0 {
            return Err(SegmentError::DegenerateInterval {
                timestamp: start_timestamp,
            });
        }
        let valid_distance = distance_km.is_finite() && distance_km >= 0.0;
        let valid_duration = elapsed_hours.is_finite() && elapsed_hours > 0.0;
        if !(valid_distance && valid_duration) {
            return Err(SegmentError::InvalidMeasurement {
                distance_km,
                elapsed_hours,
            });
        }

        let speed_kmh = distance_km / elapsed_hours;
        if speed_kmh > MAX_SPEED_KMH {
            return Err(SegmentError::ImplausibleSpeed { speed_kmh });
        }

        Ok(Segment {
            start_timestamp,
            speed_kmh,
            distance_km,
            elapsed_hours,
        })
    }
}

/// Running counters, logged when a stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub points: usize,
    pub segments: usize,
    pub trips: usize,
    pub rejected_degenerate: usize,
    pub rejected_out_of_order: usize,
    pub rejected_speed: usize,
    /// Overflowing intervals and non-finite or negative measurements.
    pub rejected_invalid: usize,
}

/// Groups consecutive points by trip id and emits each trip once it is closed.
#[derive(Debug, Default)]
pub struct SegmentAggregator {
    current: Option<Trip>,
    previous: Option<GeoPoint>,
    stats: AggregatorStats,
}

impl SegmentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one point. Returns the previous trip when `point` starts a new one.
    pub fn ingest(&mut self, point: GeoPoint) -> Option<Trip> {
        self.stats.points += 1;

        let mut finished = None;
        if self.current.as_ref().map(|t| t.id) != Some(point.trip_id) {
            finished = self.flush();
            self.current = Some(Trip::new(point.trip_id));
        }

        let Some(previous) = self.previous else {
            self.previous = Some(point);
            return finished;
        };

        match Segment::between(&previous, &point) {
            Ok(segment) => {
                if let Some(trip) = self.current.as_mut() {
                    trip.push_segment(segment);
                }
                self.stats.segments += 1;
                self.previous = Some(point);
            }
            Err(e) => {
                warn!(trip_id = point.trip_id, error = %e, "Rejected segment");
                match &e {
                    SegmentError::DegenerateInterval { .. } => self.stats.rejected_degenerate += 1,
                    SegmentError::OutOfOrder { .. } => self.stats.rejected_out_of_order += 1,
                    SegmentError::ImplausibleSpeed { .. } => self.stats.rejected_speed += 1,
                    SegmentError::IntervalOverflow { .. }
                    | SegmentError::InvalidMeasurement { .. } => self.stats.rejected_invalid += 1,
                }
                if e.advances_base() {
                    self.previous = Some(point);
                }
            }
        }

        finished
    }

    /// Closes and returns the in-progress trip, if any. The aggregator is empty afterwards.
    pub fn flush(&mut self) -> Option<Trip> {
        self.previous = None;
        let trip = self.current.take()?;
        self.stats.trips += 1;
        debug!(
            trip_id = trip.id,
            segments = trip.segments.len(),
            "Trip finalized"
        );
        Some(trip)
    }

    /// Ends the stream, returning the last trip and the final counters.
    pub fn finish(mut self) -> (Option<Trip>, AggregatorStats) {
        let trip = self.flush();
        (trip, self.stats)
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Id of the trip currently being built.
    pub fn current_trip_id(&self) -> Option<i64> {
        self.current.as_ref().map(|t| t.id)
    }
}
