//! Tariff rules applied to a finalized trip.

use chrono::{DateTime, Timelike};

use crate::config::TariffConfig;
use crate::models::{FareRecord, Segment, Trip};

/// Segments faster than this are charged per km; the rest per idle hour.
pub const MOVING_SPEED_THRESHOLD_KMH: f64 = 10.0;

/// Prices trips under a fixed tariff. Holds no mutable state, so one
/// calculator can be shared across workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FareCalculator {
    tariff: TariffConfig,
}

impl FareCalculator {
    pub fn new(tariff: TariffConfig) -> Self {
        Self { tariff }
    }

    pub fn tariff(&self) -> &TariffConfig {
        &self.tariff
    }

    /// Computes the fare for `trip`: flag amount plus every segment's charge,
    /// raised to the minimum fare when below it.
    pub fn calculate(&self, trip: &Trip) -> FareRecord {
        let total = trip
            .segments
            .iter()
            .fold(self.tariff.flag_amount, |acc, s| acc + self.segment_charge(s));

        FareRecord::new(trip.id, total.max(self.tariff.min_fare))
    }

    /// Charge for a single segment under the moving or idle rule.
    pub fn segment_charge(&self, segment: &Segment) -> f64 {
        if segment.speed_kmh > MOVING_SPEED_THRESHOLD_KMH {
            let rate = if self.is_daytime(segment.start_timestamp) {
                self.tariff.moving_day_fare_per_km
            } else {
                self.tariff.moving_night_fare_per_km
            };
            segment.distance_km * rate
        } else {
            segment.elapsed_hours * self.tariff.idle_fare_per_hour
        }
    }

    /// Whether the UTC hour of `timestamp` falls in `[day_start_hour, day_end_hour)`.
    pub fn is_daytime(&self, timestamp: i64) -> bool {
        let hour = match DateTime::from_timestamp(timestamp, 0) {
            Some(t) => t.hour(),
            None => return false,
        };
        hour >= self.tariff.day_start_hour && hour < self.tariff.day_end_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn tariff(min_fare: f64) -> TariffConfig {
        TariffConfig {
            flag_amount: 5.0,
            min_fare,
            idle_fare_per_hour: 2.0,
            moving_day_fare_per_km: 10.0,
            moving_night_fare_per_km: 15.0,
            day_start_hour: 6,
            day_end_hour: 20,
        }
    }

    fn at(hour: u32, minute: u32) -> i64 {
        let naive = NaiveDate::from_ymd_opt(2023, 9, 30)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap();
        Utc.from_utc_datetime(&naive).timestamp()
    }

    fn segment(start: i64, speed: f64, distance: f64, elapsed: f64) -> Segment {
        Segment {
            start_timestamp: start,
            speed_kmh: speed,
            distance_km: distance,
            elapsed_hours: elapsed,
        }
    }

    fn trip(segments: Vec<Segment>) -> Trip {
        Trip { id: 1, segments }
    }

    #[test]
    fn test_moving_day_time() {
        let calculator = FareCalculator::new(tariff(20.0));
        let fare = calculator.calculate(&trip(vec![segment(at(10, 0), 50.0, 5.0, 0.1)]));

        assert_eq!(fare.id, 1);
        assert_eq!(fare.fare, 55.0);
    }

    #[test]
    fn test_moving_night_time() {
        let calculator = FareCalculator::new(tariff(20.0));
        let fare = calculator.calculate(&trip(vec![segment(at(22, 0), 50.0, 5.0, 0.1)]));

        assert_eq!(fare.fare, 80.0);
    }

    #[test]
    fn test_idle_segment_clamped_to_min_fare() {
        let calculator = FareCalculator::new(tariff(20.0));
        let fare = calculator.calculate(&trip(vec![segment(at(10, 0), 0.0, 0.0, 1.0)]));

        assert_eq!(fare.fare, 20.0);
    }

    #[test]
    fn test_idle_segment_without_min_fare() {
        let calculator = FareCalculator::new(tariff(0.0));
        let fare = calculator.calculate(&trip(vec![segment(at(10, 0), 0.0, 0.0, 1.0)]));

        assert_eq!(fare.fare, 7.0);
    }

    #[test]
    fn test_speed_at_threshold_is_idle() {
        let calculator = FareCalculator::new(tariff(0.0));
        let fare = calculator.calculate(&trip(vec![segment(at(10, 0), 10.0, 0.5, 0.05)]));

        assert!((fare.fare - (5.0 + 0.05 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_trip_is_flag_or_min_fare() {
        assert_eq!(FareCalculator::new(tariff(20.0)).calculate(&trip(vec![])).fare, 20.0);
        assert_eq!(FareCalculator::new(tariff(0.0)).calculate(&trip(vec![])).fare, 5.0);
    }

    #[test]
    fn test_consecutive_segments_day_and_night() {
        let calculator = FareCalculator::new(tariff(20.0));
        let fare = calculator.calculate(&trip(vec![
            segment(at(19, 30), 50.0, 5.0, 0.5),
            segment(at(20, 0), 50.0, 3.0, 0.5),
        ]));

        assert_eq!(fare.fare, 5.0 + 5.0 * 10.0 + 3.0 * 15.0);
    }

    #[test]
    fn test_reordering_segments_keeps_total() {
        let calculator = FareCalculator::new(tariff(0.0));
        let a = segment(at(8, 0), 40.0, 2.0, 0.05);
        let b = segment(at(21, 0), 0.0, 0.0, 0.25);
        let c = segment(at(12, 0), 30.0, 1.5, 0.05);

        let forward = calculator.calculate(&trip(vec![a, b, c])).fare;
        let backward = calculator.calculate(&trip(vec![c, b, a])).fare;

        assert!((forward - backward).abs() < 1e-9);
        assert_eq!(forward, calculator.calculate(&trip(vec![a, b, c])).fare);
    }

    #[test]
    fn test_is_daytime_boundaries() {
        let calculator = FareCalculator::new(tariff(0.0));

        assert!(calculator.is_daytime(at(6, 0)));
        assert!(calculator.is_daytime(at(12, 0)));
        assert!(calculator.is_daytime(at(19, 59)));
        assert!(!calculator.is_daytime(at(20, 0)));
        assert!(!calculator.is_daytime(at(22, 0)));
        assert!(!calculator.is_daytime(at(5, 59)));
    }
}
