//! Domain records shared by every stage of the pipeline.
//!
//! These are also the wire shapes: trips and fares travel between stages as
//! JSON documents produced by serde.

use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;

/// A single GPS fix reported for a trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub trip_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix seconds, UTC.
    pub timestamp: i64,
}

impl GeoPoint {
    pub fn new(trip_id: i64, latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            trip_id,
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Great-circle distance to `other` in kilometers.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Motion between two consecutive points of the same trip.
///
/// Only built through [`Segment::between`] or [`Segment::from_measurements`],
/// both of which reject physically implausible values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_timestamp: i64,
    pub speed_kmh: f64,
    pub distance_km: f64,
    pub elapsed_hours: f64,
}

/// One delivery run and its validated segments, in point-arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: i64,
    pub segments: Vec<Segment>,
}

impl Trip {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            segments: Vec::new(),
        }
    }

    pub fn push_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn total_distance_km(&self) -> f64 {
        self.segments.iter().map(|s| s.distance_km).sum()
    }
}

/// The computed price of one finalized trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareRecord {
    pub id: i64,
    pub fare: f64,
}

impl FareRecord {
    pub fn new(id: i64, fare: f64) -> Self {
        Self { id, fare }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trip_has_no_segments() {
        let trip = Trip::new(1);
        assert_eq!(trip.id, 1);
        assert!(trip.segments.is_empty());
        assert_eq!(trip.total_distance_km(), 0.0);
    }

    #[test]
    fn test_trip_wire_shape() {
        let mut trip = Trip::new(7);
        trip.push_segment(Segment {
            start_timestamp: 1000,
            speed_kmh: 36.0,
            distance_km: 1.0,
            elapsed_hours: 1.0 / 36.0,
        });

        let json: serde_json::Value = serde_json::to_value(&trip).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["segments"][0]["start_timestamp"], 1000);
        assert_eq!(json["segments"][0]["speed_kmh"], 36.0);
        assert_eq!(json["segments"][0]["distance_km"], 1.0);
        assert!(json["segments"][0]["elapsed_hours"].is_f64());
    }

    #[test]
    fn test_fare_record_wire_shape() {
        let json = serde_json::to_string(&FareRecord::new(3, 12.5)).unwrap();
        assert_eq!(json, r#"{"id":3,"fare":12.5}"#);
    }

    #[test]
    fn test_point_distance_uses_haversine() {
        let a = GeoPoint::new(1, 35.700, 51.400, 1000);
        let b = GeoPoint::new(1, 35.701, 51.401, 1100);
        let d = a.distance_km(&b);
        assert!((d - 0.14).abs() < 0.01, "got {d}");
    }
}
