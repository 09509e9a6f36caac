use async_trait::async_trait;
use fare_estimator::batch::{FareSink, SinkError};
use fare_estimator::config::AppConfig;
use fare_estimator::fare::FareCalculator;
use fare_estimator::input::PointReader;
use fare_estimator::models::FareRecord;
use fare_estimator::output::CsvFareWriter;
use fare_estimator::pipeline;
use std::collections::VecDeque;
use std::fs;
use std::io::Read;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

const FIXTURE: &str = "tests/fixtures/points.csv";

fn temp_path(name: &str) -> String {
    format!("{}/{}", std::env::temp_dir().display(), name)
}

#[derive(Clone, Default)]
struct CollectingSink {
    rows: Arc<Mutex<Vec<FareRecord>>>,
}

#[async_trait]
impl FareSink for CollectingSink {
    async fn write_batch(&mut self, fares: &[FareRecord]) -> Result<(), SinkError> {
        self.rows.lock().unwrap().extend_from_slice(fares);
        Ok(())
    }
}

#[tokio::test]
async fn test_full_pipeline_writes_fares_csv() {
    let output = temp_path("fare_estimator_it_full.csv");
    let _ = fs::remove_file(&output);

    let config = AppConfig::default();
    let reader = PointReader::open(FIXTURE).expect("fixture should open");
    let sink = CsvFareWriter::open(&output).expect("output should open");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = pipeline::run(&config, reader, sink, shutdown_rx)
        .await
        .expect("pipeline should finish");

    assert_eq!(report.read.points, 5);
    assert_eq!(report.read.skipped, 1);
    assert_eq!(report.trips(), 2);
    assert_eq!(report.ingest.aggregator.rejected_degenerate, 1);
    assert_eq!(report.fares_written(), 2);
    assert_eq!(report.fares_dropped(), 0);

    // Pricing workers may finish out of order.
    let content = fs::read_to_string(&output).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    lines.sort();
    // Trip 1: ~5.56 km moving by day plus 15 minutes idle.
    // Trip 2: only a zero-length interval, so the minimum fare applies.
    assert_eq!(lines, vec!["1,8.39", "2,3.47"]);

    fs::remove_file(&output).unwrap();
}

#[tokio::test]
async fn test_pipeline_with_custom_sink_and_small_batches() {
    let mut config = AppConfig::default();
    config.batch.batch_size = 1;
    config.pipeline.workers = 1;

    let sink = CollectingSink::default();
    let rows = sink.rows.clone();
    let reader = PointReader::open(FIXTURE).unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = pipeline::run(&config, reader, sink, shutdown_rx)
        .await
        .unwrap();

    assert_eq!(report.persist.buffer.flushes, 2);
    let mut rows = rows.lock().unwrap().clone();
    rows.sort_by_key(|r| r.id);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], FareRecord::new(2, 3.47));
}

/// Serves one row per `read` call and raises the shutdown flag when row
/// `trigger_at` (0-based) is requested.
struct SignallingReader {
    rows: VecDeque<Vec<u8>>,
    served: usize,
    trigger_at: usize,
    shutdown: watch::Sender<bool>,
}

impl Read for SignallingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let Some(mut row) = self.rows.pop_front() else {
            return Ok(0);
        };
        if self.served == self.trigger_at {
            let _ = self.shutdown.send(true);
        }

        let n = row.len().min(buf.len());
        buf[..n].copy_from_slice(&row[..n]);
        if n < row.len() {
            self.rows.push_front(row.split_off(n));
        } else {
            self.served += 1;
        }
        Ok(n)
    }
}

#[tokio::test]
async fn test_shutdown_mid_stream_flushes_trip_in_progress() {
    let rows = [
        "1,0.0,0.0,36000\n",
        "1,0.0,0.05,36360\n",
        "1,0.0,0.05,37260\n",
        "2,0.0,0.0,36000\n",
        "2,0.0,0.0,39600\n",
        "2,0.0,0.0,39600\n",
        "2,0.0,0.0,43200\n",
        "3,0.0,0.0,43200\n",
    ];
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reader = PointReader::from_reader(SignallingReader {
        rows: rows.iter().map(|r| r.as_bytes().to_vec()).collect(),
        served: 0,
        trigger_at: 6,
        shutdown: shutdown_tx,
    });
    let sink = CollectingSink::default();
    let rows_written = sink.rows.clone();

    let report = pipeline::run(&AppConfig::default(), reader, sink, shutdown_rx)
        .await
        .unwrap();

    // Trip 2 is cut before its last row; the repeated timestamp adds nothing.
    assert!(report.ingest.aggregator.points < rows.len() - 1);
    assert_eq!(report.trips(), 2);
    assert_eq!(report.fares_written(), 2);

    let mut written = rows_written.lock().unwrap().clone();
    written.sort_by_key(|r| r.id);
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].id, 1);
    assert!((written[0].fare - 8.389).abs() < 1e-2);
    // One idle hour: 1.30 flag + 11.90.
    assert_eq!(written[1].id, 2);
    assert!((written[1].fare - 13.20).abs() < 1e-9);
}

#[tokio::test]
async fn test_shutdown_before_start_writes_nothing() {
    let sink = CollectingSink::default();
    let rows = sink.rows.clone();
    let reader = PointReader::open(FIXTURE).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let report = pipeline::run(&AppConfig::default(), reader, sink, shutdown_rx)
        .await
        .unwrap();

    assert_eq!(report.trips(), 0);
    assert_eq!(report.fares_written(), 0);
    assert!(rows.lock().unwrap().is_empty());
}

#[test]
fn test_price_points_matches_pipeline() {
    let config = AppConfig::default();
    let calculator = FareCalculator::new(config.tariff.clone());
    let reader = PointReader::open(FIXTURE).unwrap();

    let priced = pipeline::price_points(reader, &calculator);

    assert_eq!(priced.len(), 2);
    assert_eq!(priced[0].0.id, 1);
    assert_eq!(priced[0].0.segments.len(), 2);
    assert!((priced[0].1.fare - 8.389).abs() < 1e-2);
    assert!(priced[1].0.segments.is_empty());
    assert_eq!(priced[1].1, FareRecord::new(2, 3.47));
}
