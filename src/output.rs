//! Output formatting and persistence for computed fares.
//!
//! Supports pretty-printing, JSON logging, and a CSV sink that appends
//! `id,fare` rows batch by batch.

use anyhow::Result;
use async_trait::async_trait;
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::batch::{FareSink, SinkError};
use crate::models::FareRecord;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Formats a fare the way it is persisted: two decimal places.
pub fn format_fare(fare: f64) -> String {
    format!("{:.2}", fare)
}

/// Appends fare batches as headerless `id,fare` rows to a CSV file.
///
/// The file is opened once in append mode, so rows written by earlier runs
/// or earlier batches are never truncated.
pub struct CsvFareWriter {
    writer: csv::Writer<File>,
    rows_written: usize,
}

impl CsvFareWriter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().append(true).create(true).open(path)?;
        debug!(path = %path.display(), "Opened fare CSV for appending");

        let writer = WriterBuilder::new().has_headers(false).from_writer(file);
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[async_trait]
impl FareSink for CsvFareWriter {
    async fn write_batch(&mut self, fares: &[FareRecord]) -> Result<(), SinkError> {
        for fare in fares {
            self.writer
                .write_record([fare.id.to_string(), format_fare(fare.fare)])?;
        }
        self.writer.flush()?;
        self.rows_written += fares.len();
        debug!(rows = fares.len(), "Batch written to CSV");
        Ok(())
    }
}
