//! Message transport between pipeline stages.
//!
//! Stages only see the [`Publisher`] and [`Consumer`] capabilities and raw
//! JSON bytes, so a network broker can replace the in-memory queues without
//! touching stage code.

mod broker;
pub mod memory;

pub use broker::{Consumer, Publisher};

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("queue is closed")]
    Closed,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encodes a record as a JSON message body.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, TransportError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Decodes a JSON message body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransportError> {
    Ok(serde_json::from_slice(body)?)
}
