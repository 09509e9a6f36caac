pub mod batch;
pub mod config;
pub mod fare;
pub mod geo;
pub mod input;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod segments;
pub mod transport;
