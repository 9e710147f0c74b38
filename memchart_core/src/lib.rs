//! Memchart Core
//!
//! Samples a server's memory usage from a panel api, keeps a per-server
//! history on disk and renders it as a line chart.

pub mod chart;
pub mod client;
pub mod debug;
pub mod error;
pub mod sampler;
pub mod series;
