pub mod config;
pub mod conversions;
pub mod destination;
pub mod error;
mod macros;
pub mod pipeline;
pub mod replication;
pub mod router;
pub mod telemetry;
pub mod types;
