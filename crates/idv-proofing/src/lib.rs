pub mod config;
pub mod error;
pub mod proofing;
pub mod telemetry;
