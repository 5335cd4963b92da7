//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod http;
pub mod telemetry;
