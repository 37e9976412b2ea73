// Public API - only expose the runner module
pub mod runner;

// Internal modules - organized by subsystem
mod config;
mod error;
mod formats;
mod io;
mod lakehouse;
mod pipeline;
mod schema;
mod telemetry;
