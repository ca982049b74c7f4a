// Public API - the runner plus the types the CLI needs to build its arguments
pub mod runner;

pub mod config;
pub mod db;
pub mod error;
pub mod upload;

// Internal modules - organized by pipeline stage
mod backfill;
mod catalog;
mod fetch;
mod loader;
mod staging;
mod telemetry;

#[cfg(test)]
mod integ_tests;
