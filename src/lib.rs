//! Field data-logger firmware library.
//!
//! Exposes the logger core for the simulator binary, integration tests and
//! fuzz targets.  Hardware is reached only through the port traits in
//! [`app::ports`]; the host simulation lives behind the `sim` feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bus;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod log_store;
pub mod scheduler;
pub mod sensors;
pub mod timestamp;
