//! Application core: foreground logic, no direct I/O.
//!
//! The business rules of the logger: what happens on a wake alarm, when
//! the enclosure opens, when a fast-sample half is ready.  All interaction
//! with hardware happens through **port traits** defined in [`ports`],
//! keeping this layer testable on the host against the simulated board.

pub mod events;
pub mod ports;
pub mod service;
