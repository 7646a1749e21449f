//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements              | Connects to                    |
//! |------------|-------------------------|--------------------------------|
//! | `log_sink` | EventSink               | `log` facade (serial console)  |
//! | `sim`      | every board port        | host simulation of the board   |
//!
//! A register-level board adapter for the target MCU implements the same
//! traits; the core never depends on either.

pub mod log_sink;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
