//! fleet-agent library crate.
//!
//! Keeps an agent in sync with a fleet control plane: a scheduled check-in loop
//! that uploads pending events and hands the returned actions to a dispatcher.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod reporter;
pub mod scheduler;

pub use error::{Error, Result};
