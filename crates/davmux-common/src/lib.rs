//! davmux Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, configuration model, clock
//! abstraction and path helpers used across all davmux components.

pub mod clock;
pub mod config;
pub mod error;
pub mod path;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use config::Config;
pub use error::{Error, Result};
