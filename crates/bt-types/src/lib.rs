//! # bt-types
//!
//! Shared configuration, parameter vectors and error types for the Betatron
//! actuator controller.

pub mod config;
pub mod errors;
pub mod params;

pub use config::*;
pub use errors::*;
pub use params::*;
