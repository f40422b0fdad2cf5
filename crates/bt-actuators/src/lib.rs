//! # bt-actuators
//!
//! File-backed actuator sink for the Betatron controller: the deformable
//! mirror and pulse-shaper command files the instrument controllers pick up.

mod format;
mod sink;

pub use format::CommandTarget;
pub use sink::CommandFileSink;
