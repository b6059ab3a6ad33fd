// LogMedic - platform/mod.rs
//
// Platform abstraction layer: filesystem access, config discovery, log path
// discovery and OS-level remediation.
// Dependencies: standard library, directories crate, util.
// Must NOT depend on: app.

pub mod config;
pub mod fs;
pub mod remedy;
pub mod sources;
