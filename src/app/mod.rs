// LogMedic - app/mod.rs
//
// Application layer: event bus, log watcher, healer.
// Dependencies: core, platform, util.

pub mod bus;
pub mod healer;
pub mod watcher;
