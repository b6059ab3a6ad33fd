// LogMedic - core/mod.rs
//
// Core business logic layer.
// Dependencies: standard library plus data crates (chrono, regex, serde).
// Must NOT depend on: platform, app, or any I/O.

pub mod classify;
pub mod clock;
pub mod debounce;
pub mod model;
pub mod rules;
