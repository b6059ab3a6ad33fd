// LogMedic - lib.rs
//
// Library entry point, exposing the event bus, log watcher and healer for
// integration testing and for embedding in other local tooling.
//
// The CLI lives in `main.rs` and is not part of the library surface.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
