//! Process-wide tracing setup shared by the scanners, jobs, and any future
//! binary front-end.

pub mod tracing;

pub use tracing::{LogFormat, init, init_with_format};
