//! # Built-in subscribers
//!
//! These are small, self-contained implementations useful for demos.
//!
//! - [`LogWriter`]: renders events as `tracing` records (demo/debug).

mod log;

pub use log::LogWriter;
