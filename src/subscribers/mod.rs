//! # Event subscribers for the simvisor controller.
//!
//! [`Subscribe`] is the extension point; `LogWriter` (feature `logging`) is the
//! built-in one. Delivery itself (queues, overflow accounting, flush on halt) belongs
//! to the controller's event pump.

#[cfg(feature = "logging")]
mod embedded;
mod subscriber;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use subscriber::Subscribe;
