//! Process utilities
//!
//! Signal handling used by the daemon's graceful shutdown, which hands a
//! running countdown off before the process exits.

pub mod signals;

pub use signals::shutdown_signal;
