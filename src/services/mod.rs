//! External surfaces and durable state
//!
//! This module contains the collaborators the countdown loops talk to:
//! the alert and notification surfaces, the fire-once alert gate and the
//! background job store.

pub mod alert;
pub mod alert_gate;
pub mod job_store;
pub mod notifications;

// Re-export main types
pub use alert::{AlertSurface, ToneAlert};
pub use alert_gate::AlertGate;
pub use job_store::{JobRecord, JobStatus, JobStore};
pub use notifications::{check_notify_send_available, DesktopNotifier, NotificationSurface};
