//! Failure classification and segment reassignment.
//!
//! Every per-connection failure (transport error, bad response, truncated body,
//! watchdog stall) is a [`ConnectionError`]. The scheduler decides whether the
//! segment moves straight to an idle untried mirror or waits in the
//! [`RetryQueue`] until one frees up.

mod error;
mod scheduler;

pub use error::{ConnectionError, FailureKind};
pub use scheduler::{decide, pick_server, RetryDecision, RetryQueue};
