//! Cooperative cancellation.
//!
//! [`CancellationToken`] is the trigger that a [`crate::context::Context`]
//! carries alongside its deadline.

mod token;

pub use token::{CancelCallback, CancellationToken};
