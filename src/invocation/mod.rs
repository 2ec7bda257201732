//! Invocation Futures
//!
//! Every dispatched operation hands its caller an `InvocationFuture`. The
//! caller may wait with a bound (`get`), wait without one (`join`) or register
//! one callback (`on_complete`). Waiting never cancels the operation.
//!
//! Completion is published through a `tokio::sync::watch` channel, so the
//! dispatching task never calls into caller code directly.

pub mod future;

pub use future::{InvocationFuture, InvocationHandle};
