//! Client-Facing Proxies
//!
//! A proxy is a caller's handle to one named container. Every data-access call
//! passes `ensure_open()` first.
//!
//! ## Lifecycle
//! - **close()**: `OPEN -> CLOSED`. The winning caller waits on every tracked
//!   asynchronous call (bounded by `invocation.close_drain_timeout_ms` each),
//!   hands timeouts and failures to the call's listener, then runs close hooks.
//! - **destroy()**: `close()`, then `CLOSED -> DESTROYED` and one grid-wide
//!   destroy operation whose failure is returned to the caller.
//! - **open()**: `CLOSED -> OPEN`; an error once destroyed.

pub mod cache;
pub mod context;
pub mod lifecycle;
pub mod queue;
pub mod tracker;

pub use cache::CacheProxy;
pub use lifecycle::{ProxyLifecycle, ProxyState};
pub use queue::QueueProxy;
pub use tracker::{CompletionListener, InvocationTracker};

#[cfg(test)]
mod tests;
