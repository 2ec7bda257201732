//! Membership Module
//!
//! Node identity and this node's view of the member table. Discovery and
//! failure detection belong to the external membership service; the dispatch
//! core consumes its notifications and never mutates membership on its own.
//!
//! ## Core Mechanisms
//! - **Incarnation Numbers**: a state claim wins only with a newer incarnation
//!   (or an `Alive` refutation of a `Suspect` at the same incarnation).
//! - **Epochs**: every effective change bumps the view's epoch, letting callers
//!   tell a replica set resolved before a change from one resolved after it.

pub mod types;
pub mod view;
