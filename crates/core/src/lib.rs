//! `yapplr-core` — identifiers and the domain error model shared by the
//! command pipeline crates.
//!
//! This crate contains **pure domain** primitives (no IO, no async).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CommandId, ConversationId, PostId, UserId};
