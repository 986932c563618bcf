//! Core types and trait definitions for the Parlor conversation store.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the domain model, the caller-facing [`store::ConversationStore`]
//! trait, and the storage port ([`port::StoreTx`]) that the upsert and
//! document-assembly algorithms are written against.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod conversation;
pub mod document;
pub mod error;
pub mod id;
pub mod model;
pub mod port;
pub mod speaker;
pub mod store;
pub mod upsert;

pub use error::{DomainError, Error, Result};

#[cfg(test)]
mod testing;
