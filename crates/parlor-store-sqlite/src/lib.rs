//! SQLite backend for the Parlor conversation store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every logical operation is one SQLite
//! transaction bounded by a [`Deadline`].

mod encode;
mod schema;
mod store;
mod tx;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreOptions};
pub use tx::Deadline;
