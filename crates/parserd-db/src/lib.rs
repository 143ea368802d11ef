//! A blocking PostgreSQL session with transaction control, notification
//! listening, and queue manipulation primitives (§4.5 DbClient).
//!
//! Deliberately built on the blocking `postgres` crate rather than an async
//! pool: §5 specifies multithreaded parallelism with no cooperative runtime,
//! so each worker owns one session for its whole lifetime instead of
//! borrowing one from a shared pool.

pub mod client;
pub mod queries;
pub mod schema;

pub use client::{DbConnection, NotificationOutcome, PgArrayFormatter};
