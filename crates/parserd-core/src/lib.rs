//! Foundational types shared by every crate in the ingestion pipeline:
//! the key/value bag, job/status types, the shared error enum, the merged
//! configuration view, and the runtime context passed explicitly to every
//! component (§9 — no hidden singletons).

pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod kvbag;
pub mod status;

pub use config::Config;
pub use context::{FatalError, RuntimeContext, ThreadCounter, ThreadCounterGuard};
pub use error::ParserError;
pub use job::{Job, JobStatus};
pub use kvbag::{Entry, KeyValueBag};
pub use status::SubmissionStatus;
