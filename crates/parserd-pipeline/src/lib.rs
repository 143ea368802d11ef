//! The concurrent ingestion pipeline (§2): per-job state machine, worker
//! pool and dispatch, queue polling, and top-level control loop.

pub mod control;
pub mod pipeline;
pub mod poller;
pub mod pool;

pub use control::ControlLoop;
pub use pipeline::process_job;
pub use poller::QueuePoller;
pub use pool::{Dispatcher, ThreadSlot, WorkerPool};
