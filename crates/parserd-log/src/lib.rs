//! Thread-safe, level-filtered, multi-destination log sink (§4.1).

pub mod level;
pub mod sink;

pub use level::LogLevel;
pub use sink::{DestinationSpec, LogSink};
