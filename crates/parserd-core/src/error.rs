//! Error kinds shared across the ingestion pipeline.
//!
//! These map 1:1 onto the error kinds a job can fail with, and — outside of a
//! job — onto the exit codes a failed startup reports (see `parserd-daemon`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("XSLT transform error: {0}")]
    Transform(String),

    #[error("database connection error: {0}")]
    DbConnect(String),

    #[error("database query error: {0}")]
    DbQuery(String),

    #[error("hash computation error: {0}")]
    Hash(String),

    #[error("report is {size} bytes, exceeds max_report_size of {limit}")]
    FileTooBig { size: u64, limit: u64 },

    #[error("shutdown requested")]
    ShutdownRequested,
}
