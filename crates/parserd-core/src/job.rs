//! The unit of work handed from the `QueuePoller` to a worker thread.

use crate::error::ParserError;

/// Mirrors the original `jobStatus` enum: `AVAIL` jobs carry real work,
/// `NONE` jobs are never constructed by this crate but the variant is kept
/// so callers can model "no job" without an `Option` at the FFI boundary
/// the original queue used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    None,
    Avail,
}

/// One submission queue row claimed for processing.
///
/// `clientid` and `filename` carry the original C struct's byte limits
/// (255 and 4095 usable bytes respectively) as constructor invariants.
#[derive(Debug, Clone)]
pub struct Job {
    pub status: JobStatus,
    pub submid: u64,
    pub clientid: String,
    pub filename: std::path::PathBuf,
}

impl Job {
    pub const MAX_CLIENTID_LEN: usize = 255;
    pub const MAX_FILENAME_LEN: usize = 4095;

    pub fn new(
        submid: u64,
        clientid: impl Into<String>,
        filename: impl Into<std::path::PathBuf>,
    ) -> Result<Self, ParserError> {
        if submid < 1 {
            return Err(ParserError::Config("submid must be >= 1".into()));
        }
        let clientid = clientid.into();
        if clientid.len() > Self::MAX_CLIENTID_LEN {
            return Err(ParserError::Config(format!(
                "clientid exceeds {} bytes",
                Self::MAX_CLIENTID_LEN
            )));
        }
        let filename = filename.into();
        let filename_str = filename.to_string_lossy();
        if filename_str.len() > Self::MAX_FILENAME_LEN {
            return Err(ParserError::Config(format!(
                "filename exceeds {} bytes",
                Self::MAX_FILENAME_LEN
            )));
        }
        if !filename.is_absolute() {
            return Err(ParserError::Config("filename must be absolute".into()));
        }
        Ok(Self { status: JobStatus::Avail, submid, clientid, filename })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_submid() {
        assert!(Job::new(0, "host", "/tmp/x.xml").is_err());
    }

    #[test]
    fn rejects_relative_filename() {
        assert!(Job::new(1, "host", "reports/x.xml").is_err());
    }

    #[test]
    fn rejects_oversized_clientid() {
        let huge = "a".repeat(Job::MAX_CLIENTID_LEN + 1);
        assert!(Job::new(1, huge, "/tmp/x.xml").is_err());
    }

    #[test]
    fn accepts_valid_job() {
        let job = Job::new(42, "host.example.com", "/var/lib/rteval/incoming/host/42.xml").unwrap();
        assert_eq!(job.status, JobStatus::Avail);
        assert_eq!(job.submid, 42);
    }
}
