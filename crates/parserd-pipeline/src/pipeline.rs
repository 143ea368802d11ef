//! The per-job state machine (§4.6): transform, register the host under
//! the system-registration mutex, allocate a run id, insert the run and
//! its measurements, move the report file, and commit — with every
//! failure branch mapped to its own terminal [`SubmissionStatus`].

use std::path::{Path, PathBuf};

use parserd_core::{Config, Job, ParserError, RuntimeContext, SubmissionStatus};
use parserd_db::{queries, DbConnection};
use parserd_log::LogSink;
use parserd_xml::{CompiledStylesheet, XmlDoc, XsltTransformEngine};

/// Runs one job to a terminal status and writes that status to the queue.
/// Never panics on a recoverable failure — every branch below ends in a
/// `SubmissionStatus` and a best-effort queue write, per §4.6's terminal
/// action rule.
#[allow(clippy::too_many_arguments)]
pub fn process_job(
    job: &Job,
    conn: &mut DbConnection,
    engine: &XsltTransformEngine,
    stylesheet: &CompiledStylesheet,
    reportdir: &Path,
    cfg: &Config,
    ctx: &RuntimeContext,
    log: &LogSink,
) -> SubmissionStatus {
    let status = run_state_machine(job, conn, engine, stylesheet, reportdir, cfg, ctx, log);

    if let Err(e) = conn.update_submissionqueue(job.submid, status) {
        log.emerg(&format!(
            "submission {}: failed to write terminal status {status:?}: {e} \
             (operator reconciliation required)",
            job.submid
        ));
    }
    status
}

#[allow(clippy::too_many_arguments)]
fn run_state_machine(
    job: &Job,
    conn: &mut DbConnection,
    engine: &XsltTransformEngine,
    stylesheet: &CompiledStylesheet,
    reportdir: &Path,
    cfg: &Config,
    ctx: &RuntimeContext,
    log: &LogSink,
) -> SubmissionStatus {
    // SIZE_CHECK
    let size = match std::fs::metadata(&job.filename) {
        Ok(meta) => meta.len(),
        Err(e) => {
            log.err(&format!("submission {}: stat failed: {e}", job.submid));
            return SubmissionStatus::UnknownFail;
        }
    };
    if cfg.max_report_size != 0 && size > cfg.max_report_size {
        log.warning(&format!(
            "submission {}: {size} bytes exceeds max_report_size {}",
            job.submid, cfg.max_report_size
        ));
        return SubmissionStatus::FileTooBig;
    }

    // LOAD_XML
    let bytes = match std::fs::read(&job.filename) {
        Ok(b) => b,
        Err(e) => {
            log.err(&format!("submission {}: read failed: {e}", job.submid));
            return SubmissionStatus::UnknownFail;
        }
    };
    let text = match std::str::from_utf8(&bytes) {
        Ok(t) => t,
        Err(e) => {
            log.err(&format!("submission {}: report is not valid utf-8: {e}", job.submid));
            return SubmissionStatus::XmlFail;
        }
    };
    if let Err(e) = XmlDoc::parse(text) {
        log.err(&format!("submission {}: malformed report: {e}", job.submid));
        return SubmissionStatus::XmlFail;
    }

    // INPROG: best-effort, outside the job's transaction.
    if let Err(e) = conn.update_submissionqueue(job.submid, SubmissionStatus::InProgress) {
        log.err(&format!("submission {}: failed to mark INPROG: {e}", job.submid));
    }

    let mut txn = match conn.transaction() {
        Ok(t) => t,
        Err(e) => {
            log.err(&format!("submission {}: BEGIN failed: {e}", job.submid));
            return SubmissionStatus::DbFail;
        }
    };

    // REG_SYSTEM, under the global system-registration mutex (§5).
    let syskey = {
        let _guard = ctx.sysreg_mtx.lock().expect("sysreg mutex poisoned");
        queries::register_system(&mut txn, engine, stylesheet, &bytes)
    };
    let syskey = match syskey {
        Ok(k) => k,
        Err(e) => {
            log.err(&format!("submission {}: system registration failed: {e}", job.submid));
            let _ = txn.rollback();
            return SubmissionStatus::SysregFail;
        }
    };

    // ALLOC_RUN
    let rterid = match queries::get_new_rterid(&mut txn) {
        Ok(r) => r,
        Err(e) => {
            log.err(&format!("submission {}: rterid allocation failed: {e}", job.submid));
            let _ = txn.rollback();
            return SubmissionStatus::RteridFail;
        }
    };

    let dest = report_destination(reportdir, &job.clientid, job.submid, rterid);
    let dest_str = dest.to_string_lossy().into_owned();

    // INS_RUN
    if let Err(e) = queries::register_rtevalrun(
        &mut txn, engine, stylesheet, &bytes, job.submid, syskey, rterid, &dest_str,
    ) {
        log.err(&format!("submission {}: rtevalruns insert failed: {e}", job.submid));
        let _ = txn.rollback();
        return SubmissionStatus::RtevalrunFail;
    }

    // INS_MEAS
    if let Err(e) = queries::register_measurements(
        &mut txn, engine, stylesheet, &bytes, rterid, &cfg.measurement_tables,
    ) {
        log.err(&format!("submission {}: measurement insert failed: {e}", job.submid));
        let _ = txn.rollback();
        return SubmissionStatus::MeasureFail;
    }

    // MOVE_REPORT
    if let Err(e) = move_report(&job.filename, &dest) {
        log.err(&format!("submission {}: report move failed: {e}", job.submid));
        let _ = txn.rollback();
        return SubmissionStatus::RepmoveFail;
    }

    // COMMIT
    match txn.commit() {
        Ok(()) => SubmissionStatus::Success,
        Err(e) => {
            log.err(&format!("submission {}: COMMIT failed: {e}", job.submid));
            SubmissionStatus::DbFail
        }
    }
}

fn report_destination(reportdir: &Path, clientid: &str, submid: u64, rterid: i64) -> PathBuf {
    reportdir.join(clientid).join(format!("{submid}-{rterid}.xml"))
}

/// Moves the incoming report to its final location, creating the
/// per-client subdirectory on demand. Fails if the destination already
/// exists (§4.6 report file naming).
fn move_report(src: &Path, dest: &Path) -> Result<(), ParserError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        return Err(ParserError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        )));
    }
    std::fs::rename(src, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_destination_matches_naming_contract() {
        let dest = report_destination(Path::new("/var/lib/rteval/reports"), "host-a", 42, 7);
        assert_eq!(dest, PathBuf::from("/var/lib/rteval/reports/host-a/42-7.xml"));
    }

    #[test]
    fn move_report_refuses_to_overwrite_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("incoming.xml");
        std::fs::write(&src, b"<a/>").unwrap();
        let dest = dir.path().join("client").join("1-1.xml");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"<a/>").unwrap();

        let result = move_report(&src, &dest);
        assert!(result.is_err());
        assert!(src.exists());
    }

    #[test]
    fn move_report_creates_client_subdirectory_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("incoming.xml");
        std::fs::write(&src, b"<a/>").unwrap();
        let dest = dir.path().join("newclient").join("5-9.xml");

        move_report(&src, &dest).unwrap();
        assert!(!src.exists());
        assert!(dest.exists());
    }
}
