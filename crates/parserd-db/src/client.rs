//! The database session itself (§3 DbConnection, §4.5 DbClient): connect,
//! liveness, transaction boundaries, notification listening, and queue
//! claim/update. Record-insertion primitives that run inside a job's
//! transaction live in [`crate::queries`].

use std::time::Duration;

use fallible_iterator::FallibleIterator;
use postgres::{Client, NoTls, Transaction};

use parserd_core::{Config, Job, ParserError, SubmissionStatus};
use parserd_xml::ArrayFormatter;

/// Formats array elements as a Postgres array literal (`{"a","b"}`), the
/// vendor-specific half of [`parserd_xml::ArrayFormatter`] (§4.4, §9).
#[derive(Debug, Clone, Copy, Default)]
pub struct PgArrayFormatter;

impl ArrayFormatter for PgArrayFormatter {
    fn format_array(&self, elements: &[String]) -> String {
        let quoted: Vec<String> = elements
            .iter()
            .map(|e| format!("\"{}\"", e.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect();
        format!("{{{}}}", quoted.join(","))
    }
}

/// Outcome of one [`DbConnection::wait_notification`] call (§4.5).
#[derive(Debug)]
pub enum NotificationOutcome {
    HasData,
    Shutdown,
}

/// A live database session: a monotonically assigned connection id and the
/// `sql_schema_ver` read once at connect (§3 DbConnection).
pub struct DbConnection {
    id: u64,
    client: Client,
    schema_version: u32,
}

impl DbConnection {
    /// Opens a session and enforces stylesheet/schema compatibility: if
    /// `required_schema_version` exceeds the database's `sql_schema_ver`,
    /// the connection is rejected (§3, exit code 10 at the daemon layer).
    pub fn connect(cfg: &Config, id: u64, required_schema_version: u32) -> Result<Self, ParserError> {
        let conn_str = format!(
            "host={} port={} user={} password={} dbname={}",
            cfg.db_server, cfg.db_port, cfg.db_username, cfg.db_password, cfg.database
        );
        let mut client =
            Client::connect(&conn_str, NoTls).map_err(|e| ParserError::DbConnect(e.to_string()))?;

        let row = client
            .query_opt("SELECT value FROM rteval_info WHERE key = 'sql_schema_ver'", &[])
            .map_err(|e| ParserError::DbConnect(format!("reading sql_schema_ver: {e}")))?
            .ok_or_else(|| ParserError::DbConnect("rteval_info has no sql_schema_ver row".into()))?;
        let raw: String = row.get(0);
        let schema_version: u32 = raw
            .parse()
            .map_err(|_| ParserError::DbConnect(format!("sql_schema_ver is not an integer: {raw}")))?;

        if required_schema_version > schema_version {
            return Err(ParserError::DbConnect(format!(
                "stylesheet requires schema {required_schema_version}, database reports {schema_version}"
            )));
        }

        Ok(Self { id, client, schema_version })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Cheap liveness check run before each job pickup (§4.5).
    pub fn ping(&mut self) -> bool {
        self.client.simple_query("SELECT 1").is_ok()
    }

    /// `LISTEN <channel>`; must be called once before the first
    /// `wait_notification` on that channel.
    pub fn listen(&mut self, channel: &str) -> Result<(), ParserError> {
        self.client
            .batch_execute(&format!("LISTEN {channel}"))
            .map_err(|e| ParserError::DbQuery(format!("LISTEN {channel}: {e}")))
    }

    /// Blocks with a 2-second wakeup cadence until either a notification
    /// arrives on the listened channel or `shutdown` becomes true (§4.5,
    /// §5 — shutdown must be observed within one poll interval).
    pub fn wait_notification(
        &mut self,
        shutdown: &impl Fn() -> bool,
    ) -> Result<NotificationOutcome, ParserError> {
        loop {
            if shutdown() {
                return Ok(NotificationOutcome::Shutdown);
            }
            let mut notifications = self.client.notifications();
            let mut iter = notifications.timeout_iter(Duration::from_secs(2));
            match iter
                .next()
                .map_err(|e| ParserError::DbQuery(format!("waiting for notification: {e}")))?
            {
                Some(_) => return Ok(NotificationOutcome::HasData),
                None => continue,
            }
        }
    }

    /// Begins a transaction; nested transactions are not supported (§4.5).
    pub fn transaction(&mut self) -> Result<Transaction<'_>, ParserError> {
        self.client.transaction().map_err(|e| ParserError::DbQuery(format!("BEGIN: {e}")))
    }

    /// Atomically claims the oldest `NEW` row by transitioning it to
    /// `ASSIGNED` and returns it; `None` if no row is available. Callers
    /// must hold `queue_mtx` for the duration of this call (§4.5, §5).
    pub fn get_submissionqueue_job(&mut self) -> Result<Option<Job>, ParserError> {
        let mut txn = self
            .client
            .transaction()
            .map_err(|e| ParserError::DbQuery(format!("BEGIN: {e}")))?;

        let claimed = txn
            .query_opt(
                "UPDATE submissionqueue SET status = $1
                 WHERE submid = (
                     SELECT submid FROM submissionqueue
                     WHERE status = $2
                     ORDER BY submid
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED
                 )
                 RETURNING submid, clientid, filename",
                &[&SubmissionStatus::Assigned.as_i32(), &SubmissionStatus::New.as_i32()],
            )
            .map_err(|e| ParserError::DbQuery(format!("claiming submission: {e}")))?;

        let Some(row) = claimed else {
            txn.commit().map_err(|e| ParserError::DbQuery(format!("COMMIT: {e}")))?;
            return Ok(None);
        };

        txn.commit().map_err(|e| ParserError::DbQuery(format!("COMMIT: {e}")))?;

        let submid: i64 = row.get(0);
        let clientid: String = row.get(1);
        let filename: String = row.get(2);
        Job::new(submid as u64, clientid, filename).map(Some)
    }

    /// Writes a terminal (or `INPROG`) status outside any transaction
    /// (§4.5, §4.6 — the final status update happens after rollback/commit
    /// has already completed).
    pub fn update_submissionqueue(
        &mut self,
        submid: u64,
        status: SubmissionStatus,
    ) -> Result<(), ParserError> {
        self.client
            .execute(
                "UPDATE submissionqueue SET status = $1 WHERE submid = $2",
                &[&status.as_i32(), &(submid as i64)],
            )
            .map(|_| ())
            .map_err(|e| ParserError::DbQuery(format!("updating submission {submid}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_array_formatter_quotes_and_escapes_elements() {
        let f = PgArrayFormatter;
        assert_eq!(f.format_array(&["a".into(), "b".into()]), r#"{"a","b"}"#);
        assert_eq!(f.format_array(&[r#"has"quote"#.into()]), r#"{"has\"quote"}"#);
        assert_eq!(f.format_array(&[]), "{}");
    }
}
