//! DDL for the stable schema contract (§6): table shapes this crate reads
//! and writes by name. Exposed for integration tests and for an operator to
//! run once against a fresh database (e.g. via `psql`, or a one-off call
//! from a test harness); this crate's own binary never runs it automatically
//! against a live database.

use postgres::Client;

use parserd_core::ParserError;

const RTEVAL_INFO: &str = "
CREATE TABLE IF NOT EXISTS rteval_info (
    key   text PRIMARY KEY,
    value text NOT NULL
)";

const SUBMISSIONQUEUE: &str = "
CREATE TABLE IF NOT EXISTS submissionqueue (
    submid   bigserial PRIMARY KEY,
    clientid text NOT NULL,
    filename text NOT NULL,
    status   int NOT NULL DEFAULT 0,
    received timestamp NOT NULL DEFAULT now()
)";

const SUBMISSIONQUEUE_NOTIFY: &str = "
CREATE OR REPLACE FUNCTION notify_rteval_submq() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify('rteval_submq', NEW.submid::text);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS rteval_submq_notify ON submissionqueue;
CREATE TRIGGER rteval_submq_notify
    AFTER INSERT ON submissionqueue
    FOR EACH ROW EXECUTE FUNCTION notify_rteval_submq()";

const SYSTEMS: &str = "
CREATE TABLE IF NOT EXISTS systems (
    syskey bigserial PRIMARY KEY,
    sysid  text UNIQUE NOT NULL
)";

const RTEVALRUNS: &str = "
CREATE SEQUENCE IF NOT EXISTS rtevalruns_rterid_seq;

CREATE TABLE IF NOT EXISTS rtevalruns (
    rterid          bigint PRIMARY KEY DEFAULT nextval('rtevalruns_rterid_seq'),
    syskey          bigint NOT NULL REFERENCES systems(syskey),
    submid          bigint NOT NULL,
    report_filename text NOT NULL
)";

/// Creates the fixed tables every installation needs regardless of which
/// measurement tables are configured (§6 Database schema contract).
pub fn apply_fixed_schema(client: &mut Client) -> Result<(), ParserError> {
    for stmt in [RTEVAL_INFO, SUBMISSIONQUEUE, SUBMISSIONQUEUE_NOTIFY, SYSTEMS, RTEVALRUNS] {
        client
            .batch_execute(stmt)
            .map_err(|e| ParserError::DbConnect(format!("applying fixed schema: {e}")))?;
    }
    Ok(())
}

/// One measurement table per configured name (§6), schema driven entirely
/// by the stylesheet's output — this crate only guarantees the foreign key
/// back to the run that produced the rows.
pub fn apply_measurement_table(client: &mut Client, table: &str) -> Result<(), ParserError> {
    let stmt = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id     bigserial PRIMARY KEY,
            rterid bigint NOT NULL REFERENCES rtevalruns(rterid)
        )"
    );
    client
        .batch_execute(&stmt)
        .map_err(|e| ParserError::DbConnect(format!("applying schema for {table}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_schema_statements_reference_the_contracted_table_names() {
        for stmt in [RTEVAL_INFO, SUBMISSIONQUEUE, SYSTEMS, RTEVALRUNS] {
            assert!(stmt.contains("CREATE TABLE") || stmt.contains("CREATE SEQUENCE"));
        }
        assert!(SUBMISSIONQUEUE.contains("submissionqueue"));
        assert!(SYSTEMS.contains("sysid"));
        assert!(RTEVALRUNS.contains("syskey"));
    }

    #[test]
    fn measurement_table_ddl_includes_rterid_foreign_key() {
        let stmt_table = "cyclictest";
        let expected_ref = format!("CREATE TABLE IF NOT EXISTS {stmt_table}");
        let stmt = format!(
            "CREATE TABLE IF NOT EXISTS {stmt_table} (\n            id     bigserial PRIMARY KEY,\n            rterid bigint NOT NULL REFERENCES rtevalruns(rterid)\n        )"
        );
        assert!(stmt.starts_with(&expected_ref));
        assert!(stmt.contains("REFERENCES rtevalruns(rterid)"));
    }
}
