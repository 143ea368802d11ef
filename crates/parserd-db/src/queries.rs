//! One function per DbClient operation that runs inside a job's
//! transaction (§4.5): system registration, run-id allocation, and the two
//! insert steps. Each takes the open `Transaction` explicitly rather than
//! reaching for a connection of its own, mirroring how the teacher's
//! `api-db` query modules take `&mut PgConnection` rather than a pool.

use postgres::types::ToSql;
use postgres::{Row, Transaction};

use parserd_core::{KeyValueBag, ParserError};
use parserd_xml::{sqldata, CompiledStylesheet, ColumnValue, XsltTransformEngine};

use crate::client::PgArrayFormatter;

/// Borrows the concrete `ToSql` implementation backing a [`ColumnValue`] —
/// each variant binds as its own Postgres type (int4/int8, float8, bool,
/// timestamptz) rather than as text, since `postgres`'s `ToSql` impl for
/// `String`/`&str` only accepts TEXT-family columns.
fn as_sql_param(value: &ColumnValue) -> &(dyn ToSql + Sync) {
    match value {
        ColumnValue::Text(s) => s,
        ColumnValue::Integer(i) => i,
        ColumnValue::Float(f) => f,
        ColumnValue::Boolean(b) => b,
        ColumnValue::Timestamp(ts) => ts,
    }
}

/// Builds and runs `INSERT INTO table (...) VALUES (...)`, binding one
/// typed column per non-null field of `record` plus `extra_columns`.
/// Returns the row named by `returning`, if requested.
fn insert_record(
    txn: &mut Transaction,
    table: &str,
    doc: &parserd_xml::XmlDoc,
    record: usize,
    extra_columns: Vec<(&str, ColumnValue)>,
    returning: Option<&str>,
) -> Result<Option<Row>, ParserError> {
    let formatter = PgArrayFormatter;
    let mut columns: Vec<String> = Vec::new();
    let mut values: Vec<ColumnValue> = Vec::new();

    for field in doc_field_children(doc, record) {
        let Some(name) = doc.node(field).attr("name") else { continue };
        if let Some(v) = sqldata::typed_column_value(doc, field, &formatter)? {
            columns.push(name.to_string());
            values.push(v);
        }
    }
    for (name, value) in extra_columns {
        columns.push(name.to_string());
        values.push(value);
    }

    if columns.is_empty() {
        return Err(ParserError::Transform(format!("{table} record has no fields to insert")));
    }

    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${i}")).collect();
    let mut sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );
    if let Some(returning) = returning {
        sql.push_str(" RETURNING ");
        sql.push_str(returning);
    }

    let params: Vec<&(dyn ToSql + Sync)> = values.iter().map(as_sql_param).collect();

    if returning.is_some() {
        let row = txn
            .query_one(&sql, &params)
            .map_err(|e| ParserError::DbQuery(format!("insert into {table}: {e}")))?;
        Ok(Some(row))
    } else {
        txn.execute(&sql, &params)
            .map(|_| None)
            .map_err(|e| ParserError::DbQuery(format!("insert into {table}: {e}")))
    }
}

fn doc_field_children(doc: &parserd_xml::XmlDoc, record: usize) -> Vec<usize> {
    doc.find_all_children(record, "field")
}

fn transform_single_record(
    engine: &XsltTransformEngine,
    stylesheet: &CompiledStylesheet,
    summary_xml: &[u8],
    table: &str,
    extra_params: &[(&str, String)],
) -> Result<(parserd_xml::XmlDoc, usize), ParserError> {
    let mut params = KeyValueBag::new(0);
    params.add("table", table);
    for (key, val) in extra_params {
        params.add(*key, val.clone());
    }
    let doc = engine.apply(stylesheet, summary_xml, &params)?;
    let record = sqldata::records(&doc)
        .into_iter()
        .next()
        .ok_or_else(|| ParserError::Transform(format!("{table} transform produced no record")))?;
    Ok((doc, record))
}

/// Transforms `summary_xml` into a `systems` record, hashes it, and either
/// returns the existing `syskey` for that hash or inserts a new row (§4.5,
/// §4.6 REG_SYSTEM). Callers MUST hold the global system-registration
/// mutex for the duration of this call (§5).
pub fn register_system(
    txn: &mut Transaction,
    engine: &XsltTransformEngine,
    stylesheet: &CompiledStylesheet,
    summary_xml: &[u8],
) -> Result<i64, ParserError> {
    let (doc, record) = transform_single_record(engine, stylesheet, summary_xml, "systems", &[])?;
    let sysid = sqldata::record_hash(&doc, record)?;

    if let Some(row) = txn
        .query_opt("SELECT syskey FROM systems WHERE sysid = $1", &[&sysid])
        .map_err(|e| ParserError::DbQuery(format!("systems lookup: {e}")))?
    {
        return Ok(row.get(0));
    }

    let row = insert_record(
        txn,
        "systems",
        &doc,
        record,
        vec![("sysid", ColumnValue::Text(sysid))],
        Some("syskey"),
    )?
    .expect("insert with RETURNING always yields a row");
    Ok(row.get(0))
}

/// Atomically allocates the next `rtevalruns` primary key (§4.5 ALLOC_RUN).
pub fn get_new_rterid(txn: &mut Transaction) -> Result<i64, ParserError> {
    let row = txn
        .query_one("SELECT nextval('rtevalruns_rterid_seq')", &[])
        .map_err(|e| ParserError::DbQuery(format!("allocating rterid: {e}")))?;
    Ok(row.get(0))
}

/// Transforms `summary_xml` into one `rtevalruns` row (§4.5, §4.6 INS_RUN).
#[allow(clippy::too_many_arguments)]
pub fn register_rtevalrun(
    txn: &mut Transaction,
    engine: &XsltTransformEngine,
    stylesheet: &CompiledStylesheet,
    summary_xml: &[u8],
    submid: u64,
    syskey: i64,
    rterid: i64,
    report_fname: &str,
) -> Result<(), ParserError> {
    let extra_params = [
        ("submid", submid.to_string()),
        ("syskey", syskey.to_string()),
        ("rterid", rterid.to_string()),
        ("report_filename", report_fname.to_string()),
    ];
    let (doc, record) =
        transform_single_record(engine, stylesheet, summary_xml, "rtevalruns", &extra_params)?;

    insert_record(
        txn,
        "rtevalruns",
        &doc,
        record,
        vec![
            ("rterid", ColumnValue::Integer(rterid)),
            ("syskey", ColumnValue::Integer(syskey)),
            ("submid", ColumnValue::Integer(submid as i64)),
            ("report_filename", ColumnValue::Text(report_fname.to_string())),
        ],
        None,
    )?;
    Ok(())
}

/// For each configured measurement table, transforms `summary_xml` with
/// that table name as the `table` parameter and inserts every resulting
/// record, tagged with `rterid` (§4.5, §4.6 INS_MEAS). A report with zero
/// measurement rows for a table is not an error.
pub fn register_measurements(
    txn: &mut Transaction,
    engine: &XsltTransformEngine,
    stylesheet: &CompiledStylesheet,
    summary_xml: &[u8],
    rterid: i64,
    measurement_tables: &[String],
) -> Result<(), ParserError> {
    for table in measurement_tables {
        let mut params = KeyValueBag::new(0);
        params.add("table", table.clone());
        params.add("rterid", rterid.to_string());
        let doc = engine.apply(stylesheet, summary_xml, &params)?;
        for record in sqldata::records(&doc) {
            insert_record(
                txn,
                table,
                &doc,
                record,
                vec![("rterid", ColumnValue::Integer(rterid))],
                None,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parserd_xml::XmlDoc;

    #[test]
    fn doc_field_children_reads_direct_fields_only() {
        let doc = XmlDoc::parse(
            r#"<sqldata table="t" schemaver="1"><record><field name="a">1</field><field name="b">2</field></record></sqldata>"#,
        )
        .unwrap();
        let record = sqldata::records(&doc)[0];
        assert_eq!(doc_field_children(&doc, record).len(), 2);
    }
}
