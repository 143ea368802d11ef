//! Conventions and accessors over the sqldata XML shape (§3 SqlDataDocument,
//! §4.4 SqlDataModel): tables, fields, records, typed values, and
//! deterministic record hashing.

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

use parserd_core::ParserError;

use crate::doc::XmlDoc;

/// Separates canonicalized array elements inside a hashed field's content,
/// matching the "single unit-separator byte" rule in §4.4.
const UNIT_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    XmlBlob,
    Array,
}

impl FieldType {
    pub fn parse(tag: &str) -> Result<Self, ParserError> {
        Ok(match tag {
            "string" => Self::String,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "boolean" => Self::Boolean,
            "timestamp" => Self::Timestamp,
            "xmlblob" => Self::XmlBlob,
            "array" => Self::Array,
            other => return Err(ParserError::XmlParse(format!("unknown field type: {other}"))),
        })
    }
}

/// A field's value as represented in the sqldata XML: either the value
/// itself, a SHA-1 digest standing in for content that was hashed instead
/// of stored inline, or an explicit null marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Inline(String),
    Hash(String),
    Null,
}

/// Reads the schema version a sqldata document (or the stylesheet that
/// produces one) was built against, from the `schemaver` attribute of the
/// given root-like node.
pub fn required_schema_version(doc: &XmlDoc, node: usize) -> Result<u32, ParserError> {
    doc.node(node)
        .attr("schemaver")
        .ok_or_else(|| ParserError::XmlParse("missing schemaver attribute".into()))?
        .parse()
        .map_err(|_| ParserError::XmlParse("schemaver is not a valid integer".into()))
}

/// The target table name declared on the sqldata root (§3).
pub fn table_name(doc: &XmlDoc) -> Result<&str, ParserError> {
    doc.node(doc.root())
        .attr("table")
        .ok_or_else(|| ParserError::XmlParse("sqldata root missing table attribute".into()))
}

/// Every `<record>` under the sqldata root, in document order.
pub fn records(doc: &XmlDoc) -> Vec<usize> {
    doc.find_all_children(doc.root(), "record")
}

/// Position of the field named `field_name` among `record`'s fields, or
/// `None` if absent (the original returns `-1` for this case).
pub fn field_index(doc: &XmlDoc, record: usize, field_name: &str) -> Option<usize> {
    doc.find_all_children(record, "field")
        .iter()
        .position(|&f| doc.node(f).attr("name") == Some(field_name))
}

/// The field node named `field_name` within `record`, if any.
pub fn find_field(doc: &XmlDoc, record: usize, field_name: &str) -> Option<usize> {
    doc.find_all_children(record, "field")
        .into_iter()
        .find(|&f| doc.node(f).attr("name") == Some(field_name))
}

/// Reads the value of `field_name` in the `record_index`-th record of
/// `doc`, or `None` if the field or record doesn't exist (§4.4).
pub fn value(doc: &XmlDoc, field_name: &str, record_index: usize) -> Option<String> {
    let record = records(doc).get(record_index).copied()?;
    let field = find_field(doc, record, field_name)?;
    match field_value(doc, field) {
        FieldValue::Inline(s) => Some(s),
        FieldValue::Hash(h) => Some(h),
        FieldValue::Null => None,
    }
}

fn field_value(doc: &XmlDoc, field: usize) -> FieldValue {
    let node = doc.node(field);
    if node.attr("null") == Some("1") {
        return FieldValue::Null;
    }
    if let Some(hash) = node.attr("hash") {
        return FieldValue::Hash(hash.to_string());
    }
    FieldValue::Inline(extract_content(doc, field))
}

/// Canonicalizes the text content of a field (or any node): concatenates
/// direct text, and for an `array`-typed field, the canonicalized content
/// of each child element joined by a single unit-separator byte (§4.4).
pub fn extract_content(doc: &XmlDoc, node: usize) -> String {
    let array_children = doc.find_all_children(node, "value");
    if !array_children.is_empty() {
        return array_children
            .iter()
            .map(|&v| extract_content(doc, v))
            .collect::<Vec<_>>()
            .join(&UNIT_SEPARATOR.to_string());
    }
    doc.direct_text(node)
}

/// SHA-1 over the canonicalized concatenation of every field in `record`
/// not explicitly marked `nohash="1"`, in document order, as 40 lowercase
/// hex characters (§3 RecordHash, §4.4 Hashing rule).
pub fn record_hash(doc: &XmlDoc, record: usize) -> Result<String, ParserError> {
    let mut hasher = Sha1::new();
    for field in doc.find_all_children(record, "field") {
        if doc.node(field).attr("nohash") == Some("1") {
            continue;
        }
        let content = match field_value(doc, field) {
            FieldValue::Inline(s) => s,
            FieldValue::Hash(h) => h,
            FieldValue::Null => String::new(),
        };
        hasher.update(content.as_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A vendor-specific capability for formatting an array field's elements as
/// a SQL array literal, supplied by the `DbClient` at init (§4.4, §9) so the
/// model stays decoupled from any one database dialect.
pub trait ArrayFormatter: Send + Sync {
    fn format_array(&self, elements: &[String]) -> String;
}

/// Formats an `array`-typed field node's elements using `formatter`.
pub fn format_array(doc: &XmlDoc, node: usize, formatter: &dyn ArrayFormatter) -> String {
    let elements: Vec<String> =
        doc.find_all_children(node, "value").iter().map(|&v| extract_content(doc, v)).collect();
    formatter.format_array(&elements)
}

/// A field's value converted to the Rust type its declared `type` attribute
/// implies, ready to bind as a typed SQL parameter rather than bare text —
/// binding every column as a string fails client-side for any column not
/// itself declared text (`postgres`'s `ToSql` impl for `String`/`&str` only
/// accepts TEXT-family OIDs), so the column's declared type must drive what
/// Rust value gets bound (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

/// The typed column value a `DbClient` should bind for `field`: `None` for
/// a null field (the column is omitted from the statement, leaving it to
/// the table's default); the hash digest for a hashed field and the
/// vendor-formatted array literal for an array field both bind as `Text`
/// (a hash is always hex text, and an array literal is bound as its own
/// text representation); every other field is converted per its declared
/// `type` attribute, defaulting to `string` when absent.
pub fn typed_column_value(
    doc: &XmlDoc,
    field: usize,
    formatter: &dyn ArrayFormatter,
) -> Result<Option<ColumnValue>, ParserError> {
    let raw = match field_value(doc, field) {
        FieldValue::Null => return Ok(None),
        FieldValue::Hash(h) => return Ok(Some(ColumnValue::Text(h))),
        FieldValue::Inline(_) if !doc.find_all_children(field, "value").is_empty() => {
            return Ok(Some(ColumnValue::Text(format_array(doc, field, formatter))));
        }
        FieldValue::Inline(s) => s,
    };

    let field_type = match doc.node(field).attr("type") {
        Some(tag) => FieldType::parse(tag)?,
        None => FieldType::String,
    };

    Ok(Some(match field_type {
        FieldType::String | FieldType::XmlBlob | FieldType::Array => ColumnValue::Text(raw),
        FieldType::Integer => ColumnValue::Integer(raw.parse().map_err(|_| {
            ParserError::XmlParse(format!("field is not a valid integer: {raw}"))
        })?),
        FieldType::Float => ColumnValue::Float(
            raw.parse().map_err(|_| ParserError::XmlParse(format!("field is not a valid float: {raw}")))?,
        ),
        FieldType::Boolean => ColumnValue::Boolean(match raw.as_str() {
            "1" | "true" | "t" => true,
            "0" | "false" | "f" => false,
            other => {
                return Err(ParserError::XmlParse(format!("field is not a valid boolean: {other}")))
            }
        }),
        FieldType::Timestamp => ColumnValue::Timestamp(
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ParserError::XmlParse(format!("field is not a valid timestamp: {e}")))?,
        ),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <sqldata table="systems" schemaver="3">
          <record>
            <field name="hostname">host-a</field>
            <field name="ipaddr">10.0.0.1</field>
            <field name="report_blob" hash="0123456789abcdef0123456789abcdef01234567" nohash="1"/>
            <field name="notes" null="1"/>
          </record>
          <record>
            <field name="hostname">host-b</field>
            <field name="ipaddr">10.0.0.2</field>
          </record>
        </sqldata>
    "#;

    fn doc() -> XmlDoc {
        XmlDoc::parse(SAMPLE).unwrap()
    }

    #[test]
    fn reads_table_and_schema_version() {
        let d = doc();
        assert_eq!(table_name(&d).unwrap(), "systems");
        assert_eq!(required_schema_version(&d, d.root()).unwrap(), 3);
    }

    #[test]
    fn value_reads_inline_and_null_fields() {
        let d = doc();
        assert_eq!(value(&d, "hostname", 0).as_deref(), Some("host-a"));
        assert_eq!(value(&d, "notes", 0), None);
        assert_eq!(value(&d, "hostname", 1).as_deref(), Some("host-b"));
    }

    #[test]
    fn field_index_reports_position_or_none() {
        let d = doc();
        let record = records(&d)[0];
        assert_eq!(field_index(&d, record, "ipaddr"), Some(1));
        assert_eq!(field_index(&d, record, "nope"), None);
    }

    #[test]
    fn record_hash_is_deterministic_and_excludes_nohash() {
        let d = doc();
        let records = records(&d);
        let h1 = record_hash(&d, records[0]).unwrap();
        let h2 = record_hash(&d, records[0]).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 40);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn record_hash_differs_across_distinct_records() {
        let d = doc();
        let records = records(&d);
        let h1 = record_hash(&d, records[0]).unwrap();
        let h2 = record_hash(&d, records[1]).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn array_field_joins_with_unit_separator() {
        let d = XmlDoc::parse(
            r#"<sqldata table="t" schemaver="1"><record><field name="samples" type="array"><value>1</value><value>2</value></field></record></sqldata>"#,
        )
        .unwrap();
        let record = records(&d)[0];
        let field = find_field(&d, record, "samples").unwrap();
        assert_eq!(extract_content(&d, field), "1\u{1f}2");
    }

    struct CsvFormatter;
    impl ArrayFormatter for CsvFormatter {
        fn format_array(&self, elements: &[String]) -> String {
            format!("{{{}}}", elements.join(","))
        }
    }

    #[test]
    fn typed_column_value_omits_null_and_defaults_to_text() {
        let d = doc();
        let record = records(&d)[0];
        let notes = find_field(&d, record, "notes").unwrap();
        assert_eq!(typed_column_value(&d, notes, &CsvFormatter).unwrap(), None);

        let hostname = find_field(&d, record, "hostname").unwrap();
        assert_eq!(
            typed_column_value(&d, hostname, &CsvFormatter).unwrap(),
            Some(ColumnValue::Text("host-a".to_string()))
        );
    }

    #[test]
    fn typed_column_value_converts_declared_non_string_types() {
        let d = XmlDoc::parse(
            r#"<sqldata table="t" schemaver="1"><record>
                <field name="count" type="integer">42</field>
                <field name="ratio" type="float">3.5</field>
                <field name="active" type="boolean">1</field>
                <field name="started" type="timestamp">2024-01-02T03:04:05Z</field>
               </record></sqldata>"#,
        )
        .unwrap();
        let record = records(&d)[0];

        let count = find_field(&d, record, "count").unwrap();
        assert_eq!(typed_column_value(&d, count, &CsvFormatter).unwrap(), Some(ColumnValue::Integer(42)));

        let ratio = find_field(&d, record, "ratio").unwrap();
        assert_eq!(typed_column_value(&d, ratio, &CsvFormatter).unwrap(), Some(ColumnValue::Float(3.5)));

        let active = find_field(&d, record, "active").unwrap();
        assert_eq!(
            typed_column_value(&d, active, &CsvFormatter).unwrap(),
            Some(ColumnValue::Boolean(true))
        );

        let started = find_field(&d, record, "started").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        assert_eq!(
            typed_column_value(&d, started, &CsvFormatter).unwrap(),
            Some(ColumnValue::Timestamp(expected))
        );
    }

    #[test]
    fn typed_column_value_rejects_unparseable_declared_type() {
        let d = XmlDoc::parse(
            r#"<sqldata table="t" schemaver="1"><record>
                <field name="count" type="integer">not-a-number</field>
               </record></sqldata>"#,
        )
        .unwrap();
        let record = records(&d)[0];
        let count = find_field(&d, record, "count").unwrap();
        assert!(typed_column_value(&d, count, &CsvFormatter).is_err());
    }

    #[test]
    fn format_array_delegates_to_injected_formatter() {
        let d = XmlDoc::parse(
            r#"<sqldata table="t" schemaver="1"><record><field name="samples" type="array"><value>1</value><value>2</value></field></record></sqldata>"#,
        )
        .unwrap();
        let record = records(&d)[0];
        let field = find_field(&d, record, "samples").unwrap();
        assert_eq!(format_array(&d, field, &CsvFormatter), "{1,2}");
    }
}
