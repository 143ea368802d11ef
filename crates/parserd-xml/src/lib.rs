//! XML parsing, the sqldata document model, and XSLT transformation
//! (§1, §4.3, §4.4) — the abstract "XML DOM library" and "XSLT engine"
//! capabilities the daemon is built around.

pub mod doc;
pub mod sqldata;
pub mod xslt;

pub use doc::{Child, Node, XmlDoc};
pub use sqldata::{
    extract_content, field_index, find_field, format_array, record_hash, records,
    required_schema_version, table_name, typed_column_value, value, ArrayFormatter, ColumnValue,
    FieldType, FieldValue,
};
pub use xslt::{CompiledStylesheet, XsltTransformEngine};
