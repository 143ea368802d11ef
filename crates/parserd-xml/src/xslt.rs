//! The transform step (§4.3): runs an XSLT stylesheet over an incoming
//! report via the real `xsltproc` binary rather than an embedded engine —
//! the stylesheet itself, and the tool that applies it, are deployment
//! artifacts, not something this crate reimplements.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use parserd_core::{KeyValueBag, ParserError};

use crate::doc::XmlDoc;
use crate::sqldata;

/// A stylesheet validated to exist and to declare the schema version it
/// produces, read once at worker startup (§4.3, §9).
#[derive(Debug, Clone)]
pub struct CompiledStylesheet {
    path: PathBuf,
    schema_version: u32,
}

impl CompiledStylesheet {
    /// Reads `path` as XML and extracts the `schemaver` attribute declared
    /// on its top-level `xsl:variable name="schemaver"` — the mechanism
    /// this system uses to detect a stylesheet/database schema mismatch
    /// before ever applying it to a report (§9 Open Question).
    pub fn compile(path: impl AsRef<Path>) -> Result<Self, ParserError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ParserError::Transform(format!(
                "stylesheet not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(&path)?;
        let doc = XmlDoc::parse(&text)?;
        let marker = doc
            .element_children(doc.root())
            .find(|&c| {
                doc.node(c).tag.ends_with("variable") && doc.node(c).attr("name") == Some("schemaver")
            })
            .ok_or_else(|| {
                ParserError::Transform(format!(
                    "{} does not declare an xsl:variable named schemaver",
                    path.display()
                ))
            })?;
        let schema_version = doc
            .node(marker)
            .attr("select")
            .and_then(|s| s.trim_matches(|c| c == '\'' || c == '"').parse().ok())
            .ok_or_else(|| {
                ParserError::Transform(format!(
                    "{} schemaver variable has no parseable select value",
                    path.display()
                ))
            })?;
        Ok(Self { path, schema_version })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// Applies compiled stylesheets to incoming reports by shelling out to
/// `xsltproc`, one process per report (§4.3). No state is kept between
/// calls, so a single engine is shared freely across worker threads.
#[derive(Debug, Clone)]
pub struct XsltTransformEngine {
    xsltproc_path: PathBuf,
}

impl Default for XsltTransformEngine {
    fn default() -> Self {
        Self { xsltproc_path: PathBuf::from("xsltproc") }
    }
}

impl XsltTransformEngine {
    /// Uses a specific `xsltproc` binary instead of relying on `PATH`.
    pub fn with_binary(xsltproc_path: impl Into<PathBuf>) -> Self {
        Self { xsltproc_path: xsltproc_path.into() }
    }

    /// Runs `stylesheet` over `input_bytes`, passing every entry of
    /// `params` as an `xsltproc --stringparam`, and parses the resulting
    /// sqldata document. A non-zero exit or unparsable stdout maps to
    /// `ParserError::Transform` (§4.6 LOAD_XML failure path).
    pub fn apply(
        &self,
        stylesheet: &CompiledStylesheet,
        input_bytes: &[u8],
        params: &KeyValueBag,
    ) -> Result<XmlDoc, ParserError> {
        let mut cmd = Command::new(&self.xsltproc_path);
        for entry in params.iter() {
            cmd.arg("--stringparam").arg(&entry.key).arg(&entry.val);
        }
        cmd.arg(stylesheet.path()).arg("-");
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ParserError::Transform(format!("failed to spawn xsltproc: {e}")))?;

        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(input_bytes)
            .map_err(|e| ParserError::Transform(format!("failed to write xsltproc stdin: {e}")))?;

        let output = child
            .wait_with_output()
            .map_err(|e| ParserError::Transform(format!("failed to run xsltproc: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ParserError::Transform(format!(
                "xsltproc exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ParserError::Transform(format!("xsltproc output is not utf-8: {e}")))?;
        let doc = XmlDoc::parse(&stdout)?;

        let produced = sqldata::required_schema_version(&doc, doc.root())?;
        if produced != stylesheet.schema_version() {
            return Err(ParserError::Transform(format!(
                "stylesheet declares schema {} but produced a document declaring schema {}",
                stylesheet.schema_version(),
                produced
            )));
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_stylesheet(dir: &tempfile::TempDir, schemaver: &str) -> PathBuf {
        let path = dir.path().join("xmlparser.xsl");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0">
                <xsl:variable name="schemaver" select="'{schemaver}'"/>
               </xsl:stylesheet>"#
        )
        .unwrap();
        path
    }

    #[test]
    fn compile_reads_schema_version_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_stylesheet(&dir, "3");
        let compiled = CompiledStylesheet::compile(&path).unwrap();
        assert_eq!(compiled.schema_version(), 3);
    }

    #[test]
    fn compile_rejects_missing_file() {
        assert!(CompiledStylesheet::compile("/nonexistent/xmlparser.xsl").is_err());
    }

    #[test]
    fn compile_rejects_stylesheet_without_schemaver() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xsl");
        std::fs::write(
            &path,
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0"/>"#,
        )
        .unwrap();
        assert!(CompiledStylesheet::compile(&path).is_err());
    }
}
