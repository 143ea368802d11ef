//! Typed view over the merged configuration [`KeyValueBag`] (§3 Configuration).
//!
//! `Config::from_bag` is the one place that validates and finalizes the
//! "first match wins" lookup behavior the bag allows (§9 Open Question):
//! duplicate keys across defaults, `.conf` section, and CLI are resolved at
//! this boundary, not re-litigated by every later reader.

use std::path::PathBuf;

use crate::error::ParserError;
use crate::kvbag::KeyValueBag;

#[derive(Debug, Clone)]
pub struct Config {
    pub datadir: PathBuf,
    pub reportdir: PathBuf,
    pub xsltfile: PathBuf,
    pub db_server: String,
    pub db_port: u16,
    pub db_username: String,
    pub db_password: String,
    pub database: String,
    pub threads: usize,
    pub max_report_size: u64,
    pub measurement_tables: Vec<String>,
    pub log: String,
    pub loglevel: String,
}

impl Config {
    /// Seed a bag with the documented defaults (§3). Callers overlay a
    /// `.conf` section and then CLI arguments on top of this with
    /// [`KeyValueBag::merge_overlay`] before calling [`Config::from_bag`].
    pub fn defaults() -> KeyValueBag {
        let mut bag = KeyValueBag::new(0);
        bag.add("datadir", "/var/lib/rteval/incoming");
        bag.add("reportdir", "/var/lib/rteval/reports");
        bag.add("xsltfile", "/usr/share/rteval-parserd/xmlparser.xsl");
        bag.add("db_server", "localhost");
        bag.add("db_port", "5432");
        bag.add("db_username", "rtevaldb");
        bag.add("db_password", "");
        bag.add("database", "rteval");
        bag.add("threads", "4");
        bag.add("max_report_size", "0");
        bag.add("measurement_tables", "cyclictest,kernel,hwlatdetect");
        bag.add("log", "syslog");
        bag.add("loglevel", "info");
        bag
    }

    pub fn from_bag(bag: &KeyValueBag) -> Result<Self, ParserError> {
        let get = |key: &str| -> Result<String, ParserError> {
            bag.get_value(key)
                .map(str::to_string)
                .ok_or_else(|| ParserError::Config(format!("missing required key: {key}")))
        };
        let threads: usize = get("threads")?
            .parse()
            .map_err(|_| ParserError::Config("threads must be a positive integer".into()))?;
        if threads < 1 {
            return Err(ParserError::Config("threads must be >= 1".into()));
        }
        let db_port: u16 = get("db_port")?
            .parse()
            .map_err(|_| ParserError::Config("db_port must be a 16-bit integer".into()))?;
        let max_report_size: u64 = get("max_report_size")?
            .parse()
            .map_err(|_| ParserError::Config("max_report_size must be a non-negative integer".into()))?;
        let measurement_tables = get("measurement_tables")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            datadir: PathBuf::from(get("datadir")?),
            reportdir: PathBuf::from(get("reportdir")?),
            xsltfile: PathBuf::from(get("xsltfile")?),
            db_server: get("db_server")?,
            db_port,
            db_username: get("db_username")?,
            db_password: get("db_password")?,
            database: get("database")?,
            threads,
            max_report_size,
            measurement_tables,
            log: get("log")?,
            loglevel: get("loglevel")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_cleanly() {
        let bag = Config::defaults();
        let cfg = Config::from_bag(&bag).unwrap();
        assert_eq!(cfg.threads, 4);
        assert_eq!(cfg.max_report_size, 0);
        assert_eq!(cfg.measurement_tables, vec!["cyclictest", "kernel", "hwlatdetect"]);
    }

    #[test]
    fn cli_overlay_wins_over_default() {
        let mut bag = Config::defaults();
        let mut cli = KeyValueBag::new(1);
        cli.add("threads", "16");
        bag.merge_overlay(&cli, true);
        let cfg = Config::from_bag(&bag).unwrap();
        assert_eq!(cfg.threads, 16);
    }

    #[test]
    fn rejects_zero_threads() {
        let mut bag = Config::defaults();
        bag.update("threads", "0", false);
        assert!(Config::from_bag(&bag).is_err());
    }
}
