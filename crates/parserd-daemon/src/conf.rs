//! Reads the INI-style `.conf` file (§6): `[section]` headers, `key = value`
//! pairs, `#`/`;` comments (handled by the `ini` crate itself), unknown keys
//! warned about and otherwise ignored.

use std::path::Path;

use ini::Ini;

use parserd_core::KeyValueBag;
use parserd_log::LogSink;

const RECOGNIZED_KEYS: &[&str] = &[
    "datadir",
    "reportdir",
    "xsltfile",
    "db_server",
    "db_port",
    "db_username",
    "db_password",
    "database",
    "threads",
    "max_report_size",
    "measurement_tables",
    "log",
    "loglevel",
];

/// Reads `section` of `path` into a bag, one entry per recognized key found.
/// A key outside [`RECOGNIZED_KEYS`] is logged as a warning and skipped.
pub fn read_section(path: &Path, section: &str, log: &LogSink) -> Result<KeyValueBag, ini::Error> {
    let ini = Ini::load_from_file(path)?;
    let mut bag = KeyValueBag::new(1);

    let Some(props) = ini.section(Some(section)) else {
        log.warning(format!("config file {} has no [{section}] section", path.display()));
        return Ok(bag);
    };

    for (key, value) in props.iter() {
        if RECOGNIZED_KEYS.contains(&key) {
            bag.add(key, value);
        } else {
            log.warning(format!(
                "config file {} [{section}]: ignoring unrecognized key '{key}'",
                path.display()
            ));
        }
    }
    Ok(bag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parserd_log::{DestinationSpec, LogLevel};

    fn silent_log(dir: &tempfile::TempDir) -> LogSink {
        LogSink::open(DestinationSpec::File(dir.path().join("log")), LogLevel::Debug).unwrap()
    }

    #[test]
    fn reads_recognized_keys_from_named_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parserd.conf");
        std::fs::write(
            &path,
            "[parser]\n# a comment\nthreads = 8\ndb_server = db.example.com\nbogus = ignored\n",
        )
        .unwrap();

        let bag = read_section(&path, "parser", &silent_log(&dir)).unwrap();
        assert_eq!(bag.get_value("threads"), Some("8"));
        assert_eq!(bag.get_value("db_server"), Some("db.example.com"));
        assert_eq!(bag.get_value("bogus"), None);
    }

    #[test]
    fn missing_section_yields_empty_bag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parserd.conf");
        std::fs::write(&path, "[other]\nthreads = 2\n").unwrap();

        let bag = read_section(&path, "parser", &silent_log(&dir)).unwrap();
        assert_eq!(bag.count(), 0);
    }
}
