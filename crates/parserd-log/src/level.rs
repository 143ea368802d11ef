//! Syslog-style log level ordering (§4.1): `Emerg` (0) is highest priority,
//! `Debug` (7) is lowest. A message is dropped before formatting if its
//! level is numerically greater than the configured verbosity.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "emerg" | "emergency" => Self::Emerg,
            "alert" => Self::Alert,
            "crit" | "critical" => Self::Crit,
            "err" | "error" => Self::Err,
            "warning" | "warn" => Self::Warning,
            "notice" => Self::Notice,
            "info" => Self::Info,
            "debug" => Self::Debug,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_syslog_priority() {
        assert!(LogLevel::Emerg < LogLevel::Debug);
        assert!(LogLevel::Err < LogLevel::Warning);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("bogus"), None);
    }
}
