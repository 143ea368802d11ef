//! Command-line surface (§6): every flag is optional and overrides the
//! matching configuration key; unset flags leave the `.conf`/default value
//! in place.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rteval-parserd", about = "Ingests rteval summary reports into the database")]
pub struct Cli {
    /// Path to the INI-style configuration file.
    #[arg(long, default_value = "/etc/rteval-parserd.conf")]
    pub config: PathBuf,

    /// Section of the config file to read (§6: default section name "parser").
    #[arg(long, default_value = "parser")]
    pub section: String,

    /// Detach into the background after startup.
    #[arg(long)]
    pub daemon: bool,

    /// Write the daemon's PID to this file.
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Log destination: "syslog", "console", or a file path.
    #[arg(long)]
    pub log: Option<String>,

    /// Log verbosity: emerg, alert, crit, err, warning, notice, info, debug.
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Worker thread count (overrides `threads` in the config file).
    #[arg(long)]
    pub threads: Option<usize>,
}

impl Cli {
    /// Renders the flags the user actually set as config-key overrides
    /// (§3 Configuration: CLI layer overlays the `.conf` section).
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(log) = &self.log {
            out.push(("log", log.clone()));
        }
        if let Some(level) = &self.loglevel {
            out.push(("loglevel", level.clone()));
        }
        if let Some(threads) = self.threads {
            out.push(("threads", threads.to_string()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn unset_flags_produce_no_overrides() {
        let cli = Cli::parse_from(["rteval-parserd"]);
        assert!(cli.overrides().is_empty());
    }

    #[test]
    fn set_flags_produce_overrides() {
        let cli = Cli::parse_from(["rteval-parserd", "--threads", "8", "--loglevel", "debug"]);
        let overrides = cli.overrides();
        assert!(overrides.contains(&("threads", "8".to_string())));
        assert!(overrides.contains(&("loglevel", "debug".to_string())));
    }

    #[test]
    fn defaults_match_spec() {
        let cli = Cli::parse_from(["rteval-parserd"]);
        assert_eq!(cli.section, "parser");
        assert_eq!(cli.config, PathBuf::from("/etc/rteval-parserd.conf"));
        assert!(!cli.daemon);
    }
}
