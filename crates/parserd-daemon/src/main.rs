//! Startup wiring (§6): CLI → `.conf` → merged `KeyValueBag` → `Config`,
//! then `RuntimeContext`/`LogSink`/worker pool construction, optional
//! daemonization, and the control loop. Exit codes: 0 normal shutdown, 1
//! configuration error, 2 database connection error at startup, 9
//! out-of-memory, 10 stylesheet load or schema-version mismatch.

mod cli;
mod conf;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser as _;
use daemonize::Daemonize;

use parserd_core::{Config, RuntimeContext};
use parserd_db::DbConnection;
use parserd_log::{DestinationSpec, LogLevel, LogSink};
use parserd_pipeline::{ControlLoop, WorkerPool};
use parserd_xml::{CompiledStylesheet, XsltTransformEngine};

const NOTIFY_CHANNEL: &str = "rteval_submq";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = cli::Cli::parse();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("rteval-parserd: {e:#}");
            return 1;
        }
    };

    if cli.daemon {
        if let Err(e) = daemonize(&cli) {
            eprintln!("rteval-parserd: failed to daemonize: {e:#}");
            return 1;
        }
    } else if let Some(pidfile) = &cli.pidfile {
        if let Err(e) = std::fs::write(pidfile, format!("{}\n", std::process::id())) {
            eprintln!("rteval-parserd: failed to write pidfile {}: {e}", pidfile.display());
            return 1;
        }
    }

    let log = match open_log(&cfg) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            eprintln!("rteval-parserd: failed to open log destination: {e}");
            return 1;
        }
    };

    log.info(format!("starting with {} worker thread(s), db={}:{}", cfg.threads, cfg.db_server, cfg.db_port));

    let stylesheet = match CompiledStylesheet::compile(&cfg.xsltfile) {
        Ok(s) => s,
        Err(e) => {
            log.emerg(format!("failed to load stylesheet {}: {e}", cfg.xsltfile.display()));
            log.close();
            return 10;
        }
    };

    let ctx = Arc::new(RuntimeContext::new());
    let cfg = Arc::new(cfg);

    let mut slots = Vec::with_capacity(cfg.threads);
    for thread_id in 0..cfg.threads {
        let conn = match open_validated_connection(&cfg, thread_id as u64, &stylesheet, &log) {
            Ok(conn) => conn,
            Err(code) => {
                log.close();
                return code;
            }
        };
        slots.push(parserd_pipeline::ThreadSlot {
            thread_id,
            conn,
            stylesheet: stylesheet.clone(),
            engine: XsltTransformEngine::default(),
            reportdir: cfg.reportdir.clone(),
        });
    }

    let queue_conn = match open_validated_connection(&cfg, cfg.threads as u64, &stylesheet, &log) {
        Ok(conn) => conn,
        Err(code) => {
            log.close();
            return code;
        }
    };

    let (dispatcher, pool) = WorkerPool::start(slots, Arc::clone(&cfg), Arc::clone(&ctx), Arc::clone(&log));

    ControlLoop::run(ctx, queue_conn, dispatcher, pool, log, NOTIFY_CHANNEL)
}

/// Opens a database session and checks it against the compiled stylesheet's
/// schema requirement ourselves, so a genuine connection failure (exit 2)
/// can be told apart from a schema mismatch (exit 10) — `DbConnection::connect`
/// is called with no required version here for exactly that reason.
fn open_validated_connection(
    cfg: &Config,
    id: u64,
    stylesheet: &CompiledStylesheet,
    log: &LogSink,
) -> Result<DbConnection, i32> {
    let conn = DbConnection::connect(cfg, id, 0).map_err(|e| {
        log.emerg(format!("database connection {id} failed: {e}"));
        2
    })?;
    if conn.schema_version() < stylesheet.schema_version() {
        log.emerg(format!(
            "stylesheet {} requires schema {} but database reports {}",
            stylesheet.path().display(),
            stylesheet.schema_version(),
            conn.schema_version()
        ));
        return Err(10);
    }
    Ok(conn)
}

/// Loads and merges the three configuration layers (§3): built-in defaults,
/// the `.conf` section, then CLI overrides, each overlaid with
/// `KeyValueBag::merge_overlay`.
fn load_config(cli: &cli::Cli) -> anyhow::Result<Config> {
    let bootstrap_log = LogSink::open(DestinationSpec::Console, LogLevel::Warning)
        .context("opening bootstrap console log")?;

    let mut bag = Config::defaults();
    // Core's static default ("4") is a fallback; the daemon's actual default
    // tracks the host, overridable by the `.conf` section or `--threads`.
    bag.update("threads", num_cpus::get().to_string(), false);

    if cli.config.is_file() {
        let section = conf::read_section(&cli.config, &cli.section, &bootstrap_log)
            .with_context(|| format!("reading {}", cli.config.display()))?;
        bag.merge_overlay(&section, false);
    } else {
        bootstrap_log.warning(format!(
            "config file {} not found, using built-in defaults",
            cli.config.display()
        ));
    }

    let mut overrides = parserd_core::KeyValueBag::new(2);
    for (key, value) in cli.overrides() {
        overrides.add(key, value);
    }
    bag.merge_overlay(&overrides, true);

    Config::from_bag(&bag).context("validating merged configuration")
}

fn open_log(cfg: &Config) -> std::io::Result<LogSink> {
    let level = LogLevel::parse(&cfg.loglevel).unwrap_or(LogLevel::Info);
    LogSink::open(DestinationSpec::parse(&cfg.log), level)
}

fn daemonize(cli: &cli::Cli) -> Result<(), daemonize::Error> {
    let mut d = Daemonize::new();
    if let Some(pidfile) = &cli.pidfile {
        d = d.pid_file(pidfile);
    }
    d.start()
}
