//! Signal handling, thread accounting, and fatal-error escalation (§2
//! ControlLoop, §5). Shutdown is global and cooperative: in-flight jobs are
//! allowed to finish; no new jobs are claimed once the flag is set.

use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};

use parserd_core::RuntimeContext;
use parserd_db::DbConnection;
use parserd_log::LogSink;

use crate::pool::{Dispatcher, WorkerPool};
use crate::poller::QueuePoller;

pub struct ControlLoop;

impl ControlLoop {
    /// Registers SIGTERM/SIGINT handlers that set the shared shutdown
    /// flag, runs the poller to completion, waits for every worker to
    /// drain, and returns the process exit code: `0` for a clean shutdown,
    /// or the code of the first fatal error escalated by any component.
    pub fn run(
        ctx: Arc<RuntimeContext>,
        mut queue_conn: DbConnection,
        dispatcher: Dispatcher,
        pool: WorkerPool,
        log: Arc<LogSink>,
        listen_channel: &str,
    ) -> i32 {
        for &signal in &[SIGTERM, SIGINT] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&ctx.shutdown)) {
                log.err(&format!("ControlLoop: failed to register signal {signal}: {e}"));
            }
        }

        QueuePoller::run(&mut queue_conn, &dispatcher, &ctx, &log, listen_channel);
        drop(dispatcher);

        pool.join();
        ctx.active_workers.await_quiescence();

        let exit_code = match ctx.fatal() {
            Some(fatal) => {
                log.emerg(&format!("fatal error, exiting {}: {}", fatal.exit_code, fatal.message));
                fatal.exit_code
            }
            None => 0,
        };

        log.close();
        exit_code
    }
}
