//! Consumes the database notification stream and feeds claimed jobs to the
//! dispatcher (§4.8). The database NOTIFY is edge-triggered, so after every
//! wakeup the poller drains every currently eligible row before going back
//! to sleep — rows may have been inserted before NOTIFY was last emitted.

use parserd_core::RuntimeContext;
use parserd_db::{DbConnection, NotificationOutcome};
use parserd_log::LogSink;

use crate::pool::Dispatcher;

pub struct QueuePoller;

impl QueuePoller {
    /// Runs until shutdown is observed, then returns so the caller can drop
    /// `dispatcher` and let the worker pool drain.
    pub fn run(
        conn: &mut DbConnection,
        dispatcher: &Dispatcher,
        ctx: &RuntimeContext,
        log: &LogSink,
        listen_channel: &str,
    ) {
        if let Err(e) = conn.listen(listen_channel) {
            ctx.escalate(2, format!("QueuePoller: failed to LISTEN {listen_channel}: {e}"));
            return;
        }

        loop {
            if ctx.is_shutdown() {
                return;
            }
            match conn.wait_notification(&|| ctx.is_shutdown()) {
                Ok(NotificationOutcome::Shutdown) => return,
                Ok(NotificationOutcome::HasData) => drain_queue(conn, dispatcher, ctx, log),
                Err(e) => log.err(&format!("QueuePoller: notification wait failed: {e}")),
            }
        }
    }
}

fn drain_queue(conn: &mut DbConnection, dispatcher: &Dispatcher, ctx: &RuntimeContext, log: &LogSink) {
    loop {
        let claimed = {
            let _guard = ctx.queue_mtx.lock().expect("queue mutex poisoned");
            conn.get_submissionqueue_job()
        };
        match claimed {
            Ok(Some(job)) => {
                if dispatcher.send(job).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                log.err(&format!("QueuePoller: claiming next job failed: {e}"));
                return;
            }
        }
    }
}
