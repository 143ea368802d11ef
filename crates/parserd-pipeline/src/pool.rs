//! Fixed-size worker pool and job dispatch (§4.7): one DbConnection and one
//! compiled stylesheet per worker, jobs delivered over a bounded channel
//! sized to the pool, blocking send and receive on both ends.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use parserd_core::{Config, Job, RuntimeContext};
use parserd_db::DbConnection;
use parserd_log::LogSink;
use parserd_xml::{CompiledStylesheet, XsltTransformEngine};

use crate::pipeline;

/// Per-worker context (§3 ThreadSlot): everything one worker thread owns
/// for its whole lifetime, scoped so release on every exit path — normal
/// or panic — is just a matter of the thread function returning.
pub struct ThreadSlot {
    pub thread_id: usize,
    pub conn: DbConnection,
    pub stylesheet: CompiledStylesheet,
    pub engine: XsltTransformEngine,
    pub reportdir: PathBuf,
}

/// The sending half of the job channel. Dropping it signals every worker
/// to exit once the channel drains (§4.7).
pub struct Dispatcher {
    sender: SyncSender<Job>,
}

impl Dispatcher {
    /// Blocking send; fails only once every worker has exited and the
    /// channel's single receiver has been dropped.
    pub fn send(&self, job: Job) -> Result<(), Job> {
        self.sender.send(job).map_err(|e| e.0)
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns one thread per slot in `slots`. The channel's capacity is the
    /// number of workers, one slot per worker (§4.7).
    pub fn start(
        slots: Vec<ThreadSlot>,
        cfg: Arc<Config>,
        ctx: Arc<RuntimeContext>,
        log: Arc<LogSink>,
    ) -> (Dispatcher, Self) {
        let (sender, receiver) = mpsc::sync_channel::<Job>(slots.len().max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = slots
            .into_iter()
            .map(|slot| {
                let receiver = Arc::clone(&receiver);
                let cfg = Arc::clone(&cfg);
                let ctx = Arc::clone(&ctx);
                let log = Arc::clone(&log);
                thread::spawn(move || worker_loop(slot, &receiver, &cfg, &ctx, &log))
            })
            .collect();

        (Dispatcher { sender }, WorkerPool { handles })
    }

    /// Blocks until every worker thread has exited (§4.7 graceful drain).
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    mut slot: ThreadSlot,
    receiver: &Arc<Mutex<Receiver<Job>>>,
    cfg: &Config,
    ctx: &Arc<RuntimeContext>,
    log: &LogSink,
) {
    loop {
        let job = {
            let rx = receiver.lock().expect("worker channel mutex poisoned");
            rx.recv()
        };
        let Ok(job) = job else {
            // Sender dropped and the channel is drained: shutdown.
            return;
        };

        // A job already sitting in the channel when shutdown was signaled
        // must not be processed (§4.7, §8 scenario 6) — only a job pulled
        // before the flag was set gets to run to completion.
        if ctx.is_shutdown() {
            log.info(&format!(
                "worker {}: discarding job {} queued before shutdown",
                slot.thread_id, job.submid
            ));
            continue;
        }

        let _guard = ctx.active_workers.enter_guard();

        if !slot.conn.ping() {
            log.err(&format!(
                "worker {}: database connection unresponsive before job {}",
                slot.thread_id, job.submid
            ));
        }

        pipeline::process_job(
            &job,
            &mut slot.conn,
            &slot.engine,
            &slot.stylesheet,
            &slot.reportdir,
            cfg,
            ctx,
            log,
        );
    }
}
