//! The single runtime context value threaded through every component (§9):
//! shutdown flag, the two global mutexes, and the active-worker counter.
//! No component reaches for a hidden singleton instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Monotonic count of active worker threads, guarded the way the original
/// `thrcnt_mtx` guards `threadData_t.threadcount`. `ControlLoop` waits on
/// this to reach zero before closing the log sink.
#[derive(Default)]
pub struct ThreadCounter {
    count: Mutex<usize>,
    cvar: Condvar,
}

impl ThreadCounter {
    pub fn new() -> Self {
        Self { count: Mutex::new(0), cvar: Condvar::new() }
    }

    pub fn enter(&self) {
        let mut guard = self.count.lock().expect("thread counter mutex poisoned");
        *guard += 1;
    }

    pub fn exit(&self) {
        let mut guard = self.count.lock().expect("thread counter mutex poisoned");
        *guard -= 1;
        if *guard == 0 {
            self.cvar.notify_all();
        }
    }

    pub fn active(&self) -> usize {
        *self.count.lock().expect("thread counter mutex poisoned")
    }

    /// Block until no worker is active.
    pub fn await_quiescence(&self) {
        let guard = self.count.lock().expect("thread counter mutex poisoned");
        let _ = self.cvar.wait_while(guard, |count| *count > 0);
    }
}

/// RAII guard returned by [`ThreadCounter::enter_guard`], used so a worker
/// decrements the count on every exit path, including panics.
pub struct ThreadCounterGuard(Arc<ThreadCounter>);

impl Drop for ThreadCounterGuard {
    fn drop(&mut self) {
        self.0.exit();
    }
}

impl ThreadCounter {
    pub fn enter_guard(self: &Arc<Self>) -> ThreadCounterGuard {
        self.enter();
        ThreadCounterGuard(self.clone())
    }
}

/// An unrecoverable condition outside any single job — a fatal startup or
/// worker-pool error that should end the process with a specific exit code
/// once in-flight jobs have drained (ControlLoop "fatal-error escalation").
#[derive(Debug, Clone)]
pub struct FatalError {
    pub exit_code: i32,
    pub message: String,
}

pub struct RuntimeContext {
    pub shutdown: Arc<AtomicBool>,
    pub queue_mtx: Arc<Mutex<()>>,
    pub sysreg_mtx: Arc<Mutex<()>>,
    pub active_workers: Arc<ThreadCounter>,
    fatal: Mutex<Option<FatalError>>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            queue_mtx: Arc::new(Mutex::new(())),
            sysreg_mtx: Arc::new(Mutex::new(())),
            active_workers: Arc::new(ThreadCounter::new()),
            fatal: Mutex::new(None),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Records the first fatal error seen and requests shutdown. Later
    /// calls are ignored — the first cause wins the exit code.
    pub fn escalate(&self, exit_code: i32, message: impl Into<String>) {
        let mut slot = self.fatal.lock().expect("fatal error mutex poisoned");
        if slot.is_none() {
            *slot = Some(FatalError { exit_code, message: message.into() });
        }
        drop(slot);
        self.request_shutdown();
    }

    pub fn fatal(&self) -> Option<FatalError> {
        self.fatal.lock().expect("fatal error mutex poisoned").clone()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn quiescence_unblocks_when_last_worker_exits() {
        let ctx = RuntimeContext::new();
        let counter = ctx.active_workers.clone();
        counter.enter();
        let counter2 = counter.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            counter2.exit();
        });
        counter.await_quiescence();
        assert_eq!(counter.active(), 0);
        handle.join().unwrap();
    }

    #[test]
    fn shutdown_flag_round_trips() {
        let ctx = RuntimeContext::new();
        assert!(!ctx.is_shutdown());
        ctx.request_shutdown();
        assert!(ctx.is_shutdown());
    }

    #[test]
    fn escalate_requests_shutdown_and_keeps_first_cause() {
        let ctx = RuntimeContext::new();
        ctx.escalate(9, "allocation failure");
        ctx.escalate(2, "should not overwrite");
        assert!(ctx.is_shutdown());
        let fatal = ctx.fatal().unwrap();
        assert_eq!(fatal.exit_code, 9);
        assert_eq!(fatal.message, "allocation failure");
    }
}
