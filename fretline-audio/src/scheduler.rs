//! One-shot timer registry.
//!
//! A single scheduler thread owns a min-heap of due instants plus a map
//! of pending callbacks. Callers interact through a control channel, so
//! `start` and `cancel` never block. An entry is removed from the map
//! before its callback runs, which makes firing at-most-once and lets a
//! late `cancel` degrade to a no-op instead of a race.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::paths;
use crate::telemetry::TimerTelemetry;

/// Lateness considered acceptable before a firing counts as an overrun.
const LATENESS_BUDGET_US: u32 = 2000;

/// Handle for a pending one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Ctl {
    Start {
        id: u64,
        due: Instant,
        delay: Duration,
        callback: Callback,
    },
    Cancel(u64),
    Shutdown,
}

/// Scheduler for cancellable one-shot callbacks.
pub struct Scheduler {
    ctl_tx: Sender<Ctl>,
    next_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (ctl_tx, ctl_rx) = unbounded();
        let worker = thread::Builder::new()
            .name("fretline-scheduler".to_string())
            .spawn(move || run_loop(ctl_rx))
            .ok();
        Self {
            ctl_tx,
            next_id: AtomicU64::new(1),
            worker: Mutex::new(worker),
        }
    }

    /// Arm a one-shot timer. The callback runs on the scheduler thread
    /// after `delay` unless the returned id is canceled first.
    pub fn start(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let due = Instant::now() + delay;
        let _ = self.ctl_tx.send(Ctl::Start {
            id,
            due,
            delay,
            callback: Box::new(callback),
        });
        TimerId(id)
    }

    /// Cancel a pending timer. Canceling an id that already fired or was
    /// already canceled is a no-op.
    pub fn cancel(&self, id: TimerId) {
        let _ = self.ctl_tx.send(Ctl::Cancel(id.0));
    }

    /// Drop all pending timers without firing them and join the
    /// scheduler thread.
    pub fn shutdown(&self) {
        let _ = self.ctl_tx.send(Ctl::Shutdown);
        if let Ok(mut guard) = self.worker.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.ctl_tx.send(Ctl::Shutdown);
    }
}

fn run_loop(ctl_rx: Receiver<Ctl>) {
    // The heap orders (due, id) pairs; canceled ids simply vanish from
    // the registry and their heap entries are discarded when they pop.
    let mut heap: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
    let mut registry: HashMap<u64, (Duration, Callback)> = HashMap::new();
    let mut telemetry = TimerTelemetry::new();

    loop {
        let next_due = heap.peek().map(|Reverse((due, _))| *due);
        let msg = match next_due {
            Some(due) => {
                let timeout = due.saturating_duration_since(Instant::now());
                match ctl_rx.recv_timeout(timeout) {
                    Ok(msg) => Some(msg),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match ctl_rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            },
        };

        match msg {
            Some(Ctl::Start { id, due, delay, callback }) => {
                registry.insert(id, (delay, callback));
                heap.push(Reverse((due, id)));
            }
            Some(Ctl::Cancel(id)) => {
                registry.remove(&id);
            }
            Some(Ctl::Shutdown) => break,
            None => {}
        }

        let now = Instant::now();
        while let Some(&Reverse((due, id))) = heap.peek() {
            if due > now {
                break;
            }
            heap.pop();
            // Remove before invoking: the entry is gone even if the
            // callback panics or re-enters cancel for its own id.
            if let Some((delay, callback)) = registry.remove(&id) {
                telemetry.record(delay, now.saturating_duration_since(due), LATENESS_BUDGET_US);
                if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    log::error!(target: "scheduler", "timer {} callback panicked", id);
                }
            }
        }
    }

    if paths::timer_log_enabled() {
        let summary = telemetry.take_summary();
        log::info!(
            target: "scheduler",
            "timer latency: {} samples, avg {}us max {}us p95 {}us overruns {} worst {:?}",
            summary.samples,
            summary.avg_late_us,
            summary.max_late_us,
            summary.p95_late_us,
            summary.overruns,
            summary.worst
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn recv_within(rx: &Receiver<u32>, ms: u64) -> Option<u32> {
        rx.recv_timeout(Duration::from_millis(ms)).ok()
    }

    #[test]
    fn fires_once_after_delay() {
        let scheduler = Scheduler::new();
        let (tx, rx) = unbounded();
        scheduler.start(Duration::from_millis(10), move || {
            let _ = tx.send(1);
        });
        assert_eq!(recv_within(&rx, 500), Some(1));
        assert!(recv_within(&rx, 50).is_none(), "timer fired twice");
        scheduler.shutdown();
    }

    #[test]
    fn cancel_before_fire_suppresses_callback() {
        let scheduler = Scheduler::new();
        let (tx, rx) = unbounded();
        let id = scheduler.start(Duration::from_millis(100), move || {
            let _ = tx.send(1);
        });
        scheduler.cancel(id);
        assert!(recv_within(&rx, 200).is_none(), "canceled timer fired");
        scheduler.shutdown();
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let scheduler = Scheduler::new();
        let (tx, rx) = unbounded();
        let id = scheduler.start(Duration::from_millis(5), move || {
            let _ = tx.send(1);
        });
        assert_eq!(recv_within(&rx, 500), Some(1));
        scheduler.cancel(id);
        scheduler.cancel(id);
        scheduler.shutdown();
    }

    #[test]
    fn ordering_follows_due_time_not_start_order() {
        let scheduler = Scheduler::new();
        let (tx, rx) = unbounded();
        let tx2 = tx.clone();
        scheduler.start(Duration::from_millis(60), move || {
            let _ = tx.send(2);
        });
        scheduler.start(Duration::from_millis(10), move || {
            let _ = tx2.send(1);
        });
        assert_eq!(recv_within(&rx, 500), Some(1));
        assert_eq!(recv_within(&rx, 500), Some(2));
        scheduler.shutdown();
    }

    #[test]
    fn panicking_callback_does_not_kill_later_timers() {
        let scheduler = Scheduler::new();
        let (tx, rx) = unbounded();
        scheduler.start(Duration::from_millis(5), || {
            panic!("boom");
        });
        scheduler.start(Duration::from_millis(20), move || {
            let _ = tx.send(1);
        });
        assert_eq!(recv_within(&rx, 500), Some(1));
        scheduler.shutdown();
    }

    #[test]
    fn shutdown_drops_pending_timers_without_firing() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        scheduler.start(Duration::from_millis(50), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.shutdown();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 0, "timer fired after shutdown");
    }

    #[test]
    fn ids_are_unique() {
        let scheduler = Scheduler::new();
        let a = scheduler.start(Duration::from_secs(10), || {});
        let b = scheduler.start(Duration::from_secs(10), || {});
        assert_ne!(a, b);
        scheduler.cancel(a);
        scheduler.cancel(b);
        scheduler.shutdown();
    }
}
