//! Keyed, cancellable timers
//!
//! Every timer the client runs lives here under a [`TimerKey`]. Starting a
//! key aborts whatever was running under it, so there is never more than one
//! live timer per key.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

use crate::config::MAX_TIMER_PERIOD;
use crate::schedule::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Heartbeat,
    Liveness,
    Reconnect,
    Task(TaskId),
}

struct Entry {
    seq: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slots {
    next_seq: u64,
    entries: HashMap<TimerKey, Entry>,
}

impl Slots {
    /// Drop the entry only if it still belongs to the timer that asks
    fn release(&mut self, key: TimerKey, seq: u64) {
        if self.entries.get(&key).is_some_and(|e| e.seq == seq) {
            self.entries.remove(&key);
        }
    }
}

fn release(slots: &Weak<Mutex<Slots>>, key: TimerKey, seq: u64) {
    if let Some(slots) = slots.upgrade() {
        slots.lock().release(key, seq);
    }
}

#[derive(Clone, Default)]
pub struct Timers {
    slots: Arc<Mutex<Slots>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` every `period`, first one `period` from now
    ///
    /// Returning `ControlFlow::Break` from `tick` stops the timer. Periods
    /// beyond [`MAX_TIMER_PERIOD`] are clamped.
    pub fn every<F>(&self, key: TimerKey, period: Duration, mut tick: F)
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let period = period.min(MAX_TIMER_PERIOD);
        let slots = Arc::downgrade(&self.slots);
        self.install(key, move |seq| async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().is_break() {
                    release(&slots, key, seq);
                    trace!("Timer {:?} stopped itself", key);
                    return;
                }
            }
        });
    }

    /// Run `action` once after `delay`
    ///
    /// The key is released before `action` starts, so the action may
    /// schedule the same key again.
    pub fn once<F, Fut>(&self, key: TimerKey, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = delay.min(MAX_TIMER_PERIOD);
        let slots = Arc::downgrade(&self.slots);
        self.install(key, move |seq| async move {
            tokio::time::sleep(delay).await;
            release(&slots, key, seq);
            action().await;
        });
    }

    fn install<F, Fut>(&self, key: TimerKey, make: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        slots.next_seq += 1;
        let seq = slots.next_seq;

        if let Some(old) = slots.entries.remove(&key) {
            old.handle.abort();
        }
        // Spawned under the lock: the timer can't release its slot before
        // the slot exists.
        let handle = tokio::spawn(make(seq));
        slots.entries.insert(key, Entry { seq, handle });
        trace!("Timer {:?} started", key);
    }

    /// Abort the timer under `key`; true if one was live
    pub fn cancel(&self, key: TimerKey) -> bool {
        match self.slots.lock().entries.remove(&key) {
            Some(entry) => {
                entry.handle.abort();
                !entry.handle.is_finished()
            }
            None => false,
        }
    }

    /// Abort every timer whose key matches
    pub fn cancel_where(&self, pred: impl Fn(&TimerKey) -> bool) -> usize {
        let mut slots = self.slots.lock();
        let keys: Vec<TimerKey> = slots.entries.keys().filter(|k| pred(k)).copied().collect();
        for key in &keys {
            if let Some(entry) = slots.entries.remove(key) {
                entry.handle.abort();
            }
        }
        keys.len()
    }

    pub fn cancel_all(&self) {
        for (_, entry) in self.slots.lock().entries.drain() {
            entry.handle.abort();
        }
    }

    pub fn is_active(&self, key: TimerKey) -> bool {
        self.slots
            .lock()
            .entries
            .get(&key)
            .is_some_and(|e| !e.handle.is_finished())
    }

    /// Number of live timers
    pub fn active_count(&self) -> usize {
        self.slots
            .lock()
            .entries
            .values()
            .filter(|e| !e.handle.is_finished())
            .count()
    }

    /// Live keys, for diagnostics and tests
    pub fn active_keys(&self) -> Vec<TimerKey> {
        self.slots
            .lock()
            .entries
            .iter()
            .filter(|(_, e)| !e.handle.is_finished())
            .map(|(k, _)| *k)
            .collect()
    }
}

impl Drop for Slots {
    fn drop(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_first_tick_after_period() {
        let timers = Timers::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();

        timers.every(TimerKey::Heartbeat, Duration::from_millis(1000), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        advance(999).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        advance(2).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        advance(1000).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous() {
        let timers = Timers::new();
        let ticks = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let counter = ticks.clone();
            timers.every(TimerKey::Liveness, Duration::from_millis(100), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            });
        }

        assert_eq!(timers.active_count(), 1);
        advance(150).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let timers = Timers::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();

        timers.every(TimerKey::Heartbeat, Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        assert!(timers.cancel(TimerKey::Heartbeat));
        assert!(!timers.cancel(TimerKey::Heartbeat));

        advance(500).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert!(!timers.is_active(TimerKey::Heartbeat));
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_stops_timer() {
        let timers = Timers::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();

        timers.every(TimerKey::Heartbeat, Duration::from_millis(100), move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        advance(1000).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!timers.is_active(TimerKey::Heartbeat));
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_can_reschedule_itself() {
        let timers = Timers::new();
        let fired = Arc::new(AtomicU32::new(0));

        fn arm(timers: Timers, fired: Arc<AtomicU32>) {
            let again = timers.clone();
            timers.once(TimerKey::Reconnect, Duration::from_millis(100), move || async move {
                if fired.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                    arm(again, fired);
                }
            });
        }
        arm(timers.clone(), fired.clone());

        advance(1000).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(!timers.is_active(TimerKey::Reconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_period_keeps_timer_alive() {
        let timers = Timers::new();
        timers.every(TimerKey::Liveness, Duration::MAX, || ControlFlow::Continue(()));
        timers.once(TimerKey::Reconnect, Duration::MAX, || async {});

        advance(1000).await;
        assert!(timers.is_active(TimerKey::Liveness));
        assert!(timers.is_active(TimerKey::Reconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_where_tasks_only() {
        let timers = Timers::new();
        let a = TaskId::new();
        let b = TaskId::new();
        for key in [TimerKey::Heartbeat, TimerKey::Task(a), TimerKey::Task(b)] {
            timers.every(key, Duration::from_millis(100), || ControlFlow::Continue(()));
        }

        let cancelled = timers.cancel_where(|k| matches!(k, TimerKey::Task(_)));
        assert_eq!(cancelled, 2);
        assert_eq!(timers.active_keys(), vec![TimerKey::Heartbeat]);

        timers.cancel_all();
        assert_eq!(timers.active_count(), 0);
    }
}
