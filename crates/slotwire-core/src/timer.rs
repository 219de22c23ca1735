//! One-shot and repeating timers.
//!
//! A [`Timer`] is an ordinary object with a `timeout()` signal. Starting it
//! schedules a deadline on the thread's [`EventLoop`]; the loop raises
//! `timeout()` once the deadline has passed. Restarting or stopping a timer
//! invalidates any deadline already queued for it.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::OnceLock;
use std::time::Duration;

use tracing::{debug, trace};
use web_time::Instant;

use crate::event_loop::EventLoop;
use crate::meta::{MetaObject, MethodIndex};
use crate::object::{Object, ObjectCore};

pub struct Timer {
    core: ObjectCore,
    me: Weak<Timer>,
    interval: Cell<Duration>,
    single_shot: Cell<bool>,
    active: Cell<bool>,
    generation: Cell<u64>,
}

impl Timer {
    /// Signature of the expiry signal.
    pub const TIMEOUT: &'static str = "timeout()";

    fn meta() -> &'static MetaObject {
        static META: OnceLock<MetaObject> = OnceLock::new();
        META.get_or_init(|| {
            MetaObject::builder::<Timer>("Timer")
                .signal::<()>("timeout")
                .slot("start", |this: &Timer, (): ()| this.start())
                .slot("stop", |this: &Timer, (): ()| this.stop())
                .build()
        })
    }

    /// Index of `timeout()`.
    #[must_use]
    pub fn timeout_signal() -> MethodIndex {
        Self::meta()
            .index_of_signal(Self::TIMEOUT)
            .unwrap_or(MethodIndex::new(1))
    }

    /// A stopped, repeating timer with a zero interval.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            core: ObjectCore::new(me, Self::meta()),
            me: me.clone(),
            interval: Cell::new(Duration::ZERO),
            single_shot: Cell::new(false),
            active: Cell::new(false),
            generation: Cell::new(0),
        })
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval.get()
    }

    pub fn set_interval(&self, interval: Duration) {
        self.interval.set(interval);
    }

    #[must_use]
    pub fn is_single_shot(&self) -> bool {
        self.single_shot.get()
    }

    pub fn set_single_shot(&self, single_shot: bool) {
        self.single_shot.set(single_shot);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Start or restart the countdown.
    pub fn start(&self) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.active.set(true);
        let interval = self.interval.get();
        let Some(deadline) = Instant::now().checked_add(interval) else {
            debug!(timer = %self.core.id(), ?interval, "interval beyond the clock range; never fires");
            return;
        };
        trace!(timer = %self.core.id(), ?interval, "timer started");
        EventLoop::current().schedule_timer(self.me.clone(), deadline, generation);
    }

    pub fn stop(&self) {
        self.generation.set(self.generation.get() + 1);
        self.active.set(false);
    }

    /// Hand ownership to the event loop until the first timeout, after which
    /// the timer is deleted on the next loop iteration.
    pub fn delete_on_timeout(self: &Rc<Self>) {
        let event_loop = EventLoop::current();
        let object: Rc<dyn Object> = Rc::clone(self) as Rc<dyn Object>;
        event_loop.adopt(object);
        event_loop.connect_delete_later(&**self, Self::timeout_signal());
    }

    /// Expire the countdown started as `generation`.
    ///
    /// Returns false for a stale deadline (the timer was stopped or
    /// restarted since).
    pub(crate) fn fire(&self, generation: u64) -> bool {
        if !self.active.get() || generation != self.generation.get() {
            return false;
        }
        if self.single_shot.get() {
            self.active.set(false);
        } else {
            self.start();
        }
        debug!(timer = %self.core.id(), "timeout");
        self.core.emit(Self::timeout_signal(), &[]);
        true
    }
}

impl Object for Timer {
    fn core(&self) -> &ObjectCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn start_logs_the_full_interval() {
        let timer = Timer::new();
        timer.set_interval(Duration::from_millis(1500));
        timer.start();
        assert!(timer.is_active());
        assert!(logs_contain("interval=1.5s"));
        timer.stop();
    }

    #[test]
    fn interval_past_the_clock_range_never_fires() {
        let timer = Timer::new();
        timer.set_single_shot(true);
        timer.set_interval(Duration::MAX);
        timer.start();
        assert!(timer.is_active());
        let event_loop = EventLoop::current();
        event_loop.process_events();
        assert!(timer.is_active());
        assert!(!event_loop.has_pending_work());
    }
}
