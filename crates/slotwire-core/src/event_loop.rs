//! Thread-local event loop.
//!
//! # Design
//!
//! Each thread has one [`EventLoop`], reached through
//! [`EventLoop::current`]. It owns three queues:
//!
//! | Queue           | Filled by                          | Drained by            |
//! |-----------------|------------------------------------|-----------------------|
//! | timer deadlines | [`Timer::start`]                   | firing due timers     |
//! | posted events   | [`EventLoop::post_event`]          | [`send_event`]        |
//! | deferred delete | [`EventLoop::delete_later`], slots | dropping adopted objects |
//!
//! One call to [`EventLoop::process_events`] drains each queue once, in
//! that order. Objects are only deleted by the loop if it owns them (see
//! [`EventLoop::adopt`]).
//!
//! # Failure Modes
//!
//! - **Repeating timers never go idle**: [`EventLoop::exec`] returns only
//!   after [`EventLoop::quit`] while a repeating timer is active.

use std::cell::{Cell, RefCell};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::rc::{Rc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use tracing::{debug, trace};
use web_time::Instant;

use crate::connection::{Delivery, Receiver, SlotId};
use crate::event::{Event, send_event};
use crate::meta::MethodIndex;
use crate::object::{Object, ObjectId, WeakObject};
use crate::timer::Timer;

const DELETE_LATER_SLOT: SlotId = SlotId(0);

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    timer: Weak<Timer>,
    generation: u64,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

struct LoopInner {
    id: ObjectId,
    timers: RefCell<BinaryHeap<Reverse<TimerEntry>>>,
    seq: Cell<u64>,
    adopted: RefCell<AHashMap<ObjectId, Rc<dyn Object>>>,
    pending_delete: RefCell<Vec<ObjectId>>,
    posted: RefCell<VecDeque<(WeakObject, Event)>>,
    quit: Cell<bool>,
}

impl Receiver for LoopInner {
    fn receive(&self, slot: SlotId, delivery: &Delivery<'_>) {
        if slot == DELETE_LATER_SLOT {
            self.pending_delete.borrow_mut().push(delivery.sender);
        }
    }
}

thread_local! {
    static CURRENT: EventLoop = EventLoop::new();
}

/// Handle to the calling thread's event loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    fn new() -> Self {
        Self {
            inner: Rc::new(LoopInner {
                id: ObjectId::next(),
                timers: RefCell::new(BinaryHeap::new()),
                seq: Cell::new(0),
                adopted: RefCell::new(AHashMap::new()),
                pending_delete: RefCell::new(Vec::new()),
                posted: RefCell::new(VecDeque::new()),
                quit: Cell::new(false),
            }),
        }
    }

    /// The loop of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    pub(crate) fn schedule_timer(&self, timer: Weak<Timer>, deadline: Instant, generation: u64) {
        let seq = self.inner.seq.get();
        self.inner.seq.set(seq + 1);
        self.inner.timers.borrow_mut().push(Reverse(TimerEntry {
            deadline,
            seq,
            timer,
            generation,
        }));
    }

    // -- ownership ----------------------------------------------------------

    /// Keep `object` alive until it is deleted through the loop.
    pub fn adopt(&self, object: Rc<dyn Object>) {
        let id = object.core().id();
        self.inner.adopted.borrow_mut().insert(id, object);
    }

    #[must_use]
    pub fn owns(&self, id: ObjectId) -> bool {
        self.inner.adopted.borrow().contains_key(&id)
    }

    /// Queue an adopted object for deletion on the next iteration.
    ///
    /// Returns false if the loop does not own `id`.
    pub fn delete_later(&self, id: ObjectId) -> bool {
        if !self.owns(id) {
            return false;
        }
        self.inner.pending_delete.borrow_mut().push(id);
        true
    }

    /// Delete `object` later whenever it emits `signal`.
    pub fn connect_delete_later(&self, object: &dyn Object, signal: MethodIndex) -> bool {
        let receiver: Weak<dyn Receiver> = Rc::downgrade(&self.inner) as Weak<dyn Receiver>;
        object
            .core()
            .connect(signal, receiver, self.inner.id, DELETE_LATER_SLOT)
    }

    // -- events -------------------------------------------------------------

    /// Queue `event` for delivery to `target` on the next iteration.
    pub fn post_event(&self, target: &dyn Object, event: Event) {
        self.inner
            .posted
            .borrow_mut()
            .push_back((target.core().weak(), event));
    }

    // -- running ------------------------------------------------------------

    /// Run one iteration: fire due timers, deliver posted events, then
    /// delete queued objects. Returns the number of items processed.
    pub fn process_events(&self) -> usize {
        let mut processed = 0;

        let now = Instant::now();
        let due: Vec<TimerEntry> = {
            let mut timers = self.inner.timers.borrow_mut();
            let mut due = Vec::new();
            while timers.peek().is_some_and(|Reverse(entry)| entry.deadline <= now) {
                if let Some(Reverse(entry)) = timers.pop() {
                    due.push(entry);
                }
            }
            due
        };
        for entry in due {
            if let Some(timer) = entry.timer.upgrade()
                && timer.fire(entry.generation)
            {
                processed += 1;
            }
        }

        let posted: Vec<(WeakObject, Event)> = self.inner.posted.borrow_mut().drain(..).collect();
        for (target, event) in posted {
            if let Some(target) = target.upgrade() {
                send_event(&*target, &event);
                processed += 1;
            }
        }

        let doomed: Vec<ObjectId> = std::mem::take(&mut *self.inner.pending_delete.borrow_mut());
        for id in doomed {
            let object = self.inner.adopted.borrow_mut().remove(&id);
            if let Some(object) = object {
                trace!(object = %id, "deferred delete");
                drop(object);
                processed += 1;
            }
        }

        processed
    }

    /// Whether any timer, posted event or deferred delete is queued.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.inner.timers.borrow().is_empty()
            || !self.inner.posted.borrow().is_empty()
            || !self.inner.pending_delete.borrow().is_empty()
    }

    fn has_immediate_work(&self) -> bool {
        !self.inner.posted.borrow().is_empty() || !self.inner.pending_delete.borrow().is_empty()
    }

    /// Earliest queued timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .timers
            .borrow()
            .peek()
            .map(|Reverse(entry)| entry.deadline)
    }

    /// Run until [`quit`](Self::quit) is called or nothing is left to do.
    pub fn exec(&self) {
        loop {
            if self.inner.quit.replace(false) {
                debug!("event loop quit");
                return;
            }
            self.process_events();
            if !self.has_pending_work() {
                debug!("event loop idle");
                return;
            }
            self.sleep_until(None);
        }
    }

    /// Run for `duration`, then return even if work remains.
    pub fn run_for(&self, duration: Duration) {
        let end = Instant::now() + duration;
        loop {
            if self.inner.quit.replace(false) {
                return;
            }
            self.process_events();
            if Instant::now() >= end {
                return;
            }
            self.sleep_until(Some(end));
        }
    }

    /// Stop the innermost [`exec`](Self::exec) or [`run_for`](Self::run_for).
    pub fn quit(&self) {
        self.inner.quit.set(true);
    }

    fn sleep_until(&self, limit: Option<Instant>) {
        if self.has_immediate_work() {
            return;
        }
        let wake = match (self.next_deadline(), limit) {
            (Some(deadline), Some(limit)) => deadline.min(limit),
            (Some(deadline), None) => deadline,
            (None, Some(limit)) => limit,
            (None, None) => return,
        };
        let now = Instant::now();
        if wake > now {
            std::thread::sleep(wake - now);
        }
    }
}
