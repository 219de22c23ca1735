//! Signal connection bookkeeping.
//!
//! A connection routes one signal of a sender to one numbered slot of a
//! [`Receiver`]. The sender keeps its connections in a [`ConnectionList`];
//! receivers are held weakly and entries whose receiver is gone are pruned
//! the next time the signal is emitted.
//!
//! # Failure Modes
//!
//! - **Disconnect during emission**: an emission works on a snapshot of the
//!   list, but every entry carries an `active` flag that `disconnect` clears,
//!   so a connection removed mid-emission is skipped for the remainder of it.
//! - **Receiver dropped during emission**: its weak handle no longer
//!   upgrades and later deliveries are skipped.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::meta::MethodIndex;
use crate::object::ObjectId;

/// Receiver-defined slot number a connection delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One signal emission, as seen by a receiver.
#[derive(Clone, Copy)]
pub struct Delivery<'a> {
    pub sender: ObjectId,
    pub signal: MethodIndex,
    /// Raw payload, one slot per declared signal parameter.
    pub args: &'a [&'a dyn Any],
}

impl fmt::Debug for Delivery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("sender", &self.sender)
            .field("signal", &self.signal)
            .field("args", &self.args.len())
            .finish()
    }
}

/// Target of signal connections.
pub trait Receiver {
    /// Called synchronously from the sender's emission.
    fn receive(&self, slot: SlotId, delivery: &Delivery<'_>);
}

pub(crate) struct ConnectionEntry {
    pub(crate) signal: MethodIndex,
    pub(crate) receiver: Weak<dyn Receiver>,
    pub(crate) receiver_id: ObjectId,
    pub(crate) slot: SlotId,
    active: Cell<bool>,
}

impl ConnectionEntry {
    pub(crate) fn is_active(&self) -> bool {
        self.active.get() && self.receiver.strong_count() > 0
    }
}

#[derive(Default)]
pub(crate) struct ConnectionList {
    entries: Vec<Rc<ConnectionEntry>>,
}

impl ConnectionList {
    pub(crate) fn push(
        &mut self,
        signal: MethodIndex,
        receiver: Weak<dyn Receiver>,
        receiver_id: ObjectId,
        slot: SlotId,
    ) {
        self.entries.push(Rc::new(ConnectionEntry {
            signal,
            receiver,
            receiver_id,
            slot,
            active: Cell::new(true),
        }));
    }

    /// Remove entries to `receiver_id`; `None` matches any signal or slot.
    pub(crate) fn remove_matching(
        &mut self,
        signal: Option<MethodIndex>,
        receiver_id: ObjectId,
        slot: Option<SlotId>,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let hit = entry.receiver_id == receiver_id
                && signal.is_none_or(|s| s == entry.signal)
                && slot.is_none_or(|s| s == entry.slot);
            if hit {
                entry.active.set(false);
            }
            !hit
        });
        before - self.entries.len()
    }

    /// Snapshot of live entries for `signal`, pruning dead receivers.
    pub(crate) fn matching(&mut self, signal: MethodIndex) -> Vec<Rc<ConnectionEntry>> {
        self.entries.retain(|entry| entry.receiver.strong_count() > 0);
        self.entries
            .iter()
            .filter(|entry| entry.signal == signal)
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, signal: MethodIndex) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.signal == signal && entry.is_active())
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_active()).count()
    }
}

// ---------------------------------------------------------------------------
// Current sender
// ---------------------------------------------------------------------------

/// The emission that triggered the slot currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderInfo {
    pub sender: ObjectId,
    pub signal: MethodIndex,
}

thread_local! {
    static SENDERS: RefCell<Vec<SenderInfo>> = const { RefCell::new(Vec::new()) };
}

/// Sender and signal of the innermost delivery running on this thread.
#[must_use]
pub fn current_sender() -> Option<SenderInfo> {
    SENDERS
        .try_with(|stack| stack.borrow().last().copied())
        .ok()
        .flatten()
}

/// Marks a delivery as in progress for [`current_sender`].
pub(crate) struct SenderScope(());

impl SenderScope {
    pub(crate) fn enter(info: SenderInfo) -> Self {
        let _ = SENDERS.try_with(|stack| stack.borrow_mut().push(info));
        Self(())
    }
}

impl Drop for SenderScope {
    fn drop(&mut self) {
        let _ = SENDERS.try_with(|stack| stack.borrow_mut().pop());
    }
}
