#![forbid(unsafe_code)]

//! Objects, identity and weak handles.
//!
//! # Design
//!
//! An object is any `'static` type implementing [`Object`], owned through an
//! `Rc` and embedding an [`ObjectCore`]. The core carries what the dispatch
//! layer needs from the object without knowing its concrete type:
//!
//! - a process-unique [`ObjectId`],
//! - the class's [`MetaObject`],
//! - its outgoing signal connections,
//! - the event filters installed on it,
//! - a weak handle to the owning `Rc` (set up through `Rc::new_cyclic`).
//!
//! # Invariants
//!
//! 1. Dropping the core raises `destroyed(ObjectId)` exactly once.
//! 2. By the time `destroyed` is delivered, no [`WeakObject`] or
//!    [`ObjectPtr`] to the object upgrades any more.
//! 3. Connections and filters hold receivers weakly; an object never keeps
//!    its observers alive.
//!
//! # Failure Modes
//!
//! - **Re-entrant connect from a slot**: allowed. Emission snapshots the
//!   connection list, so connections made during an emission first fire on
//!   the next one.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{trace, warn};

use crate::connection::{
    ConnectionList, Delivery, Receiver, SenderInfo, SenderScope, SlotId,
};
use crate::event::{Event, EventFilter};
use crate::meta::{MetaObject, MethodIndex, MethodKind};

/// Process-unique object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Upcast to `&dyn Any`, available on every object.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An object that can send signals and receive events.
pub trait Object: AsAny {
    fn core(&self) -> &ObjectCore;

    /// Normal delivery of an event that no filter consumed.
    ///
    /// Returns whether the event was handled.
    fn event(&self, _event: &Event) -> bool {
        false
    }
}

impl dyn Object {
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.core().id()
    }

    #[must_use]
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

// ---------------------------------------------------------------------------
// ObjectCore
// ---------------------------------------------------------------------------

struct FilterEntry {
    owner: ObjectId,
    filter: Weak<dyn EventFilter>,
}

/// State shared by every object; embed one per object.
pub struct ObjectCore {
    id: ObjectId,
    meta: &'static MetaObject,
    this: Weak<dyn Object>,
    name: RefCell<String>,
    connections: RefCell<ConnectionList>,
    filters: RefCell<Vec<FilterEntry>>,
}

impl ObjectCore {
    /// Core for the object under construction in `Rc::new_cyclic`.
    #[must_use]
    pub fn new<T: Object>(this: &Weak<T>, meta: &'static MetaObject) -> Self {
        let this: Weak<dyn Object> = this.clone();
        Self {
            id: ObjectId::next(),
            meta,
            this,
            name: RefCell::new(String::new()),
            connections: RefCell::new(ConnectionList::default()),
            filters: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub const fn meta_object(&self) -> &'static MetaObject {
        self.meta
    }

    #[must_use]
    pub fn object_name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_object_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = name.into();
    }

    /// Untyped weak handle to the owning object.
    #[must_use]
    pub fn weak(&self) -> WeakObject {
        WeakObject {
            ptr: self.this.clone(),
            id: self.id,
        }
    }

    // -- connections --------------------------------------------------------

    /// Route `signal` to `slot` of `receiver`.
    ///
    /// Returns false if `signal` is not a signal of this class.
    pub fn connect(
        &self,
        signal: MethodIndex,
        receiver: Weak<dyn Receiver>,
        receiver_id: ObjectId,
        slot: SlotId,
    ) -> bool {
        match self.meta.method(signal) {
            Some(method) if method.kind() == MethodKind::Signal => {
                self.connections
                    .borrow_mut()
                    .push(signal, receiver, receiver_id, slot);
                true
            }
            _ => {
                warn!(
                    class = self.meta.class_name(),
                    signal = %signal,
                    "connect to an index that is not a signal"
                );
                false
            }
        }
    }

    /// Remove connections to `receiver_id`. `None` for `signal` or `slot`
    /// matches every signal or slot. Returns how many were removed.
    pub fn disconnect(
        &self,
        signal: Option<MethodIndex>,
        receiver_id: ObjectId,
        slot: Option<SlotId>,
    ) -> usize {
        self.connections
            .borrow_mut()
            .remove_matching(signal, receiver_id, slot)
    }

    /// Live connections on `signal`.
    #[must_use]
    pub fn receiver_count(&self, signal: MethodIndex) -> usize {
        self.connections.borrow().count(signal)
    }

    /// Live connections on the signal named by `signature`; 0 if there is
    /// no such signal.
    #[must_use]
    pub fn receivers(&self, signature: &str) -> usize {
        self.meta
            .index_of_signal(signature)
            .map_or(0, |signal| self.receiver_count(signal))
    }

    /// Live connections on all signals.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.borrow().len()
    }

    /// Deliver `signal` to every connected receiver, in connection order.
    ///
    /// `args` holds one raw slot per declared parameter of the signal.
    pub fn emit(&self, signal: MethodIndex, args: &[&dyn Any]) {
        let targets = self.connections.borrow_mut().matching(signal);
        if targets.is_empty() {
            return;
        }
        trace!(sender = %self.id, signal = %signal, receivers = targets.len(), "emit");
        let delivery = Delivery {
            sender: self.id,
            signal,
            args,
        };
        for entry in targets {
            if !entry.is_active() {
                continue;
            }
            let Some(receiver) = entry.receiver.upgrade() else {
                continue;
            };
            let _scope = SenderScope::enter(SenderInfo {
                sender: self.id,
                signal,
            });
            receiver.receive(entry.slot, &delivery);
        }
    }

    /// Resolve and emit a signal by signature, checking the payload against
    /// the declared parameter types first.
    pub fn emit_signal(&self, signature: &str, args: &[&dyn Any]) -> bool {
        let Some(method) = self
            .meta
            .index_of_signal(signature)
            .and_then(|index| self.meta.method(index))
        else {
            warn!(class = self.meta.class_name(), signature, "no such signal");
            return false;
        };
        let params = method.param_types();
        if args.len() < params.len()
            || params.iter().zip(args).any(|(tag, value)| !tag.matches(*value))
        {
            warn!(
                class = self.meta.class_name(),
                signature,
                "signal payload does not match its declared parameters"
            );
            return false;
        }
        self.emit(method.index(), &args[..params.len()]);
        true
    }

    // -- event filters ------------------------------------------------------

    /// Give `filter` a first look at events sent to this object.
    ///
    /// Installing again for the same `owner` moves the filter to the front;
    /// the most recently installed filter runs first.
    pub fn install_event_filter(&self, owner: ObjectId, filter: Weak<dyn EventFilter>) {
        let mut filters = self.filters.borrow_mut();
        filters.retain(|entry| entry.owner != owner);
        filters.push(FilterEntry { owner, filter });
    }

    pub fn remove_event_filter(&self, owner: ObjectId) -> bool {
        let mut filters = self.filters.borrow_mut();
        let before = filters.len();
        filters.retain(|entry| entry.owner != owner);
        before != filters.len()
    }

    #[must_use]
    pub fn has_event_filter(&self, owner: ObjectId) -> bool {
        self.filters
            .borrow()
            .iter()
            .any(|entry| entry.owner == owner && entry.filter.strong_count() > 0)
    }

    /// Live filters, most recently installed first.
    pub(crate) fn event_filters(&self) -> Vec<Rc<dyn EventFilter>> {
        let mut filters = self.filters.borrow_mut();
        filters.retain(|entry| entry.filter.strong_count() > 0);
        filters
            .iter()
            .rev()
            .filter_map(|entry| entry.filter.upgrade())
            .collect()
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        trace!(object = %self.id, class = self.meta.class_name(), "destroyed");
        let id = self.id;
        self.emit(MethodIndex::DESTROYED, &[&id]);
    }
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCore")
            .field("id", &self.id)
            .field("class", &self.meta.class_name())
            .field("name", &*self.name.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Weak handles
// ---------------------------------------------------------------------------

/// Untyped weak handle to an object.
#[derive(Clone)]
pub struct WeakObject {
    ptr: Weak<dyn Object>,
    id: ObjectId,
}

impl WeakObject {
    #[must_use]
    pub fn new<T: Object>(object: &Rc<T>) -> Self {
        object.core().weak()
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<Rc<dyn Object>> {
        self.ptr.upgrade()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.ptr.strong_count() > 0
    }

    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }
}

impl PartialEq for WeakObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WeakObject {}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObject")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Typed weak handle to an object; the counterpart of an `Rc<T>`.
pub struct ObjectPtr<T: ?Sized> {
    ptr: Weak<T>,
    id: ObjectId,
}

impl<T: Object> ObjectPtr<T> {
    #[must_use]
    pub fn new(object: &Rc<T>) -> Self {
        Self {
            ptr: Rc::downgrade(object),
            id: object.core().id(),
        }
    }
}

impl<T: ?Sized> ObjectPtr<T> {
    #[must_use]
    pub fn upgrade(&self) -> Option<Rc<T>> {
        self.ptr.upgrade()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.ptr.strong_count() > 0
    }

    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T: ?Sized> Clone for ObjectPtr<T> {
    fn clone(&self) -> Self {
        Self {
            ptr: self.ptr.clone(),
            id: self.id,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ObjectPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPtr")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::OnceLock;

    use super::*;

    struct Beacon {
        core: ObjectCore,
    }

    impl Beacon {
        fn meta() -> &'static MetaObject {
            static META: OnceLock<MetaObject> = OnceLock::new();
            META.get_or_init(|| {
                MetaObject::builder::<Beacon>("Beacon")
                    .signal::<(i32,)>("pulse")
                    .build()
            })
        }

        fn new() -> Rc<Self> {
            Rc::new_cyclic(|me| Self {
                core: ObjectCore::new(me, Self::meta()),
            })
        }

        fn pulse(&self, n: i32) {
            self.core.emit(MethodIndex::new(1), &[&n]);
        }
    }

    impl Object for Beacon {
        fn core(&self) -> &ObjectCore {
            &self.core
        }
    }

    #[derive(Default)]
    struct Log {
        id: Cell<Option<ObjectId>>,
        seen: RefCell<Vec<(SlotId, ObjectId, Option<i32>)>>,
        probe: RefCell<Option<WeakObject>>,
        probe_alive: Cell<Option<bool>>,
    }

    impl Receiver for Log {
        fn receive(&self, slot: SlotId, delivery: &Delivery<'_>) {
            let n = delivery
                .args
                .first()
                .and_then(|a| a.downcast_ref::<i32>())
                .copied();
            self.seen.borrow_mut().push((slot, delivery.sender, n));
            if delivery.signal == MethodIndex::DESTROYED {
                let alive = self.probe.borrow().as_ref().map(WeakObject::is_alive);
                self.probe_alive.set(alive);
            }
        }
    }

    fn receiver_id(log: &Log) -> ObjectId {
        if log.id.get().is_none() {
            log.id.set(Some(ObjectId::next()));
        }
        log.id.get().unwrap()
    }

    #[test]
    fn ids_are_unique() {
        let a = Beacon::new();
        let b = Beacon::new();
        assert_ne!(a.core().id(), b.core().id());
        assert_eq!(a.core().weak().id(), a.core().id());
    }

    #[test]
    fn emit_reaches_connected_slots_in_order() {
        let beacon = Beacon::new();
        let log = Rc::new(Log::default());
        let id = receiver_id(&log);
        let weak: Weak<dyn Receiver> = Rc::downgrade(&log) as Weak<dyn Receiver>;
        assert!(beacon.core().connect(MethodIndex::new(1), weak.clone(), id, SlotId(7)));
        assert!(beacon.core().connect(MethodIndex::new(1), weak, id, SlotId(8)));
        beacon.pulse(3);
        let seen = log.seen.borrow().clone();
        let sender = beacon.core().id();
        assert_eq!(
            seen,
            vec![(SlotId(7), sender, Some(3)), (SlotId(8), sender, Some(3))]
        );
        assert_eq!(beacon.core().receivers("pulse(i32)"), 2);
    }

    #[test]
    fn connect_rejects_non_signal() {
        let beacon = Beacon::new();
        let log = Rc::new(Log::default());
        let id = receiver_id(&log);
        let weak: Weak<dyn Receiver> = Rc::downgrade(&log) as Weak<dyn Receiver>;
        assert!(!beacon.core().connect(MethodIndex::new(99), weak, id, SlotId(1)));
    }

    #[test]
    fn disconnect_by_slot() {
        let beacon = Beacon::new();
        let log = Rc::new(Log::default());
        let id = receiver_id(&log);
        let weak: Weak<dyn Receiver> = Rc::downgrade(&log) as Weak<dyn Receiver>;
        beacon.core().connect(MethodIndex::new(1), weak.clone(), id, SlotId(1));
        beacon.core().connect(MethodIndex::new(1), weak, id, SlotId(2));
        assert_eq!(beacon.core().disconnect(None, id, Some(SlotId(1))), 1);
        beacon.pulse(1);
        assert_eq!(log.seen.borrow().len(), 1);
        assert_eq!(log.seen.borrow()[0].0, SlotId(2));
    }

    #[test]
    fn dead_receivers_are_pruned() {
        let beacon = Beacon::new();
        let log = Rc::new(Log::default());
        let id = receiver_id(&log);
        let weak: Weak<dyn Receiver> = Rc::downgrade(&log) as Weak<dyn Receiver>;
        beacon.core().connect(MethodIndex::new(1), weak, id, SlotId(1));
        drop(log);
        assert_eq!(beacon.core().receivers("pulse(i32)"), 0);
        beacon.pulse(1);
        assert_eq!(beacon.core().connection_count(), 0);
    }

    #[test]
    fn destroyed_fires_once_after_handles_expire() {
        let beacon = Beacon::new();
        let sender = beacon.core().id();
        let log = Rc::new(Log::default());
        let id = receiver_id(&log);
        *log.probe.borrow_mut() = Some(beacon.core().weak());
        let weak: Weak<dyn Receiver> = Rc::downgrade(&log) as Weak<dyn Receiver>;
        beacon.core().connect(MethodIndex::DESTROYED, weak, id, SlotId(0));
        drop(beacon);
        assert_eq!(log.seen.borrow().as_slice(), &[(SlotId(0), sender, None)]);
        assert_eq!(log.probe_alive.get(), Some(false));
    }

    #[test]
    fn emit_signal_checks_payload() {
        let beacon = Beacon::new();
        let log = Rc::new(Log::default());
        let id = receiver_id(&log);
        let weak: Weak<dyn Receiver> = Rc::downgrade(&log) as Weak<dyn Receiver>;
        beacon.core().connect(MethodIndex::new(1), weak, id, SlotId(1));
        assert!(!beacon.core().emit_signal("pulse(i32)", &[&1.0_f32]));
        assert!(!beacon.core().emit_signal("pulse(i32)", &[]));
        assert!(!beacon.core().emit_signal("missing()", &[]));
        assert!(beacon.core().emit_signal("pulse( i32 )", &[&4_i32]));
        assert_eq!(log.seen.borrow().len(), 1);
    }

    #[test]
    fn object_ptr_tracks_lifetime() {
        let beacon = Beacon::new();
        let ptr = ObjectPtr::new(&beacon);
        assert!(ptr.is_alive());
        assert!(ptr.upgrade().is_some());
        drop(beacon);
        assert!(!ptr.is_alive());
        assert!(ptr.upgrade().is_none());
    }
}
