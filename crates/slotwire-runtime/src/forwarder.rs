//! Signal and event forwarding proxy.
//!
//! # Design
//!
//! A [`SignalForwarder`] is a [`Receiver`] that turns signals of arbitrary
//! senders into calls of [`Adapter`]s. Every binding gets its own slot id,
//! allocated from `binding_slot_base` upwards, and one connection from the
//! sender's signal to that slot. A delivery therefore identifies its binding
//! by slot alone; the sender and signal are never looked up on the hot path.
//!
//! | Slot                       | Meaning                                   |
//! |----------------------------|-------------------------------------------|
//! | `0`                        | unused                                    |
//! | [`CONTEXT_DESTROYED_SLOT`] | a context object went away                |
//! | `binding_slot_base..`      | one signal binding each                   |
//!
//! Per sender the forwarder moves through two states:
//!
//! ```text
//! Unsubscribed ──bind──▶ Subscribed ──last unbind / sender destroyed──▶ Unsubscribed
//! ```
//!
//! Entering `Subscribed` binds the sender's `destroyed(ObjectId)` signal to
//! the shared destroy sentinel adapter. Receiving that signal tears the
//! sender down: all of its signal and event bindings are dropped within the
//! same delivery, so no handle to a destroyed sender survives it.
//!
//! # Invariants
//!
//! 1. A binding exists only while its sender has a sentinel binding.
//! 2. Every sender entry owns exactly one sentinel binding.
//! 3. Sentinel bindings never count towards `binding_count` or the
//!    per-proxy capacity.
//! 4. Slot ids freed by unbinding are reused first-in first-out.
//! 5. No adapter is invoked or dropped while the binding table is borrowed;
//!    adapters may bind and unbind re-entrantly.
//!
//! # Failure Modes
//!
//! | Condition                                   | Outcome                          |
//! |---------------------------------------------|----------------------------------|
//! | unknown signal, type mismatch, full proxy   | `bind` returns false + `warn!`   |
//! | unbind of something never bound            | no-op                            |
//! | delivery on a slot with no binding          | `warn!` (`debug!` for `destroyed`) |
//! | adapter refuses the delivered arguments     | logged, delivery continues       |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use slotwire_core::{
    Arg, Delivery, Event, EventFilter, EventType, MAX_ARGS, MethodIndex, Object, ObjectCore,
    ObjectId, Receiver, SlotId, TypeTags, WeakObject,
};
use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace, warn};

use crate::adapter::{Adapter, check_type_match};
use crate::config::ForwarderConfig;
use crate::error::BindError;

/// Slot ids below this value are never handed out to bindings.
pub const RESERVED_SLOTS: u32 = 2;

/// Slot receiving `destroyed(ObjectId)` from context objects.
pub const CONTEXT_DESTROYED_SLOT: SlotId = SlotId(1);

/// Extra condition an event must meet before an event binding fires.
pub type EventPredicate = Rc<dyn Fn(&dyn Object, &Event) -> bool>;

struct SignalBinding {
    sender: ObjectId,
    signal: MethodIndex,
    adapter: Adapter,
    params: TypeTags,
    context: Option<ObjectId>,
}

struct EventBinding {
    kind: EventType,
    adapter: Adapter,
    filter: Option<EventPredicate>,
}

struct SenderEntry {
    handle: WeakObject,
    slots: SmallVec<[SlotId; 4]>,
    events: Vec<EventBinding>,
}

struct ContextEntry {
    handle: WeakObject,
    slots: SmallVec<[SlotId; 4]>,
}

struct RemovedBinding {
    slot: SlotId,
    binding: SignalBinding,
    /// The context whose last binding this was.
    orphaned_context: Option<WeakObject>,
}

#[derive(Default)]
struct ForwarderState {
    bindings: AHashMap<SlotId, SignalBinding>,
    senders: AHashMap<ObjectId, SenderEntry>,
    contexts: AHashMap<ObjectId, ContextEntry>,
    free_slots: VecDeque<SlotId>,
    next_slot: u32,
    user_bindings: usize,
}

impl ForwarderState {
    fn allocate_slot(&mut self, base: u32) -> SlotId {
        let base = base.max(RESERVED_SLOTS);
        self.free_slots.pop_front().unwrap_or_else(|| {
            let slot = SlotId(base.saturating_add(self.next_slot));
            self.next_slot += 1;
            slot
        })
    }

    fn remove_slot(&mut self, slot: SlotId) -> Option<RemovedBinding> {
        let binding = self.bindings.remove(&slot)?;
        if let Some(entry) = self.senders.get_mut(&binding.sender) {
            entry.slots.retain(|s| *s != slot);
        }
        let mut orphaned_context = None;
        if let Some(context) = binding.context
            && let Some(entry) = self.contexts.get_mut(&context)
        {
            entry.slots.retain(|s| *s != slot);
            if entry.slots.is_empty() {
                orphaned_context = self.contexts.remove(&context).map(|entry| entry.handle);
            }
        }
        if !binding.adapter.is_destroy_sentinel() {
            self.user_bindings -= 1;
        }
        self.free_slots.push_back(slot);
        Some(RemovedBinding {
            slot,
            binding,
            orphaned_context,
        })
    }

    fn is_connected(&self, sender: ObjectId) -> bool {
        self.senders.get(&sender).is_some_and(|entry| {
            !entry.events.is_empty()
                || entry.slots.iter().any(|slot| {
                    self.bindings
                        .get(slot)
                        .is_some_and(|binding| !binding.adapter.is_destroy_sentinel())
                })
        })
    }
}

// ---------------------------------------------------------------------------
// SignalForwarder
// ---------------------------------------------------------------------------

/// Routes signals and events of observed senders to adapters.
///
/// Senders are never owned; the forwarder only observes them. Must be used
/// from the thread that created it.
pub struct SignalForwarder {
    id: ObjectId,
    me: Weak<SignalForwarder>,
    config: ForwarderConfig,
    state: RefCell<ForwarderState>,
}

impl SignalForwarder {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_config(ForwarderConfig::default())
    }

    /// Forwarder with `config`, after [`ForwarderConfig::normalized`].
    #[must_use]
    pub fn with_config(config: ForwarderConfig) -> Rc<Self> {
        let config = config.normalized();
        Rc::new_cyclic(|me| Self {
            id: ObjectId::next(),
            me: me.clone(),
            config,
            state: RefCell::new(ForwarderState::default()),
        })
    }

    /// Identity used as the receiver id of this forwarder's connections.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub const fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    // -- signal bindings ----------------------------------------------------

    /// Forward `signal` of `sender` to `adapter`.
    ///
    /// Returns false (and logs why) if the binding could not be made.
    pub fn bind(&self, sender: &dyn Object, signal: &str, adapter: impl Into<Adapter>) -> bool {
        self.bind_with_context(sender, signal, adapter, None)
    }

    /// Like [`bind`](Self::bind), but the binding is also removed when
    /// `context` is destroyed.
    pub fn bind_with_context(
        &self,
        sender: &dyn Object,
        signal: &str,
        adapter: impl Into<Adapter>,
        context: Option<&dyn Object>,
    ) -> bool {
        match self.try_bind_with_context(sender, signal, adapter.into(), context) {
            Ok(()) => true,
            Err(err) => {
                warn!(sender = %sender.core().id(), signal, error = %err, "bind failed");
                false
            }
        }
    }

    pub fn try_bind(
        &self,
        sender: &dyn Object,
        signal: &str,
        adapter: Adapter,
    ) -> Result<(), BindError> {
        self.try_bind_with_context(sender, signal, adapter, None)
    }

    pub fn try_bind_with_context(
        &self,
        sender: &dyn Object,
        signal: &str,
        adapter: Adapter,
        context: Option<&dyn Object>,
    ) -> Result<(), BindError> {
        let core = sender.core();
        let meta = core.meta_object();
        let method = meta
            .index_of_signal(signal)
            .and_then(|index| meta.method(index))
            .ok_or_else(|| BindError::NoSuchSignal {
                signal: signal.to_owned(),
                class: meta.class_name(),
            })?;
        let params: TypeTags = method.param_types().iter().copied().collect();
        check_type_match(&adapter, &params)?;
        if !self.can_add_signal_bindings() {
            return Err(BindError::CapacityExhausted {
                limit: self.config.max_bindings_per_proxy,
            });
        }

        let connect_failed = || BindError::ConnectFailed {
            signal: method.signature().to_owned(),
        };
        let slot = self.connect_slot(core, method.index()).ok_or_else(connect_failed)?;
        // The sentinel connects after the binding so that bindings on
        // `destroyed` itself still run before teardown.
        if !self.ensure_destroy_notify(core) {
            core.disconnect(Some(method.index()), self.id, Some(slot));
            self.state.borrow_mut().free_slots.push_back(slot);
            return Err(connect_failed());
        }

        let sender_id = core.id();
        {
            let mut state = self.state.borrow_mut();
            state.bindings.insert(
                slot,
                SignalBinding {
                    sender: sender_id,
                    signal: method.index(),
                    adapter,
                    params,
                    context: None,
                },
            );
            state.user_bindings += 1;
            if let Some(entry) = state.senders.get_mut(&sender_id) {
                entry.slots.push(slot);
            }
        }
        if let Some(context) = context {
            self.watch_context(context, slot);
        }
        debug!(
            sender = %sender_id,
            signal = method.signature(),
            slot = %slot,
            "signal bound"
        );
        Ok(())
    }

    /// Remove every binding of `signal` on `sender`.
    ///
    /// Returns whether anything was removed. Unbinding the sender's last
    /// binding also drops its destruction subscription.
    pub fn unbind(&self, sender: &dyn Object, signal: &str) -> bool {
        let core = sender.core();
        let sender_id = core.id();
        let Some(signal) = core.meta_object().index_of_signal(signal) else {
            return false;
        };
        let removed: Vec<RemovedBinding> = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.senders.get(&sender_id) else {
                return false;
            };
            let slots: SmallVec<[SlotId; 4]> = entry
                .slots
                .iter()
                .copied()
                .filter(|slot| {
                    state.bindings.get(slot).is_some_and(|binding| {
                        binding.signal == signal && !binding.adapter.is_destroy_sentinel()
                    })
                })
                .collect();
            slots
                .into_iter()
                .filter_map(|slot| state.remove_slot(slot))
                .collect()
        };
        for binding in &removed {
            core.disconnect(Some(signal), self.id, Some(binding.slot));
        }
        self.release_contexts(&removed);
        if !self.is_connected(sender) {
            self.teardown(sender_id);
        }
        !removed.is_empty()
    }

    // -- event bindings -----------------------------------------------------

    /// Call `adapter` whenever `sender` receives an event of kind `kind`.
    ///
    /// The adapter must take no arguments. Events are observed, never
    /// consumed.
    pub fn bind_event(
        &self,
        sender: &dyn Object,
        kind: EventType,
        adapter: impl Into<Adapter>,
    ) -> bool {
        self.bind_event_inner(sender, kind, adapter.into(), None)
    }

    /// Like [`bind_event`](Self::bind_event), but only fire for events
    /// `filter` accepts.
    pub fn bind_event_filtered<P>(
        &self,
        sender: &dyn Object,
        kind: EventType,
        adapter: impl Into<Adapter>,
        filter: P,
    ) -> bool
    where
        P: Fn(&dyn Object, &Event) -> bool + 'static,
    {
        self.bind_event_inner(sender, kind, adapter.into(), Some(Rc::new(filter)))
    }

    fn bind_event_inner(
        &self,
        sender: &dyn Object,
        kind: EventType,
        adapter: Adapter,
        filter: Option<EventPredicate>,
    ) -> bool {
        match self.try_bind_event(sender, kind, adapter, filter) {
            Ok(()) => true,
            Err(err) => {
                warn!(sender = %sender.core().id(), event = ?kind, error = %err, "event bind failed");
                false
            }
        }
    }

    pub fn try_bind_event(
        &self,
        sender: &dyn Object,
        kind: EventType,
        adapter: Adapter,
        filter: Option<EventPredicate>,
    ) -> Result<(), BindError> {
        check_type_match(&adapter, &[])?;
        let core = sender.core();
        if !self.ensure_destroy_notify(core) {
            return Err(BindError::ConnectFailed {
                signal: String::from("destroyed(ObjectId)"),
            });
        }
        if !core.has_event_filter(self.id) {
            let observer: Weak<dyn EventFilter> = self.me.clone();
            core.install_event_filter(self.id, observer);
        }
        if let Some(entry) = self.state.borrow_mut().senders.get_mut(&core.id()) {
            entry.events.push(EventBinding {
                kind,
                adapter,
                filter,
            });
        }
        debug!(sender = %core.id(), event = ?kind, "event bound");
        Ok(())
    }

    /// Remove every event binding of `kind` on `sender`.
    pub fn unbind_event(&self, sender: &dyn Object, kind: EventType) -> bool {
        let core = sender.core();
        let sender_id = core.id();
        let (removed, no_events_left) = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.senders.get_mut(&sender_id) else {
                return false;
            };
            let (removed, kept): (Vec<EventBinding>, Vec<EventBinding>) =
                std::mem::take(&mut entry.events)
                    .into_iter()
                    .partition(|binding| binding.kind == kind);
            entry.events = kept;
            (removed, entry.events.is_empty())
        };
        if no_events_left {
            core.remove_event_filter(self.id);
        }
        if !self.is_connected(sender) {
            self.teardown(sender_id);
        }
        !removed.is_empty()
    }

    // -- teardown -----------------------------------------------------------

    /// Remove all signal and event bindings of `sender`.
    pub fn unbind_all(&self, sender: &dyn Object) -> bool {
        self.teardown(sender.core().id())
    }

    fn teardown(&self, sender: ObjectId) -> bool {
        let (entry, removed) = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.senders.remove(&sender) else {
                return false;
            };
            let removed: Vec<RemovedBinding> = entry
                .slots
                .iter()
                .filter_map(|slot| state.remove_slot(*slot))
                .collect();
            (entry, removed)
        };
        if let Some(object) = entry.handle.upgrade() {
            let core = object.core();
            for binding in &removed {
                core.disconnect(Some(binding.binding.signal), self.id, Some(binding.slot));
            }
            core.remove_event_filter(self.id);
        }
        self.release_contexts(&removed);
        debug!(
            sender = %sender,
            signal_bindings = removed.len(),
            event_bindings = entry.events.len(),
            "sender torn down"
        );
        true
    }

    // -- introspection ------------------------------------------------------

    /// Signal bindings plus event bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        let state = self.state.borrow();
        let events: usize = state.senders.values().map(|entry| entry.events.len()).sum();
        state.user_bindings + events
    }

    #[must_use]
    pub fn signal_binding_count(&self) -> usize {
        self.state.borrow().user_bindings
    }

    /// Whether another signal binding fits under the configured capacity.
    #[must_use]
    pub fn can_add_signal_bindings(&self) -> bool {
        self.signal_binding_count() < self.config.max_bindings_per_proxy
    }

    /// Whether `sender` has any signal or event binding on this forwarder.
    #[must_use]
    pub fn is_connected(&self, sender: &dyn Object) -> bool {
        self.state.borrow().is_connected(sender.core().id())
    }

    /// Senders currently observed.
    #[must_use]
    pub fn sender_count(&self) -> usize {
        self.state.borrow().senders.len()
    }

    // -- internals ----------------------------------------------------------

    fn receiver(&self) -> Weak<dyn Receiver> {
        self.me.clone()
    }

    fn connect_slot(&self, core: &ObjectCore, signal: MethodIndex) -> Option<SlotId> {
        let slot = self
            .state
            .borrow_mut()
            .allocate_slot(self.config.binding_slot_base);
        if core.connect(signal, self.receiver(), self.id, slot) {
            Some(slot)
        } else {
            self.state.borrow_mut().free_slots.push_back(slot);
            None
        }
    }

    fn ensure_destroy_notify(&self, core: &ObjectCore) -> bool {
        let sender_id = core.id();
        if self.state.borrow().senders.contains_key(&sender_id) {
            return true;
        }
        let Some(slot) = self.connect_slot(core, MethodIndex::DESTROYED) else {
            return false;
        };
        let mut state = self.state.borrow_mut();
        state.bindings.insert(
            slot,
            SignalBinding {
                sender: sender_id,
                signal: MethodIndex::DESTROYED,
                adapter: Adapter::destroy_sentinel(),
                params: TypeTags::new(),
                context: None,
            },
        );
        state.senders.insert(
            sender_id,
            SenderEntry {
                handle: core.weak(),
                slots: smallvec![slot],
                events: Vec::new(),
            },
        );
        trace!(sender = %sender_id, slot = %slot, "watching sender for destruction");
        true
    }

    fn watch_context(&self, context: &dyn Object, slot: SlotId) {
        let core = context.core();
        let context_id = core.id();
        let first = {
            let mut state = self.state.borrow_mut();
            if let Some(binding) = state.bindings.get_mut(&slot) {
                binding.context = Some(context_id);
            }
            match state.contexts.get_mut(&context_id) {
                Some(entry) => {
                    entry.slots.push(slot);
                    false
                }
                None => {
                    state.contexts.insert(
                        context_id,
                        ContextEntry {
                            handle: core.weak(),
                            slots: smallvec![slot],
                        },
                    );
                    true
                }
            }
        };
        if first
            && !core.connect(
                MethodIndex::DESTROYED,
                self.receiver(),
                self.id,
                CONTEXT_DESTROYED_SLOT,
            )
        {
            warn!(context = %context_id, "could not watch context for destruction");
        }
    }

    fn release_contexts(&self, removed: &[RemovedBinding]) {
        for handle in removed.iter().filter_map(|r| r.orphaned_context.as_ref()) {
            if let Some(context) = handle.upgrade() {
                context.core().disconnect(
                    Some(MethodIndex::DESTROYED),
                    self.id,
                    Some(CONTEXT_DESTROYED_SLOT),
                );
            }
        }
    }

    fn context_destroyed(&self, context: ObjectId) {
        let (removed, senders) = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.contexts.remove(&context) else {
                return;
            };
            let removed: Vec<RemovedBinding> = entry
                .slots
                .iter()
                .filter_map(|slot| state.remove_slot(*slot))
                .collect();
            let mut senders: SmallVec<[(ObjectId, WeakObject); 4]> = SmallVec::new();
            for binding in &removed {
                let sender = binding.binding.sender;
                if senders.iter().all(|(id, _)| *id != sender)
                    && let Some(entry) = state.senders.get(&sender)
                {
                    senders.push((sender, entry.handle.clone()));
                }
            }
            (removed, senders)
        };
        debug!(context = %context, bindings = removed.len(), "context destroyed");
        for (sender, handle) in &senders {
            if let Some(object) = handle.upgrade() {
                for binding in removed.iter().filter(|r| r.binding.sender == *sender) {
                    object.core().disconnect(
                        Some(binding.binding.signal),
                        self.id,
                        Some(binding.slot),
                    );
                }
            }
            let idle = !self.state.borrow().is_connected(*sender);
            if idle {
                self.teardown(*sender);
            }
        }
    }
}

impl Receiver for SignalForwarder {
    fn receive(&self, slot: SlotId, delivery: &Delivery<'_>) {
        if slot == CONTEXT_DESTROYED_SLOT {
            self.context_destroyed(delivery.sender);
            return;
        }
        let found = self
            .state
            .borrow()
            .bindings
            .get(&slot)
            .map(|binding| (binding.sender, binding.adapter.clone(), binding.params.clone()));
        let Some((sender, adapter, params)) = found else {
            if delivery.signal == MethodIndex::DESTROYED {
                debug!(sender = %delivery.sender, slot = %slot, "destroyed after unbind");
            } else {
                warn!(
                    sender = %delivery.sender,
                    signal = %delivery.signal,
                    slot = %slot,
                    "no binding matches delivered signal"
                );
            }
            return;
        };
        if adapter.is_destroy_sentinel() {
            self.teardown(sender);
            return;
        }
        let args: SmallVec<[Arg<'_>; MAX_ARGS]> = params
            .iter()
            .zip(delivery.args)
            .map(|(tag, raw)| Arg::tagged(*tag, *raw))
            .collect();
        if !adapter.invoke(&args) {
            debug!(sender = %sender, slot = %slot, "forwarded call failed");
        }
    }
}

impl EventFilter for SignalForwarder {
    fn event_filter(&self, watched: &dyn Object, event: &Event) -> bool {
        let matching: SmallVec<[(Adapter, Option<EventPredicate>); 2]> = {
            let state = self.state.borrow();
            let Some(entry) = state.senders.get(&watched.core().id()) else {
                return false;
            };
            entry
                .events
                .iter()
                .filter(|binding| binding.kind == event.kind())
                .map(|binding| (binding.adapter.clone(), binding.filter.clone()))
                .collect()
        };
        for (adapter, filter) in matching {
            if filter.as_ref().is_none_or(|accept| accept(watched, event)) {
                adapter.invoke(&[]);
            }
        }
        false
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        let state = std::mem::take(self.state.get_mut());
        for entry in state.senders.values() {
            if let Some(object) = entry.handle.upgrade() {
                object.core().disconnect(None, self.id, None);
                object.core().remove_event_filter(self.id);
            }
        }
        for entry in state.contexts.values() {
            if let Some(object) = entry.handle.upgrade() {
                object.core().disconnect(None, self.id, None);
            }
        }
    }
}

impl fmt::Debug for SignalForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SignalForwarder")
            .field("id", &self.id)
            .field("senders", &state.senders.len())
            .field("signal_bindings", &state.user_bindings)
            .field("contexts", &state.contexts.len())
            .finish()
    }
}
