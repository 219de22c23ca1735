//! Proxy acquisition and the free `connect*` functions.
//!
//! # Design
//!
//! Each thread owns a registry of [`SignalForwarder`]s. Which forwarder a
//! sender's bindings go to depends on the configured [`ProxyPolicy`]:
//!
//! | Policy        | Forwarder                                                 |
//! |---------------|-----------------------------------------------------------|
//! | `SharedPool`  | newest pool member; a new member opens once it is full    |
//! | `PerSender`   | one per sender, created lazily, released on `destroyed`   |
//!
//! Pooling keeps the number of forwarder objects small while bounding each
//! forwarder's binding table by `max_bindings_per_proxy`.
//!
//! The registry is thread-local because forwarders and the objects they
//! observe are `Rc`-based and never cross threads.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use slotwire_core::testing::CallbackTester;
//! use slotwire_runtime::{Adapter, proxy};
//!
//! let sender = CallbackTester::new();
//! let total = Rc::new(Cell::new(0));
//! let sink = Rc::clone(&total);
//! assert!(proxy::connect(&*sender, "a_signal(i32)", Adapter::new(move |v: i32| {
//!     sink.set(sink.get() + v);
//! })));
//! sender.emit_a_signal(2);
//! sender.emit_a_signal(3);
//! assert_eq!(total.get(), 5);
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use slotwire_core::{
    Delivery, Event, EventType, MethodIndex, Object, ObjectId, Receiver, SlotId, Timer, Value,
};
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::callback::Callback;
use crate::config::{ForwarderConfig, ProxyPolicy};
use crate::forwarder::SignalForwarder;

const ATTACHED_SENDER_DESTROYED: SlotId = SlotId(0);

struct Registry {
    id: ObjectId,
    config: RefCell<ForwarderConfig>,
    pool: RefCell<Vec<Rc<SignalForwarder>>>,
    attached: RefCell<AHashMap<ObjectId, Rc<SignalForwarder>>>,
}

impl Receiver for Registry {
    fn receive(&self, slot: SlotId, delivery: &Delivery<'_>) {
        if slot != ATTACHED_SENDER_DESTROYED || delivery.signal != MethodIndex::DESTROYED {
            return;
        }
        let released = self.attached.borrow_mut().remove(&delivery.sender);
        if released.is_some() {
            debug!(sender = %delivery.sender, "attached proxy released");
        }
    }
}

thread_local! {
    static REGISTRY: Rc<Registry> = Rc::new(Registry {
        id: ObjectId::next(),
        config: RefCell::new(ForwarderConfig::from_env()),
        pool: RefCell::new(Vec::new()),
        attached: RefCell::new(AHashMap::new()),
    });
}

fn registry() -> Rc<Registry> {
    REGISTRY.with(Rc::clone)
}

// ---------------------------------------------------------------------------
// Configuration and acquisition
// ---------------------------------------------------------------------------

/// Replace the configuration used for proxies created from now on.
///
/// The initial configuration is read from the environment (see
/// [`ForwarderConfig::from_env`]). Out-of-range values are normalized.
pub fn configure(config: ForwarderConfig) {
    *registry().config.borrow_mut() = config.normalized();
}

#[must_use]
pub fn config() -> ForwarderConfig {
    registry().config.borrow().clone()
}

/// The pool member new bindings go to.
#[must_use]
pub fn shared_proxy() -> Rc<SignalForwarder> {
    let registry = registry();
    let mut pool = registry.pool.borrow_mut();
    if let Some(last) = pool.last()
        && last.can_add_signal_bindings()
    {
        return Rc::clone(last);
    }
    let proxy = SignalForwarder::with_config(registry.config.borrow().clone());
    debug!(proxy = %proxy.id(), pool_size = pool.len() + 1, "shared proxy created");
    pool.push(Rc::clone(&proxy));
    proxy
}

/// The proxy attached to `sender`, created on first use.
#[must_use]
pub fn attached_proxy(sender: &dyn Object) -> Rc<SignalForwarder> {
    let registry = registry();
    let sender_id = sender.core().id();
    if let Some(proxy) = registry.attached.borrow().get(&sender_id) {
        return Rc::clone(proxy);
    }
    let proxy = SignalForwarder::with_config(registry.config.borrow().clone());
    let receiver: Weak<dyn Receiver> = Rc::downgrade(&registry) as Weak<dyn Receiver>;
    sender.core().connect(
        MethodIndex::DESTROYED,
        receiver,
        registry.id,
        ATTACHED_SENDER_DESTROYED,
    );
    registry
        .attached
        .borrow_mut()
        .insert(sender_id, Rc::clone(&proxy));
    debug!(sender = %sender_id, proxy = %proxy.id(), "proxy attached");
    proxy
}

/// The proxy the configured policy assigns to `sender`.
#[must_use]
pub fn proxy_for(sender: &dyn Object) -> Rc<SignalForwarder> {
    match config().policy {
        ProxyPolicy::SharedPool => shared_proxy(),
        ProxyPolicy::PerSender => attached_proxy(sender),
    }
}

/// Number of shared proxies created on this thread.
#[must_use]
pub fn pool_size() -> usize {
    registry().pool.borrow().len()
}

/// Every proxy that may hold bindings of `sender`.
fn candidates(sender: &dyn Object) -> Vec<Rc<SignalForwarder>> {
    let registry = registry();
    let mut proxies: Vec<Rc<SignalForwarder>> = registry.pool.borrow().clone();
    if let Some(proxy) = registry.attached.borrow().get(&sender.core().id()) {
        proxies.push(Rc::clone(proxy));
    }
    proxies
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Forward `signal` of `sender` to `adapter`.
pub fn connect(sender: &dyn Object, signal: &str, adapter: impl Into<Adapter>) -> bool {
    proxy_for(sender).bind(sender, signal, adapter)
}

/// Like [`connect`], but the binding is removed when `context` is
/// destroyed.
pub fn connect_with_context(
    sender: &dyn Object,
    signal: &str,
    adapter: impl Into<Adapter>,
    context: &dyn Object,
) -> bool {
    proxy_for(sender).bind_with_context(sender, signal, adapter, Some(context))
}

/// Forward `signal` of `sender` to `method` of `receiver`, passing a weak
/// handle to the sender as the method's first argument.
///
/// The method's first parameter must be a [`WeakObject`](slotwire_core::WeakObject);
/// its remaining parameters are filled from the signal.
pub fn connect_with_sender(
    sender: &dyn Object,
    signal: &str,
    receiver: &dyn Object,
    method: &str,
) -> bool {
    let mut callback = Callback::new(receiver, method);
    if let Err(err) = callback.try_bind_at(0, Value::new(sender.core().weak())) {
        warn!(method, error = %err, "receiver method cannot take the sender");
        return false;
    }
    connect(sender, signal, callback)
}

/// Remove the bindings of `signal` on `sender` from every proxy.
pub fn disconnect(sender: &dyn Object, signal: &str) -> bool {
    candidates(sender)
        .iter()
        .fold(false, |any, proxy| proxy.unbind(sender, signal) || any)
}

/// Remove every binding of `sender` from every proxy.
pub fn disconnect_all(sender: &dyn Object) -> bool {
    candidates(sender)
        .iter()
        .fold(false, |any, proxy| proxy.unbind_all(sender) || any)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Call `adapter` whenever `sender` receives an event of kind `kind`.
pub fn connect_event(sender: &dyn Object, kind: EventType, adapter: impl Into<Adapter>) -> bool {
    proxy_for(sender).bind_event(sender, kind, adapter)
}

/// Like [`connect_event`], for events `filter` accepts.
pub fn connect_event_filtered<P>(
    sender: &dyn Object,
    kind: EventType,
    adapter: impl Into<Adapter>,
    filter: P,
) -> bool
where
    P: Fn(&dyn Object, &Event) -> bool + 'static,
{
    proxy_for(sender).bind_event_filtered(sender, kind, adapter, filter)
}

pub fn disconnect_event(sender: &dyn Object, kind: EventType) -> bool {
    candidates(sender)
        .iter()
        .fold(false, |any, proxy| proxy.unbind_event(sender, kind) || any)
}

// ---------------------------------------------------------------------------
// Delayed calls
// ---------------------------------------------------------------------------

/// Call `adapter` once, `delay` from now, from the thread's event loop.
///
/// The adapter must take no arguments. Nothing happens unless the loop
/// runs.
pub fn delayed_call(delay: Duration, adapter: impl Into<Adapter>) -> bool {
    let timer = Timer::new();
    timer.set_single_shot(true);
    timer.set_interval(delay);
    if !connect(&*timer, Timer::TIMEOUT, adapter) {
        return false;
    }
    timer.delete_on_timeout();
    timer.start();
    true
}
