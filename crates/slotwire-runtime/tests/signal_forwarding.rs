#![forbid(unsafe_code)]

//! End-to-end forwarding tests: callbacks, adapters and proxies wired to
//! real objects, signals, events and the event loop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use slotwire_core::testing::{CallbackTester, PlainObject};
use slotwire_core::{Event, EventLoop, EventType, Object, current_sender, send_event};
use slotwire_runtime::{
    Adapter, Callback, ForwarderConfig, ProxyPolicy, SignalForwarder, proxy, safe_bind,
};

// ── Helpers ───────────────────────────────────────────────────────────────

fn counter() -> (Rc<Cell<u32>>, Adapter) {
    let hits = Rc::new(Cell::new(0));
    let sink = Rc::clone(&hits);
    (hits, Adapter::new(move || sink.set(sink.get() + 1)))
}

thread_local! {
    static RECORDED: RefCell<Vec<i32>> = const { RefCell::new(Vec::new()) };
}

fn record(value: i32) {
    RECORDED.with(|r| r.borrow_mut().push(value));
}

fn recorded() -> Vec<i32> {
    RECORDED.with(|r| r.borrow().clone())
}

// ── Callbacks ─────────────────────────────────────────────────────────────

#[test]
fn bound_callback_delivers_value() {
    let receiver = CallbackTester::new();
    let callback = Callback::new(&*receiver, "add_value(i32)").with_arg(42_i32);
    assert!(Adapter::from(callback).call(()));
    assert_eq!(receiver.values(), vec![42]);
}

#[test]
fn signal_to_callback() {
    let sender = CallbackTester::new();
    let receiver = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    assert!(forwarder.bind(
        &*sender,
        "a_signal(i32)",
        Callback::new(&*receiver, "add_value(i32)")
    ));
    sender.emit_a_signal(5);
    sender.emit_a_signal(6);
    assert_eq!(receiver.values(), vec![5, 6]);
}

#[test]
fn tagged_callback_receives_parameters_in_declared_order() {
    let sender = CallbackTester::new();
    let receiver = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    let callback = Callback::new(&*receiver, "add_tagged_value(i32,String)")
        .with_arg_at(1, String::from("tag"));
    assert!(forwarder.bind(&*sender, "a_signal(i32)", callback));
    sender.emit_a_signal(5);
    assert_eq!(receiver.tagged(), vec![(5, String::from("tag"))]);
}

#[test]
fn callback_to_destroyed_receiver_is_skipped() {
    let sender = CallbackTester::new();
    let receiver = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    forwarder.bind(
        &*sender,
        "a_signal(i32)",
        Callback::new(&*receiver, "add_value(i32)"),
    );
    drop(receiver);
    sender.emit_a_signal(1);
    assert_eq!(forwarder.binding_count(), 1);
}

// ── Functions and closures ────────────────────────────────────────────────

#[test]
fn plain_function_receives_signal() {
    let sender = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    assert!(forwarder.bind(&*sender, "a_signal(i32)", Adapter::new(record)));
    sender.emit_a_signal(7);
    assert_eq!(recorded(), vec![7]);
}

#[test]
fn adapter_may_ignore_trailing_arguments() {
    let sender = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    let (hits, adapter) = counter();
    assert!(forwarder.bind(&*sender, "a_signal(i32)", adapter));
    sender.emit_a_signal(1);
    assert_eq!(hits.get(), 1);
}

#[test]
fn argument_types_are_checked_strictly() {
    let sender = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    assert!(forwarder.bind(&*sender, "a_signal(i32)", Adapter::new(|_: i32| {})));
    assert!(!forwarder.bind(&*sender, "a_signal(i32)", Adapter::new(|_: f32| {})));
    assert!(!forwarder.bind(&*sender, "a_signal(i32)", Adapter::new(|_: i64| {})));
    assert!(forwarder.bind(&*sender, "a_signal(i32)", Adapter::new(|| {})));
    assert!(!forwarder.bind(
        &*sender,
        "a_signal(i32)",
        Adapter::new(|_: i32, _: i32| {})
    ));
    assert_eq!(sender.receiver_count("a_signal(i32)"), 2);
    assert_eq!(forwarder.binding_count(), 2);
}

#[test]
fn five_argument_signal() {
    let sender = CallbackTester::new();
    let receiver = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    let seen = Rc::new(Cell::new(None));
    let sink = Rc::clone(&seen);
    assert!(forwarder.bind(
        &*sender,
        "many_args(i32,bool,f32,char,f64)",
        Adapter::new(move |a: i32, b: bool, c: f32, d: char, e: f64| {
            sink.set(Some((a, b, c, d, e)));
        })
    ));
    assert!(forwarder.bind(
        &*sender,
        "many_args(i32, bool, f32, char, f64)",
        Callback::new(&*receiver, "record_many(i32,bool,f32,char,f64)")
    ));
    let args = (1, true, 2.5_f32, 'x', 4.25_f64);
    sender.emit_many_args(args);
    assert_eq!(seen.get(), Some(args));
    assert_eq!(receiver.many(), vec![args]);
}

#[test]
fn bindings_fire_in_insertion_order() {
    let sender = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        let sink = Rc::clone(&order);
        forwarder.bind(
            &*sender,
            "no_arg_signal()",
            Adapter::new(move || sink.borrow_mut().push(tag)),
        );
    }
    sender.emit_no_arg_signal();
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn current_sender_is_visible_to_adapters() {
    let sender = CallbackTester::new();
    let forwarder = SignalForwarder::new();
    let seen = Rc::new(Cell::new(None));
    let sink = Rc::clone(&seen);
    forwarder.bind(
        &*sender,
        "no_arg_signal()",
        Adapter::new(move || sink.set(current_sender().map(|info| info.sender))),
    );
    sender.emit_no_arg_signal();
    assert_eq!(seen.get(), Some(sender.core().id()));
    assert!(current_sender().is_none());
}

// ── Lifetimes ─────────────────────────────────────────────────────────────

#[test]
fn destroying_sender_clears_bindings() {
    let forwarder = SignalForwarder::new();
    let sender = CallbackTester::new();
    let (hits, adapter) = counter();
    forwarder.bind(&*sender, "no_arg_signal()", adapter.clone());
    forwarder.bind_event(&*sender, EventType::Show, adapter);
    assert_eq!(forwarder.binding_count(), 2);
    drop(sender);
    assert_eq!(forwarder.binding_count(), 0);
    assert_eq!(forwarder.sender_count(), 0);
    assert_eq!(hits.get(), 0);
}

#[test]
fn half_of_a_hundred_senders_destroyed() {
    let forwarder = SignalForwarder::new();
    let (hits, adapter) = counter();
    let mut senders: Vec<Option<Rc<CallbackTester>>> = (0..100)
        .map(|_| {
            let sender = CallbackTester::new();
            assert!(forwarder.bind(&*sender, "no_arg_signal()", adapter.clone()));
            Some(sender)
        })
        .collect();
    for slot in senders.iter_mut().step_by(2) {
        *slot = None;
    }
    for sender in senders.iter().flatten() {
        sender.emit_no_arg_signal();
    }
    assert_eq!(hits.get(), 50);
    assert_eq!(forwarder.binding_count(), 50);
}

#[test]
fn unbind_disconnects_everything() {
    let forwarder = SignalForwarder::new();
    let sender = CallbackTester::new();
    let (hits, adapter) = counter();
    forwarder.bind(&*sender, "no_arg_signal()", adapter);
    assert_eq!(sender.receiver_count("no_arg_signal()"), 1);
    assert_eq!(sender.receiver_count("destroyed(ObjectId)"), 1);

    assert!(forwarder.unbind(&*sender, "no_arg_signal()"));
    assert_eq!(sender.receiver_count("no_arg_signal()"), 0);
    assert_eq!(sender.receiver_count("destroyed(ObjectId)"), 0);
    sender.emit_no_arg_signal();
    assert_eq!(hits.get(), 0);
    assert!(!forwarder.is_connected(&*sender));
}

#[test]
fn unbind_is_idempotent() {
    let forwarder = SignalForwarder::new();
    let sender = CallbackTester::new();
    let other = CallbackTester::new();
    let (_, adapter) = counter();
    forwarder.bind(&*other, "no_arg_signal()", adapter);
    assert!(!forwarder.unbind(&*sender, "no_arg_signal()"));
    assert!(!forwarder.unbind(&*sender, "not_a_signal()"));
    assert!(!forwarder.unbind(&*other, "values_changed()"));
    assert!(!forwarder.unbind_event(&*sender, EventType::Show));
    assert_eq!(forwarder.binding_count(), 1);
}

#[test]
fn partial_unbind_keeps_destruction_watch() {
    let forwarder = SignalForwarder::new();
    let sender = CallbackTester::new();
    let (_, adapter) = counter();
    forwarder.bind(&*sender, "no_arg_signal()", adapter.clone());
    forwarder.bind_event(&*sender, EventType::Show, adapter);
    forwarder.unbind(&*sender, "no_arg_signal()");
    assert!(forwarder.is_connected(&*sender));
    assert_eq!(sender.receiver_count("destroyed(ObjectId)"), 1);
    assert!(forwarder.unbind_all(&*sender));
    assert_eq!(sender.receiver_count("destroyed(ObjectId)"), 0);
}

#[test]
fn context_bound_adapter_is_released() {
    let forwarder = SignalForwarder::new();
    let sender = CallbackTester::new();
    let context = PlainObject::new();
    let token = Rc::new(());
    let held = Rc::clone(&token);
    forwarder.bind_with_context(
        &*sender,
        "no_arg_signal()",
        Adapter::new(move || {
            let _token = &held;
        }),
        Some(&*context),
    );
    assert_eq!(Rc::strong_count(&token), 2);
    drop(context);
    assert_eq!(Rc::strong_count(&token), 1);
    assert_eq!(forwarder.binding_count(), 0);
    assert_eq!(sender.receiver_count("destroyed(ObjectId)"), 0);
}

#[test]
fn context_equal_to_sender() {
    let forwarder = SignalForwarder::new();
    let sender = CallbackTester::new();
    let (_, adapter) = counter();
    forwarder.bind_with_context(&*sender, "no_arg_signal()", adapter, Some(&*sender));
    assert_eq!(sender.receiver_count("destroyed(ObjectId)"), 2);
    drop(sender);
    assert_eq!(forwarder.binding_count(), 0);
    assert_eq!(forwarder.sender_count(), 0);
}

#[test]
fn context_shared_by_several_senders() {
    let forwarder = SignalForwarder::new();
    let context = PlainObject::new();
    let a = CallbackTester::new();
    let b = CallbackTester::new();
    let (hits, adapter) = counter();
    forwarder.bind_with_context(&*a, "no_arg_signal()", adapter.clone(), Some(&*context));
    forwarder.bind_with_context(&*b, "no_arg_signal()", adapter.clone(), Some(&*context));
    forwarder.bind(&*b, "values_changed()", adapter);
    assert_eq!(context.core().receivers("destroyed(ObjectId)"), 1);

    drop(context);
    a.emit_no_arg_signal();
    b.emit_no_arg_signal();
    assert_eq!(hits.get(), 0);
    assert!(!forwarder.is_connected(&*a));
    assert!(forwarder.is_connected(&*b));
    b.add_value(1);
    assert_eq!(hits.get(), 1);
}

#[test]
fn context_that_is_also_a_sender() {
    let forwarder = SignalForwarder::new();
    let a = CallbackTester::new();
    let b = CallbackTester::new();
    let (hits, adapter) = counter();
    forwarder.bind_with_context(&*a, "no_arg_signal()", adapter.clone(), Some(&*b));
    forwarder.bind_with_context(&*b, "no_arg_signal()", adapter, Some(&*a));
    drop(b);
    a.emit_no_arg_signal();
    assert_eq!(hits.get(), 0);
    assert_eq!(forwarder.binding_count(), 0);
    assert_eq!(a.receiver_count("destroyed(ObjectId)"), 0);
}

#[test]
fn safe_binder_on_object() {
    let receiver = CallbackTester::new();
    let add = safe_bind(&receiver, |r: &CallbackTester, v: i32| {
        r.add_value(v);
        r.values().len()
    });
    assert_eq!(add.call((1,)), 1);
    drop(receiver);
    assert_eq!(add.call((2,)), 0);
}

// ── Capacity ──────────────────────────────────────────────────────────────

#[test]
fn capacity_limit_rejects_next_binding() {
    let forwarder = SignalForwarder::with_config(ForwarderConfig::default().with_max_bindings(3));
    let senders: Vec<Rc<CallbackTester>> = (0..4).map(|_| CallbackTester::new()).collect();
    let (_, adapter) = counter();
    for sender in &senders[..3] {
        assert!(forwarder.bind(&**sender, "no_arg_signal()", adapter.clone()));
    }
    assert!(!forwarder.can_add_signal_bindings());
    assert!(!forwarder.bind(&*senders[3], "no_arg_signal()", adapter.clone()));
    assert_eq!(senders[3].core().connection_count(), 0);

    // Event bindings are not capped.
    assert!(forwarder.bind_event(&*senders[3], EventType::Show, adapter));
}

#[test]
fn pool_grows_past_capacity() {
    proxy::configure(ForwarderConfig::default().with_max_bindings(100));
    let sender = CallbackTester::new();
    let (hits, adapter) = counter();
    let before = proxy::pool_size();
    for _ in 0..250 {
        assert!(proxy::connect(&*sender, "no_arg_signal()", adapter.clone()));
    }
    assert!(proxy::pool_size() >= before + 2);
    sender.emit_no_arg_signal();
    assert_eq!(hits.get(), 250);

    assert!(proxy::disconnect(&*sender, "no_arg_signal()"));
    sender.emit_no_arg_signal();
    assert_eq!(hits.get(), 250);
    assert_eq!(sender.core().connection_count(), 0);
    proxy::configure(ForwarderConfig::default());
}

// ── Events ────────────────────────────────────────────────────────────────

#[test]
fn events_are_forwarded_and_still_delivered() {
    let sender = CallbackTester::new();
    let (hits, adapter) = counter();
    assert!(proxy::connect_event(&*sender, EventType::Resize, adapter));
    send_event(&*sender, &Event::resize(3, 4));
    assert_eq!(hits.get(), 1);
    assert_eq!(sender.events(), vec![EventType::Resize]);
    assert!(proxy::disconnect_event(&*sender, EventType::Resize));
    send_event(&*sender, &Event::resize(3, 4));
    assert_eq!(hits.get(), 1);
}

#[test]
fn event_filter_predicate_gates_adapter() {
    let sender = CallbackTester::new();
    let (hits, adapter) = counter();
    assert!(proxy::connect_event_filtered(
        &*sender,
        EventType::Resize,
        adapter,
        |_: &dyn Object, event: &Event| matches!(
            event.data(),
            slotwire_core::EventData::Resize { width, .. } if *width > 100
        ),
    ));
    send_event(&*sender, &Event::resize(50, 50));
    assert_eq!(hits.get(), 0);
    send_event(&*sender, &Event::resize(200, 50));
    assert_eq!(hits.get(), 1);
}

#[test]
fn posted_events_reach_event_bindings() {
    let sender = CallbackTester::new();
    let (hits, adapter) = counter();
    proxy::connect_event(&*sender, EventType::User(7), adapter);
    EventLoop::current().post_event(&*sender, Event::new(EventType::User(7)));
    assert_eq!(hits.get(), 0);
    EventLoop::current().process_events();
    assert_eq!(hits.get(), 1);
}

// ── Proxies and free functions ────────────────────────────────────────────

#[test]
fn delayed_call_runs_after_delay() {
    let (hits, adapter) = counter();
    assert!(proxy::delayed_call(Duration::from_millis(50), adapter));
    EventLoop::current().process_events();
    assert_eq!(hits.get(), 0);
    EventLoop::current().run_for(Duration::from_millis(200));
    assert_eq!(hits.get(), 1);
}

#[test]
fn connect_with_sender_passes_emitter() {
    let a = CallbackTester::new();
    let b = CallbackTester::new();
    let method = "add_value_if_sender_is_self(WeakObject,i32)";
    assert!(proxy::connect_with_sender(&*a, "a_signal(i32)", &*a, method));
    assert!(proxy::connect_with_sender(&*b, "a_signal(i32)", &*a, method));
    a.emit_a_signal(1);
    b.emit_a_signal(2);
    assert_eq!(a.values(), vec![1]);
}

#[test]
fn per_sender_policy_attaches_one_proxy_per_sender() {
    proxy::configure(ForwarderConfig::default().with_policy(ProxyPolicy::PerSender));
    let a = CallbackTester::new();
    let b = CallbackTester::new();
    let (hits, adapter) = counter();
    assert!(proxy::connect(&*a, "no_arg_signal()", adapter.clone()));
    assert!(proxy::connect(&*b, "no_arg_signal()", adapter));
    let proxy_a = proxy::attached_proxy(&*a);
    let proxy_b = proxy::attached_proxy(&*b);
    assert!(!Rc::ptr_eq(&proxy_a, &proxy_b));
    assert_eq!(proxy_a.binding_count(), 1);

    a.emit_no_arg_signal();
    b.emit_no_arg_signal();
    assert_eq!(hits.get(), 2);

    assert!(proxy::disconnect(&*a, "no_arg_signal()"));
    assert_eq!(proxy_a.binding_count(), 0);
    proxy::configure(ForwarderConfig::default());
}
