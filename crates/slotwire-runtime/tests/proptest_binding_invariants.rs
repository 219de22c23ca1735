//! Property-based invariant tests for callbacks and forwarder tables.
//!
//! **Callback:**
//! 1. Supplied values fill unbound positions lowest first, whatever
//!    position was pre-bound.
//!
//! **SignalForwarder** under random bind/unbind/destroy/emit sequences:
//! 2. `binding_count` equals the number of live bindings in a simple model.
//! 3. Every emission invokes exactly the bindings of that sender and signal.
//! 4. A sender has a destruction subscription iff it has any binding.
//! 5. Destroyed senders leave nothing behind.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use slotwire_core::testing::CallbackTester;
use slotwire_core::{Event, EventType, Object, send_event};
use slotwire_runtime::{Adapter, Callback, SignalForwarder};

// ── Strategies ────────────────────────────────────────────────────────────

const SENDERS: usize = 3;
const SIGNALS: [&str; 3] = ["no_arg_signal()", "values_changed()", "a_signal(i32)"];

#[derive(Debug, Clone)]
enum Op {
    Bind(usize, usize),
    BindEvent(usize),
    Unbind(usize, usize),
    UnbindEvent(usize),
    UnbindAll(usize),
    Destroy(usize),
    Emit(usize, usize),
    SendEvent(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let sender = 0..SENDERS;
    let signal = 0..SIGNALS.len();
    prop_oneof![
        4 => (sender.clone(), signal.clone()).prop_map(|(s, g)| Op::Bind(s, g)),
        2 => sender.clone().prop_map(Op::BindEvent),
        2 => (sender.clone(), signal.clone()).prop_map(|(s, g)| Op::Unbind(s, g)),
        1 => sender.clone().prop_map(Op::UnbindEvent),
        1 => sender.clone().prop_map(Op::UnbindAll),
        1 => sender.clone().prop_map(Op::Destroy),
        3 => (sender.clone(), signal).prop_map(|(s, g)| Op::Emit(s, g)),
        2 => sender.prop_map(Op::SendEvent),
    ]
}

// ── Helpers ───────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
struct SenderModel {
    signals: [usize; SIGNALS.len()],
    events: usize,
}

impl SenderModel {
    fn total(&self) -> usize {
        self.signals.iter().sum::<usize>() + self.events
    }
}

fn emit(sender: &CallbackTester, signal: usize) {
    match signal {
        0 => sender.emit_no_arg_signal(),
        1 => sender.add_value(0),
        _ => sender.emit_a_signal(0),
    }
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn positional_fill_order(bound_at in 0usize..2, value in any::<i32>(), tag in "[a-z]{0,8}") {
        let receiver = CallbackTester::new();
        let callback = Callback::new(&*receiver, "add_tagged_value(i32,String)");
        let ok = if bound_at == 0 {
            callback.with_arg_at(0, value).invoke((tag.clone(),))
        } else {
            callback.with_arg_at(1, tag.clone()).invoke((value,))
        };
        prop_assert!(ok);
        prop_assert_eq!(receiver.tagged(), vec![(value, tag)]);
    }

    #[test]
    fn forwarder_matches_model(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let forwarder = SignalForwarder::new();
        let mut senders: Vec<Option<Rc<CallbackTester>>> =
            (0..SENDERS).map(|_| Some(CallbackTester::new())).collect();
        let mut model = vec![SenderModel::default(); SENDERS];
        let hits = Rc::new(Cell::new(0usize));
        let sink = Rc::clone(&hits);
        let adapter = Adapter::new(move || sink.set(sink.get() + 1));
        let mut expected_hits = 0usize;

        for op in ops {
            match op {
                Op::Bind(s, g) => {
                    if let Some(sender) = &senders[s] {
                        prop_assert!(forwarder.bind(&**sender, SIGNALS[g], adapter.clone()));
                        model[s].signals[g] += 1;
                    }
                }
                Op::BindEvent(s) => {
                    if let Some(sender) = &senders[s] {
                        prop_assert!(forwarder.bind_event(&**sender, EventType::Show, adapter.clone()));
                        model[s].events += 1;
                    }
                }
                Op::Unbind(s, g) => {
                    if let Some(sender) = &senders[s] {
                        let removed = forwarder.unbind(&**sender, SIGNALS[g]);
                        prop_assert_eq!(removed, model[s].signals[g] > 0);
                        model[s].signals[g] = 0;
                    }
                }
                Op::UnbindEvent(s) => {
                    if let Some(sender) = &senders[s] {
                        let removed = forwarder.unbind_event(&**sender, EventType::Show);
                        prop_assert_eq!(removed, model[s].events > 0);
                        model[s].events = 0;
                    }
                }
                Op::UnbindAll(s) => {
                    if let Some(sender) = &senders[s] {
                        let removed = forwarder.unbind_all(&**sender);
                        prop_assert_eq!(removed, model[s].total() > 0);
                        model[s] = SenderModel::default();
                    }
                }
                Op::Destroy(s) => {
                    senders[s] = None;
                    model[s] = SenderModel::default();
                }
                Op::Emit(s, g) => {
                    if let Some(sender) = &senders[s] {
                        emit(sender, g);
                        expected_hits += model[s].signals[g];
                    }
                }
                Op::SendEvent(s) => {
                    if let Some(sender) = &senders[s] {
                        send_event(&**sender, &Event::new(EventType::Show));
                        expected_hits += model[s].events;
                    }
                }
            }

            let total: usize = model.iter().map(SenderModel::total).sum();
            prop_assert_eq!(forwarder.binding_count(), total);
            prop_assert_eq!(hits.get(), expected_hits);
            for (sender, m) in senders.iter().zip(&model) {
                if let Some(sender) = sender {
                    let connected = m.total() > 0;
                    prop_assert_eq!(forwarder.is_connected(&**sender), connected);
                    prop_assert_eq!(
                        sender.receiver_count("destroyed(ObjectId)"),
                        usize::from(connected)
                    );
                    prop_assert_eq!(
                        sender.core().has_event_filter(forwarder.id()),
                        m.events > 0
                    );
                }
            }
            let live = model.iter().filter(|m| m.total() > 0).count();
            prop_assert_eq!(forwarder.sender_count(), live);
        }
    }
}
