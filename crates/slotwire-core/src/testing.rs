//! Reflective fixture objects for tests.
//!
//! Compiled for this crate's own tests and, through the `test-helpers`
//! feature, for downstream test suites.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;

use crate::event::{Event, EventType};
use crate::meta::MetaObject;
use crate::object::{Object, ObjectCore, WeakObject};
use crate::value::ArgList;

/// Payload of `many_args`.
pub type ManyArgs = (i32, bool, f32, char, f64);

/// Object with a fixed set of signals and recording slots.
///
/// | Signals                       | Slots                                        |
/// |-------------------------------|----------------------------------------------|
/// | `a_signal(i32)`               | `add_value(i32)`                             |
/// | `no_arg_signal()`             | `add_tagged_value(i32,String)`               |
/// | `string_signal(String)`       | `add_value_if_sender_is_self(WeakObject,i32)`|
/// | `values_changed()`            | `record_many(i32,bool,f32,char,f64)`         |
/// | `float_signal(f32)`           | `clear_values()`                             |
/// | `many_args(i32,bool,f32,char,f64)` | `set_name(String)`                      |
///
/// `add_value` emits `values_changed()` after recording.
pub struct CallbackTester {
    core: ObjectCore,
    values: RefCell<Vec<i32>>,
    tagged: RefCell<Vec<(i32, String)>>,
    many: RefCell<Vec<ManyArgs>>,
    events: RefCell<Vec<EventType>>,
}

impl CallbackTester {
    pub fn meta() -> &'static MetaObject {
        static META: OnceLock<MetaObject> = OnceLock::new();
        META.get_or_init(|| {
            MetaObject::builder::<CallbackTester>("CallbackTester")
                .signal::<(i32,)>("a_signal")
                .signal::<()>("no_arg_signal")
                .signal::<(String,)>("string_signal")
                .signal::<()>("values_changed")
                .signal::<(f32,)>("float_signal")
                .signal::<ManyArgs>("many_args")
                .slot("add_value", |this: &CallbackTester, (value,): (i32,)| {
                    this.add_value(value);
                })
                .slot(
                    "add_tagged_value",
                    |this: &CallbackTester, (value, tag): (i32, String)| {
                        this.tagged.borrow_mut().push((value, tag));
                    },
                )
                .slot(
                    "add_value_if_sender_is_self",
                    |this: &CallbackTester, (sender, value): (WeakObject, i32)| {
                        if sender.id() == this.core.id() {
                            this.add_value(value);
                        }
                    },
                )
                .slot("record_many", |this: &CallbackTester, args: ManyArgs| {
                    this.many.borrow_mut().push(args);
                })
                .slot("clear_values", |this: &CallbackTester, (): ()| {
                    this.values.borrow_mut().clear();
                })
                .slot("set_name", |this: &CallbackTester, (name,): (String,)| {
                    this.core.set_object_name(name);
                })
                .build()
        })
    }

    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            core: ObjectCore::new(me, Self::meta()),
            values: RefCell::new(Vec::new()),
            tagged: RefCell::new(Vec::new()),
            many: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
        })
    }

    pub fn add_value(&self, value: i32) {
        self.values.borrow_mut().push(value);
        self.emit("values_changed()", ());
    }

    fn emit<A: ArgList>(&self, signature: &str, args: A) {
        let meta = self.core.meta_object();
        if let Some(signal) = meta.index_of_signal(signature) {
            args.with_raw(|raw| self.core.emit(signal, raw));
        }
    }

    pub fn emit_a_signal(&self, value: i32) {
        self.emit("a_signal(i32)", (value,));
    }

    pub fn emit_no_arg_signal(&self) {
        self.emit("no_arg_signal()", ());
    }

    pub fn emit_string_signal(&self, value: impl Into<String>) {
        self.emit("string_signal(String)", (value.into(),));
    }

    pub fn emit_float_signal(&self, value: f32) {
        self.emit("float_signal(f32)", (value,));
    }

    pub fn emit_many_args(&self, args: ManyArgs) {
        self.emit("many_args(i32,bool,f32,char,f64)", args);
    }

    #[must_use]
    pub fn values(&self) -> Vec<i32> {
        self.values.borrow().clone()
    }

    #[must_use]
    pub fn tagged(&self) -> Vec<(i32, String)> {
        self.tagged.borrow().clone()
    }

    #[must_use]
    pub fn many(&self) -> Vec<ManyArgs> {
        self.many.borrow().clone()
    }

    /// Event kinds that reached normal delivery.
    #[must_use]
    pub fn events(&self) -> Vec<EventType> {
        self.events.borrow().clone()
    }

    /// Live connections on the signal named by `signature`.
    #[must_use]
    pub fn receiver_count(&self, signature: &str) -> usize {
        self.core.receivers(signature)
    }
}

impl Object for CallbackTester {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn event(&self, event: &Event) -> bool {
        self.events.borrow_mut().push(event.kind());
        false
    }
}

/// Object with no signals or slots of its own.
pub struct PlainObject {
    core: ObjectCore,
}

impl PlainObject {
    fn meta() -> &'static MetaObject {
        static META: OnceLock<MetaObject> = OnceLock::new();
        META.get_or_init(|| MetaObject::builder::<PlainObject>("PlainObject").build())
    }

    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            core: ObjectCore::new(me, Self::meta()),
        })
    }
}

impl Object for PlainObject {
    fn core(&self) -> &ObjectCore {
        &self.core
    }
}
