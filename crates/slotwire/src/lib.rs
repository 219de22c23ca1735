#![forbid(unsafe_code)]

//! slotwire: lifetime-safe callback binding and signal forwarding.
//!
//! Facade over the workspace crates:
//!
//! | Crate               | Contents                                              |
//! |---------------------|-------------------------------------------------------|
//! | [`core`]            | objects, reflection, signals, events, timers, loop    |
//! | [`runtime`]         | callbacks, adapters, safe binders, forwarding proxies |
//!
//! Most applications only need the [`prelude`].
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use slotwire::prelude::*;
//! use slotwire::core::testing::CallbackTester;
//!
//! let sender = CallbackTester::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! proxy::connect(&*sender, "string_signal(String)", Adapter::new(move |s: String| {
//!     sink.borrow_mut().push(s);
//! }));
//! sender.emit_string_signal("hello");
//! assert_eq!(*seen.borrow(), vec![String::from("hello")]);
//! ```

pub use slotwire_core as core;
pub use slotwire_runtime as runtime;

#[cfg(feature = "tracing-json")]
pub use slotwire_core::logging;

pub mod prelude {
    //! The types and functions used by typical client code.

    pub use slotwire_core::{
        Event, EventLoop, EventType, MetaObject, Object, ObjectCore, ObjectPtr, Timer, Value,
        WeakObject,
    };
    pub use slotwire_runtime::{
        Adapter, BindError, Callback, ForwarderConfig, ProxyPolicy, SafeBinder, SignalForwarder,
        proxy, safe_bind,
    };
}
