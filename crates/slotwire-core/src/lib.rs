#![forbid(unsafe_code)]

//! Core: objects, reflection metadata, signals, events and timers.
//!
//! # Role in slotwire
//! `slotwire-core` is the object model the dispatch layer is built on. It
//! does not know about callbacks or proxies; it supplies the capabilities
//! they consume.
//!
//! # Primary responsibilities
//! - **Reflection**: per-class [`MetaObject`] tables; resolve a method by
//!   signature, list its parameter types, invoke it with a runtime-typed
//!   argument array.
//! - **Values**: [`Value`] and [`Arg`], dynamically-typed containers tagged
//!   with a [`TypeTag`].
//! - **Signals**: weak connections from a sender's signal to a numbered slot
//!   of a [`Receiver`], plus the `destroyed(ObjectId)` notification every
//!   object raises exactly once.
//! - **Events**: synchronous delivery with first-look [`EventFilter`]s.
//! - **Timers**: [`Timer`] objects driven by the thread's [`EventLoop`].
//!
//! # How it fits in the system
//! `slotwire-runtime` builds callbacks, weak binders and forwarding proxies
//! on top of these types. Application objects embed an [`ObjectCore`] and
//! describe themselves with a [`MetaObject`]; nothing else is required for
//! them to take part in forwarding.

pub mod connection;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod logging;
pub mod meta;
pub mod object;
pub mod signature;
pub mod timer;
pub mod types;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use connection::{Delivery, Receiver, SenderInfo, SlotId, current_sender};
pub use error::InvokeError;
pub use event::{
    Event, EventData, EventFilter, EventType, KeyCode, Modifiers, MouseButton, Position,
    send_event,
};
pub use event_loop::EventLoop;
pub use meta::{MetaMethod, MetaObject, MetaObjectBuilder, MethodIndex, MethodKind};
pub use object::{AsAny, Object, ObjectCore, ObjectId, ObjectPtr, WeakObject};
pub use signature::normalize_signature;
pub use timer::Timer;
pub use types::TypeTag;
pub use value::{Arg, ArgList, MAX_ARGS, TypeTags, Value};
