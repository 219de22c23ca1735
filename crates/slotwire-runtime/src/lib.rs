#![forbid(unsafe_code)]

//! Runtime: callbacks, adapters, weak binders and forwarding proxies.
//!
//! # Role in slotwire
//! `slotwire-runtime` connects signals and events of objects it does not own
//! to ordinary Rust callables, without ever keeping those objects alive.
//!
//! # Primary responsibilities
//! - **Callback**: a weakly-held receiver, one of its reflective methods and
//!   a sparse set of pre-bound arguments.
//! - **Adapter**: one shareable, type-erased wrapper for callbacks and
//!   plain functions alike, with a strict bind-time type check.
//! - **SafeBinder**: call a method through a weak handle, or get the return
//!   type's default if the receiver is gone.
//! - **SignalForwarder**: route signals and events of observed senders to
//!   adapters, tearing everything down when a sender is destroyed.
//! - **proxy**: per-thread forwarder acquisition plus the free
//!   `connect`/`disconnect`/`delayed_call` functions most code uses.
//!
//! # How it fits in the system
//! Everything here is built on the object model of `slotwire-core`:
//! reflection resolves methods and signals by signature, the connection
//! layer delivers payloads, and the event loop drives delayed calls.

pub mod adapter;
pub mod callback;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod proxy;
pub mod safe_bind;

pub use adapter::{Adapter, Functor, check_type_match};
pub use callback::Callback;
pub use config::{ForwarderConfig, ProxyPolicy};
pub use error::BindError;
pub use forwarder::{CONTEXT_DESTROYED_SLOT, EventPredicate, RESERVED_SLOTS, SignalForwarder};
pub use safe_bind::{IntoWeakHandle, Method, SafeBinder, WeakHandle, safe_bind};
