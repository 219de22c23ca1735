//! Bound-method callbacks.
//!
//! # Design
//!
//! A [`Callback`] names a receiver object (held weakly), a method resolved
//! once from the receiver's [`MetaObject`](slotwire_core::MetaObject), and a
//! sparse set of pre-bound arguments keyed by parameter position.
//!
//! Invocation builds the full positional argument array left to right: a
//! bound position uses its bound value, any other position takes the next
//! supplied argument. So a callback with position 1 bound to `V1`, invoked
//! with one supplied value `V0`, calls the method with `(V0, V1)`.
//!
//! # Invariants
//!
//! 1. A position is bound at most once; rebinding overwrites.
//! 2. [`Callback::bind_next`] fills the lowest unbound position.
//! 3. A callback never keeps its receiver alive.
//! 4. Clones share their payload until one of them binds (copy-on-write).
//!
//! # Failure Modes
//!
//! Invocation fails (false plus a `warn!`) when, checked in this order:
//! the receiver is gone, the method was not found, a bound value's type no
//! longer matches its parameter, the supplied arguments run out before
//! every position is filled, or the method itself rejects the call.
//!
//! Binding past the parameter count is a caller bug and trips a debug
//! assertion.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use slotwire_core::{
    Arg, ArgList, InvokeError, MAX_ARGS, MetaMethod, Object, TypeTag, TypeTags, Value,
    WeakObject,
};
use smallvec::SmallVec;
use tracing::warn;

#[derive(Clone)]
struct BoundArg {
    index: usize,
    value: Value,
}

#[derive(Clone, Default)]
struct CallbackData {
    receiver: Option<WeakObject>,
    method: Option<&'static MetaMethod>,
    args: SmallVec<[BoundArg; 5]>,
}

/// A receiver, one of its methods and some pre-bound arguments.
#[derive(Clone, Default)]
pub struct Callback {
    d: Rc<CallbackData>,
}

impl Callback {
    /// Unbound callback; invoking it always fails.
    #[must_use]
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Callback to `method` (a signature such as `"add_value(i32)"`) on
    /// `receiver`.
    ///
    /// An unknown method is logged and leaves the callback permanently
    /// invalid.
    #[must_use]
    pub fn new(receiver: &dyn Object, method: &str) -> Self {
        let meta = receiver.core().meta_object();
        let resolved = meta.find_method(method);
        if resolved.is_none() {
            warn!(class = meta.class_name(), method, "method not found");
        }
        Self {
            d: Rc::new(CallbackData {
                receiver: Some(receiver.core().weak()),
                method: resolved,
                args: SmallVec::new(),
            }),
        }
    }

    /// Store `value` at parameter `index`, replacing any earlier value.
    pub fn bind_at(&mut self, index: usize, value: Value) {
        debug_assert!(
            index < self.parameter_count(),
            "argument index {index} out of range for {} parameters",
            self.parameter_count()
        );
        let args = &mut Rc::make_mut(&mut self.d).args;
        match args.iter_mut().find(|arg| arg.index == index) {
            Some(slot) => slot.value = value,
            None => args.push(BoundArg { index, value }),
        }
    }

    /// Store `value` at the lowest unbound position.
    pub fn bind_next(&mut self, value: Value) {
        let index = self.next_unbound();
        self.bind_at(index, value);
    }

    /// Like [`bind_at`](Self::bind_at), but check the position and the
    /// value's type against the method's declaration first.
    pub fn try_bind_at(&mut self, index: usize, value: Value) -> Result<(), InvokeError> {
        let method = self.d.method.ok_or(InvokeError::MethodNotFound)?;
        let expected = method
            .param_types()
            .get(index)
            .copied()
            .ok_or(InvokeError::ArgumentOutOfRange {
                index,
                count: method.parameter_count(),
            })?;
        if value.type_tag() != expected {
            return Err(InvokeError::TypeMismatch {
                index,
                expected,
                actual: value.type_tag(),
            });
        }
        self.bind_at(index, value);
        Ok(())
    }

    /// Chaining form of [`bind_next`](Self::bind_next).
    #[must_use]
    pub fn with_arg<T: Any>(mut self, value: T) -> Self {
        self.bind_next(Value::new(value));
        self
    }

    /// Chaining form of [`bind_at`](Self::bind_at).
    #[must_use]
    pub fn with_arg_at<T: Any>(mut self, index: usize, value: T) -> Self {
        self.bind_at(index, Value::new(value));
        self
    }

    fn next_unbound(&self) -> usize {
        let bound = &self.d.args;
        let index = (0..=bound.len())
            .find(|i| !bound.iter().any(|arg| arg.index == *i))
            .unwrap_or(bound.len());
        debug_assert!(
            index < self.parameter_count(),
            "no unbound parameter left on {}",
            self.method_signature().unwrap_or("<unresolved>")
        );
        index
    }

    /// Parameters declared by the method; 0 if it was not found.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.d.method.map_or(0, MetaMethod::parameter_count)
    }

    #[must_use]
    pub fn unbound_parameter_count(&self) -> usize {
        self.unbound_parameter_types().len()
    }

    /// Declared types of the positions not yet bound, in order, capped at
    /// [`MAX_ARGS`].
    #[must_use]
    pub fn unbound_parameter_types(&self) -> TypeTags {
        let Some(method) = self.d.method else {
            return TypeTags::new();
        };
        method
            .param_types()
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.is_bound(*index))
            .map(|(_, tag)| *tag)
            .take(MAX_ARGS)
            .collect()
    }

    fn is_bound(&self, index: usize) -> bool {
        self.d.args.iter().any(|arg| arg.index == index)
    }

    #[must_use]
    pub fn bound_value(&self, index: usize) -> Option<&Value> {
        self.d
            .args
            .iter()
            .find(|arg| arg.index == index)
            .map(|arg| &arg.value)
    }

    #[must_use]
    pub fn method_signature(&self) -> Option<&'static str> {
        self.d.method.map(MetaMethod::signature)
    }

    #[must_use]
    pub fn receiver(&self) -> Option<&WeakObject> {
        self.d.receiver.as_ref()
    }

    /// Whether the receiver is alive and the method was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.d.method.is_some() && self.d.receiver.as_ref().is_some_and(WeakObject::is_alive)
    }

    /// Whether both handles share one payload.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.d, &other.d)
    }

    /// Call the method, filling unbound positions from `args` in order.
    pub fn try_invoke_with_args(&self, args: &[Arg<'_>]) -> Result<(), InvokeError> {
        let receiver = self
            .d
            .receiver
            .as_ref()
            .and_then(WeakObject::upgrade)
            .ok_or(InvokeError::ReceiverDestroyed)?;
        let method = self.d.method.ok_or(InvokeError::MethodNotFound)?;

        let mut supplied = args.iter();
        let mut full: SmallVec<[Arg<'_>; MAX_ARGS]> = SmallVec::new();
        for (index, expected) in method.param_types().iter().enumerate() {
            if let Some(bound) = self.bound_value(index) {
                if bound.type_tag() != *expected {
                    return Err(InvokeError::TypeMismatch {
                        index,
                        expected: *expected,
                        actual: bound.type_tag(),
                    });
                }
                full.push(bound.as_arg());
            } else {
                let arg = supplied
                    .next()
                    .ok_or(InvokeError::ArgumentNotBound { index })?;
                full.push(*arg);
            }
        }
        method.invoke(&*receiver, &full)
    }

    /// [`try_invoke_with_args`](Self::try_invoke_with_args), logging the
    /// failure instead of returning it.
    pub fn invoke_with_args(&self, args: &[Arg<'_>]) -> bool {
        match self.try_invoke_with_args(args) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    method = self.method_signature().unwrap_or("<unresolved>"),
                    error = %err,
                    "failed to invoke callback"
                );
                false
            }
        }
    }

    /// Invoke with a typed argument tuple.
    pub fn invoke<A: ArgList>(&self, args: A) -> bool {
        args.with_args(|args| self.invoke_with_args(args))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<(usize, TypeTag)> = self
            .d
            .args
            .iter()
            .map(|arg| (arg.index, arg.value.type_tag()))
            .collect();
        f.debug_struct("Callback")
            .field("receiver", &self.d.receiver)
            .field("method", &self.method_signature())
            .field("bound", &bound)
            .finish()
    }
}
