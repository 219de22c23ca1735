//! Type-erased callables.
//!
//! An [`Adapter`] hides either a [`Callback`] or any `Fn` taking zero to
//! five arguments behind one interface: invoke with a runtime-typed argument
//! array, and report which argument types it still needs.
//!
//! | Variant    | `arg_types()`                 | `invoke(args)`                       |
//! |------------|-------------------------------|--------------------------------------|
//! | function   | its parameter types           | reads the first N args, then calls   |
//! | callback   | the callback's unbound types  | delegates to the callback            |
//!
//! Adapters are cheap to clone; clones share one payload and compare equal.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use slotwire_core::{Arg, ArgList, MAX_ARGS, TypeTag, TypeTags};
use tracing::warn;

use crate::callback::Callback;
use crate::error::BindError;

trait AdapterImpl {
    fn invoke(&self, args: &[Arg<'_>]) -> bool;
    fn arg_types(&self) -> TypeTags;
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// A function whose parameter list is the tuple `Args`.
///
/// Implemented for every `Fn(A0, .., An) -> R` with up to five parameters;
/// the return value is discarded.
pub trait Functor<Args>: 'static {
    fn call_with(&self, args: Args);
}

macro_rules! impl_functor {
    ($($A:ident),*) => {
        impl<F, R, $($A),*> Functor<($($A,)*)> for F
        where
            F: Fn($($A),*) -> R + 'static,
        {
            #[allow(non_snake_case)]
            fn call_with(&self, ($($A,)*): ($($A,)*)) {
                let _ = self($($A),*);
            }
        }
    };
}

impl_functor!();
impl_functor!(A0);
impl_functor!(A0, A1);
impl_functor!(A0, A1, A2);
impl_functor!(A0, A1, A2, A3);
impl_functor!(A0, A1, A2, A3, A4);

struct FunctorImpl<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<F, A> AdapterImpl for FunctorImpl<F, A>
where
    F: Functor<A>,
    A: ArgList,
{
    fn invoke(&self, args: &[Arg<'_>]) -> bool {
        match A::from_args(args) {
            Ok(args) => {
                self.f.call_with(args);
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to invoke function adapter");
                false
            }
        }
    }

    fn arg_types(&self) -> TypeTags {
        A::type_tags()
    }
}

struct CallbackImpl(Callback);

impl AdapterImpl for CallbackImpl {
    fn invoke(&self, args: &[Arg<'_>]) -> bool {
        self.0.invoke_with_args(args)
    }

    fn arg_types(&self) -> TypeTags {
        self.0.unbound_parameter_types()
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Type-erased, shareable callable.
#[derive(Clone)]
pub struct Adapter {
    inner: Rc<dyn AdapterImpl>,
}

impl Adapter {
    /// Wrap a function or closure.
    ///
    /// Closures need annotated parameter types, e.g. `|v: i32| ..`.
    #[must_use]
    pub fn new<F, A>(f: F) -> Self
    where
        F: Functor<A>,
        A: ArgList,
    {
        Self {
            inner: Rc::new(FunctorImpl {
                f,
                _args: PhantomData,
            }),
        }
    }

    /// Invoke with a positional argument array. Returns false if the call
    /// could not be made.
    pub fn invoke(&self, args: &[Arg<'_>]) -> bool {
        self.inner.invoke(args)
    }

    /// Invoke with a typed argument tuple.
    pub fn call<A: ArgList>(&self, args: A) -> bool {
        args.with_args(|args| self.invoke(args))
    }

    /// Types of the arguments this adapter consumes, capped at [`MAX_ARGS`].
    #[must_use]
    pub fn arg_types(&self) -> TypeTags {
        let mut types = self.inner.arg_types();
        types.truncate(MAX_ARGS);
        types
    }

    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.arg_types().len()
    }

    /// Whether both handles share one payload.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this is the marker a forwarder binds to a sender's
    /// `destroyed` signal.
    #[must_use]
    pub fn is_destroy_sentinel(&self) -> bool {
        SENTINEL
            .try_with(|sentinel| sentinel == self)
            .unwrap_or(false)
    }

    pub(crate) fn destroy_sentinel() -> Self {
        SENTINEL.with(Clone::clone)
    }
}

thread_local! {
    static SENTINEL: Adapter = Adapter::new(|| warn!("sender-destroyed marker invoked directly"));
}

impl From<Callback> for Adapter {
    fn from(callback: Callback) -> Self {
        Self {
            inner: Rc::new(CallbackImpl(callback)),
        }
    }
}

impl PartialEq for Adapter {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Adapter {}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<String> = self.arg_types().iter().map(TypeTag::name).collect();
        f.debug_struct("Adapter").field("arg_types", &types).finish()
    }
}

/// Check that `adapter` can be fed from a payload with parameter types
/// `params`.
///
/// Every argument the adapter consumes must have exactly the type of the
/// payload parameter at the same position. The adapter may consume fewer
/// arguments than the payload carries.
pub fn check_type_match(adapter: &Adapter, params: &[TypeTag]) -> Result<(), BindError> {
    for (index, expected) in adapter.arg_types().iter().enumerate() {
        let sent = params.get(index).ok_or(BindError::MissingArgument {
            index,
            expected: *expected,
        })?;
        if sent != expected {
            return Err(BindError::TypeMismatch {
                index,
                sent: *sent,
                expected: *expected,
            });
        }
    }
    Ok(())
}
