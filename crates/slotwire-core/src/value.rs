//! Dynamically-typed values and argument lists.
//!
//! # Design
//!
//! Values cross the dispatch layer in two shapes:
//!
//! | Shape      | Ownership          | Used for                              |
//! |------------|--------------------|---------------------------------------|
//! | [`Value`]  | shared (`Rc`)      | arguments stored ahead of a call      |
//! | [`Arg`]    | borrowed           | the positional array of a single call |
//!
//! Signal payloads arrive as raw `&dyn Any` slots; the receiving side pairs
//! each slot with the parameter tag captured at connect time to build the
//! [`Arg`] array handed to an invocation.
//!
//! [`ArgList`] bridges statically-typed tuples (up to [`MAX_ARGS`]
//! elements) and these runtime arrays in both directions.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use smallvec::{SmallVec, smallvec};

use crate::error::InvokeError;
use crate::types::TypeTag;

/// Maximum number of arguments carried by a typed call or signal.
pub const MAX_ARGS: usize = 6;

/// Parameter type list of a method, signal or callable.
pub type TypeTags = SmallVec<[TypeTag; MAX_ARGS]>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Reference-counted container for a value of any `'static` type.
///
/// Cloning shares the payload.
#[derive(Clone)]
pub struct Value {
    tag: TypeTag,
    data: Rc<dyn Any>,
}

impl Value {
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            tag: TypeTag::of::<T>(),
            data: Rc::new(value),
        }
    }

    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        self.tag
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.tag == TypeTag::of::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.data).downcast_ref::<T>()
    }

    /// Clone the payload out if it has type `T`.
    #[must_use]
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Raw storage of the payload.
    #[must_use]
    pub fn as_any(&self) -> &dyn Any {
        &*self.data
    }

    /// Borrow the value as a tagged argument.
    #[must_use]
    pub fn as_arg(&self) -> Arg<'_> {
        Arg::tagged(self.tag, &*self.data)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.tag)
    }
}

// ---------------------------------------------------------------------------
// Arg
// ---------------------------------------------------------------------------

/// A (type tag, borrowed payload) pair; one entry of a positional argument
/// array.
///
/// The tag is what callers *claim* the payload is. Typed invocation always
/// checks the claim against the payload before reading it, so a wrong tag
/// produces an error rather than a misread.
#[derive(Clone, Copy)]
pub struct Arg<'a> {
    tag: TypeTag,
    data: &'a dyn Any,
}

impl<'a> Arg<'a> {
    /// Argument whose tag is derived from the payload's static type.
    #[must_use]
    pub fn new<T: Any>(value: &'a T) -> Self {
        Self {
            tag: TypeTag::of::<T>(),
            data: value,
        }
    }

    /// Argument with an explicitly supplied tag.
    #[must_use]
    pub const fn tagged(tag: TypeTag, data: &'a dyn Any) -> Self {
        Self { tag, data }
    }

    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        self.tag
    }

    #[must_use]
    pub const fn data(&self) -> &'a dyn Any {
        self.data
    }

    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<&'a T> {
        self.data.downcast_ref::<T>()
    }

    /// Whether the payload really has the tagged type.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.tag.matches(self.data)
    }
}

impl fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arg({})", self.tag)
    }
}

// ---------------------------------------------------------------------------
// ArgList
// ---------------------------------------------------------------------------

/// A statically-typed argument tuple.
///
/// Implemented for tuples of zero to [`MAX_ARGS`] elements whose element
/// types are `Clone + 'static`.
pub trait ArgList: Sized + 'static {
    /// Number of elements.
    const COUNT: usize;

    /// Type tag of every element, in order.
    fn type_tags() -> TypeTags;

    /// Rebuild the tuple from the first `COUNT` entries of `args`.
    ///
    /// Entries past `COUNT` are ignored. Each used entry must carry the
    /// exact element type both in its tag and in its payload.
    fn from_args(args: &[Arg<'_>]) -> Result<Self, InvokeError>;

    /// Borrow the tuple as a tagged argument array.
    fn with_args<R>(&self, f: impl FnOnce(&[Arg<'_>]) -> R) -> R;

    /// Borrow the tuple as a raw signal payload.
    fn with_raw<R>(&self, f: impl FnOnce(&[&dyn Any]) -> R) -> R;
}

fn extract<T: Any + Clone>(args: &[Arg<'_>], index: usize) -> Result<T, InvokeError> {
    let expected = TypeTag::of::<T>();
    let arg = args.get(index).ok_or(InvokeError::MissingArguments {
        expected: index + 1,
        supplied: args.len(),
    })?;
    if arg.type_tag() != expected {
        return Err(InvokeError::TypeMismatch {
            index,
            expected,
            actual: arg.type_tag(),
        });
    }
    arg.downcast::<T>()
        .cloned()
        .ok_or(InvokeError::TypeMismatch {
            index,
            expected,
            actual: arg.type_tag(),
        })
}

macro_rules! impl_arg_list {
    ($count:expr; $($T:ident $idx:tt),*) => {
        impl<$($T: Any + Clone),*> ArgList for ($($T,)*) {
            const COUNT: usize = $count;

            fn type_tags() -> TypeTags {
                smallvec![$(TypeTag::of::<$T>()),*]
            }

            fn from_args(args: &[Arg<'_>]) -> Result<Self, InvokeError> {
                if args.len() < Self::COUNT {
                    return Err(InvokeError::MissingArguments {
                        expected: Self::COUNT,
                        supplied: args.len(),
                    });
                }
                Ok(($(extract::<$T>(args, $idx)?,)*))
            }

            fn with_args<R>(&self, f: impl FnOnce(&[Arg<'_>]) -> R) -> R {
                f(&[$(Arg::new(&self.$idx)),*])
            }

            fn with_raw<R>(&self, f: impl FnOnce(&[&dyn Any]) -> R) -> R {
                f(&[$(&self.$idx as &dyn Any),*])
            }
        }
    };
}

impl_arg_list!(0;);
impl_arg_list!(1; A0 0);
impl_arg_list!(2; A0 0, A1 1);
impl_arg_list!(3; A0 0, A1 1, A2 2);
impl_arg_list!(4; A0 0, A1 1, A2 2, A3 3);
impl_arg_list!(5; A0 0, A1 1, A2 2, A3 3, A4 4);
impl_arg_list!(6; A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
