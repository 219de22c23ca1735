#![forbid(unsafe_code)]

//! Reflection metadata: per-class method tables.
//!
//! # Design
//!
//! Every object class owns one [`MetaObject`], built once by a
//! [`MetaObjectBuilder`] and kept in a `static OnceLock`. It lists the
//! class's signals and slots as [`MetaMethod`]s, each with a stable
//! [`MethodIndex`], a canonical signature string and its declared parameter
//! types.
//!
//! Index 0 of every class is the `destroyed(ObjectId)` signal, raised once
//! when the object's [`ObjectCore`](crate::object::ObjectCore) is dropped.
//!
//! # Invariants
//!
//! 1. Method indices are dense and stable for the life of the process.
//! 2. [`MetaMethod::invoke`] never reads an argument whose tag or payload
//!    disagrees with the declared parameter type.
//! 3. Invoking a signal emits it on the receiver; `destroyed` cannot be
//!    invoked.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use std::sync::OnceLock;
//! use slotwire_core::meta::MetaObject;
//! use slotwire_core::object::{Object, ObjectCore};
//!
//! struct Button {
//!     core: ObjectCore,
//! }
//!
//! impl Button {
//!     fn meta() -> &'static MetaObject {
//!         static META: OnceLock<MetaObject> = OnceLock::new();
//!         META.get_or_init(|| {
//!             MetaObject::builder::<Button>("Button")
//!                 .signal::<()>("clicked")
//!                 .build()
//!         })
//!     }
//!
//!     fn new() -> Rc<Self> {
//!         Rc::new_cyclic(|me| Self { core: ObjectCore::new(me, Self::meta()) })
//!     }
//! }
//!
//! impl Object for Button {
//!     fn core(&self) -> &ObjectCore {
//!         &self.core
//!     }
//! }
//!
//! let button = Button::new();
//! assert!(button.core().meta_object().index_of_signal("clicked()").is_some());
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::error::InvokeError;
use crate::object::{Object, ObjectId};
use crate::signature::{make_signature, method_name, normalize_signature};
use crate::types::TypeTag;
use crate::value::{Arg, ArgList, MAX_ARGS, TypeTags};

/// Position of a method in its class's [`MetaObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodIndex(usize);

impl MethodIndex {
    /// The `destroyed(ObjectId)` signal present on every class.
    pub const DESTROYED: Self = Self(0);

    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for MethodIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Signal,
    Slot,
}

/// Type-erased body of an invokable method.
pub type Invoker =
    Box<dyn Fn(&dyn Object, &[Arg<'_>]) -> Result<(), InvokeError> + Send + Sync + 'static>;

/// One signal or slot of a class.
pub struct MetaMethod {
    index: MethodIndex,
    kind: MethodKind,
    signature: String,
    params: TypeTags,
    invoker: Option<Invoker>,
}

impl MetaMethod {
    #[must_use]
    pub const fn index(&self) -> MethodIndex {
        self.index
    }

    #[must_use]
    pub const fn kind(&self) -> MethodKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        method_name(&self.signature)
    }

    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    #[must_use]
    pub fn param_types(&self) -> &[TypeTag] {
        &self.params
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    /// Call the method on `receiver` with a positional argument array.
    ///
    /// `args` must hold at least one entry per declared parameter, each
    /// tagged with exactly the declared type; extra entries are ignored.
    pub fn invoke(&self, receiver: &dyn Object, args: &[Arg<'_>]) -> Result<(), InvokeError> {
        let Some(invoker) = &self.invoker else {
            return Err(InvokeError::NotInvokable {
                signature: self.signature.clone(),
            });
        };
        if args.len() < self.params.len() {
            return Err(InvokeError::MissingArguments {
                expected: self.params.len(),
                supplied: args.len(),
            });
        }
        for (index, (expected, arg)) in self.params.iter().zip(args).enumerate() {
            if arg.type_tag() != *expected || !arg.is_consistent() {
                return Err(InvokeError::TypeMismatch {
                    index,
                    expected: *expected,
                    actual: arg.type_tag(),
                });
            }
        }
        invoker(receiver, &args[..self.params.len()])
    }
}

impl fmt::Debug for MetaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaMethod")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("signature", &self.signature)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MetaObject
// ---------------------------------------------------------------------------

/// Method table of one object class.
pub struct MetaObject {
    class_name: &'static str,
    methods: Vec<MetaMethod>,
    by_signature: AHashMap<String, MethodIndex>,
}

impl MetaObject {
    /// Start describing the class `T`.
    #[must_use]
    pub fn builder<T: Object>(class_name: &'static str) -> MetaObjectBuilder<T> {
        MetaObjectBuilder::new(class_name)
    }

    #[must_use]
    pub const fn class_name(&self) -> &'static str {
        self.class_name
    }

    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn method(&self, index: MethodIndex) -> Option<&MetaMethod> {
        self.methods.get(index.0)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MetaMethod> {
        self.methods.iter()
    }

    /// Resolve a signature, verbatim first and normalized second.
    #[must_use]
    pub fn index_of_method(&self, signature: &str) -> Option<MethodIndex> {
        self.by_signature
            .get(signature)
            .or_else(|| self.by_signature.get(&normalize_signature(signature)))
            .copied()
    }

    /// Like [`index_of_method`](Self::index_of_method), restricted to signals.
    #[must_use]
    pub fn index_of_signal(&self, signature: &str) -> Option<MethodIndex> {
        self.index_of_method(signature)
            .filter(|index| self.methods[index.0].kind == MethodKind::Signal)
    }

    #[must_use]
    pub fn find_method(&self, signature: &str) -> Option<&MetaMethod> {
        self.index_of_method(signature)
            .and_then(|index| self.method(index))
    }
}

impl fmt::Debug for MetaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaObject")
            .field("class_name", &self.class_name)
            .field("methods", &self.methods)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Declares the signals and slots of the class `T`.
pub struct MetaObjectBuilder<T> {
    class_name: &'static str,
    methods: Vec<MetaMethod>,
    _class: PhantomData<fn() -> T>,
}

impl<T: Object> MetaObjectBuilder<T> {
    fn new(class_name: &'static str) -> Self {
        let builder = Self {
            class_name,
            methods: Vec::new(),
            _class: PhantomData,
        };
        builder.push(
            MethodKind::Signal,
            "destroyed",
            <(ObjectId,)>::type_tags(),
            None,
        )
    }

    fn push(
        mut self,
        kind: MethodKind,
        name: &str,
        params: TypeTags,
        invoker: Option<Invoker>,
    ) -> Self {
        debug_assert!(params.len() <= MAX_ARGS);
        let signature = make_signature(name, &params);
        debug_assert!(
            !self.methods.iter().any(|m| m.signature == signature),
            "duplicate method {signature} on {}",
            self.class_name
        );
        self.methods.push(MetaMethod {
            index: MethodIndex(self.methods.len()),
            kind,
            signature,
            params,
            invoker,
        });
        self
    }

    /// Declare a signal carrying the argument tuple `A`.
    #[must_use]
    pub fn signal<A: ArgList>(self, name: &str) -> Self {
        let index = MethodIndex(self.methods.len());
        let invoker: Invoker = Box::new(move |receiver: &dyn Object, args: &[Arg<'_>]| {
            let raw: SmallVec<[&dyn Any; MAX_ARGS]> = args.iter().map(Arg::data).collect();
            receiver.core().emit(index, &raw);
            Ok(())
        });
        self.push(MethodKind::Signal, name, A::type_tags(), Some(invoker))
    }

    /// Declare a slot taking the argument tuple `A`.
    ///
    /// The slot's return value is discarded by reflective calls.
    #[must_use]
    pub fn slot<A, R, F>(self, name: &str, body: F) -> Self
    where
        A: ArgList,
        F: Fn(&T, A) -> R + Send + Sync + 'static,
    {
        let class = self.class_name;
        let invoker: Invoker = Box::new(move |receiver: &dyn Object, args: &[Arg<'_>]| {
            let this = receiver
                .as_any()
                .downcast_ref::<T>()
                .ok_or(InvokeError::WrongReceiver { class })?;
            let args = A::from_args(args)?;
            body(this, args);
            Ok(())
        });
        self.push(MethodKind::Slot, name, A::type_tags(), Some(invoker))
    }

    #[must_use]
    pub fn build(self) -> MetaObject {
        let by_signature = self
            .methods
            .iter()
            .map(|m| (m.signature.clone(), m.index))
            .collect();
        MetaObject {
            class_name: self.class_name,
            methods: self.methods,
            by_signature,
        }
    }
}
