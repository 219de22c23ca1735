//! Destruction-safe method binding.
//!
//! [`safe_bind`] pairs a weak handle to a receiver with a method taking the
//! receiver by reference. Calling the resulting [`SafeBinder`] promotes the
//! handle for the duration of the call only; if the receiver is gone the
//! call is skipped and the method's return type's default value comes back
//! instead.
//!
//! Which weak handle is used is decided at compile time through
//! [`IntoWeakHandle`]:
//!
//! | Argument              | Handle                 |
//! |-----------------------|------------------------|
//! | `&Rc<T>`, `T: Object` | [`ObjectPtr<T>`]       |
//! | `&Arc<T>`             | `sync::Weak<T>`        |
//! | `rc::Weak<T>`         | itself                 |
//! | `sync::Weak<T>`       | itself                 |
//! | `ObjectPtr<T>`        | itself                 |
//! | [`WeakObject`]        | itself                 |
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use slotwire_runtime::safe_bind;
//!
//! struct Counter(Cell<u32>);
//!
//! impl Counter {
//!     fn bump(&self, by: u32) -> u32 {
//!         self.0.set(self.0.get() + by);
//!         self.0.get()
//!     }
//! }
//!
//! let counter = Rc::new(Counter(Cell::new(0)));
//! let bump = safe_bind(Rc::downgrade(&counter), Counter::bump);
//! assert_eq!(bump.call((2,)), 2);
//! drop(counter);
//! assert_eq!(bump.call((2,)), 0);
//! ```

use std::ops::Deref;
use std::rc::{self, Rc};
use std::sync::{self, Arc};

use slotwire_core::{Object, ObjectPtr, WeakObject};
use tracing::trace;

/// A weak reference that can be promoted to a strong one.
pub trait WeakHandle {
    type Target: ?Sized;
    type Strong: Deref<Target = Self::Target>;

    fn promote(&self) -> Option<Self::Strong>;
}

impl<T: ?Sized> WeakHandle for rc::Weak<T> {
    type Target = T;
    type Strong = Rc<T>;

    fn promote(&self) -> Option<Rc<T>> {
        self.upgrade()
    }
}

impl<T: ?Sized> WeakHandle for sync::Weak<T> {
    type Target = T;
    type Strong = Arc<T>;

    fn promote(&self) -> Option<Arc<T>> {
        self.upgrade()
    }
}

impl<T: ?Sized> WeakHandle for ObjectPtr<T> {
    type Target = T;
    type Strong = Rc<T>;

    fn promote(&self) -> Option<Rc<T>> {
        self.upgrade()
    }
}

impl WeakHandle for WeakObject {
    type Target = dyn Object;
    type Strong = Rc<dyn Object>;

    fn promote(&self) -> Option<Rc<dyn Object>> {
        self.upgrade()
    }
}

/// Conversion into the weak handle a [`SafeBinder`] holds.
pub trait IntoWeakHandle {
    type Handle: WeakHandle;

    fn into_weak_handle(self) -> Self::Handle;
}

impl<T: Object> IntoWeakHandle for &Rc<T> {
    type Handle = ObjectPtr<T>;

    fn into_weak_handle(self) -> ObjectPtr<T> {
        ObjectPtr::new(self)
    }
}

impl<T: ?Sized> IntoWeakHandle for &Arc<T> {
    type Handle = sync::Weak<T>;

    fn into_weak_handle(self) -> sync::Weak<T> {
        Arc::downgrade(self)
    }
}

impl<T: ?Sized> IntoWeakHandle for rc::Weak<T> {
    type Handle = Self;

    fn into_weak_handle(self) -> Self {
        self
    }
}

impl<T: ?Sized> IntoWeakHandle for sync::Weak<T> {
    type Handle = Self;

    fn into_weak_handle(self) -> Self {
        self
    }
}

impl<T: ?Sized> IntoWeakHandle for ObjectPtr<T> {
    type Handle = Self;

    fn into_weak_handle(self) -> Self {
        self
    }
}

impl IntoWeakHandle for WeakObject {
    type Handle = Self;

    fn into_weak_handle(self) -> Self {
        self
    }
}

/// A method on `T` taking the argument tuple `Args`.
///
/// Implemented for every `Fn(&T, A0, .., An) -> R` with up to three
/// arguments after the receiver.
pub trait Method<T: ?Sized, Args> {
    type Output;

    fn call_on(&self, target: &T, args: Args) -> Self::Output;
}

macro_rules! impl_method {
    ($($A:ident),*) => {
        impl<F, T, R, $($A),*> Method<T, ($($A,)*)> for F
        where
            T: ?Sized,
            F: Fn(&T, $($A),*) -> R,
        {
            type Output = R;

            #[allow(non_snake_case)]
            fn call_on(&self, target: &T, ($($A,)*): ($($A,)*)) -> R {
                self(target, $($A),*)
            }
        }
    };
}

impl_method!();
impl_method!(A0);
impl_method!(A0, A1);
impl_method!(A0, A1, A2);

/// A receiver method that is only called while the receiver is alive.
#[derive(Clone)]
pub struct SafeBinder<W, F> {
    receiver: W,
    method: F,
}

impl<W: WeakHandle, F> SafeBinder<W, F> {
    /// Call the method if the receiver is alive; otherwise return
    /// `Default::default()` without calling it.
    pub fn call<Args>(&self, args: Args) -> F::Output
    where
        F: Method<W::Target, Args>,
        F::Output: Default,
    {
        match self.receiver.promote() {
            Some(receiver) => self.method.call_on(&*receiver, args),
            None => {
                trace!("receiver gone; skipping bound call");
                F::Output::default()
            }
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.receiver.promote().is_some()
    }

    #[must_use]
    pub fn receiver(&self) -> &W {
        &self.receiver
    }
}

/// Bind `method` to a weakly-held `receiver`.
#[must_use]
pub fn safe_bind<H, F>(receiver: H, method: F) -> SafeBinder<H::Handle, F>
where
    H: IntoWeakHandle,
{
    SafeBinder {
        receiver: receiver.into_weak_handle(),
        method,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::sync::Mutex;

    use slotwire_core::testing::CallbackTester;

    use super::*;

    struct Account {
        balance: Cell<i64>,
        history: RefCell<Vec<String>>,
    }

    impl Account {
        fn new() -> Self {
            Self {
                balance: Cell::new(0),
                history: RefCell::new(Vec::new()),
            }
        }

        fn balance(&self) -> i64 {
            self.balance.get()
        }

        fn deposit(&self, amount: i64) -> i64 {
            self.balance.set(self.balance.get() + amount);
            self.balance.get()
        }

        fn transfer(&self, amount: i64, memo: String, fee: i64) -> bool {
            self.balance.set(self.balance.get() - amount - fee);
            self.history.borrow_mut().push(memo);
            true
        }
    }

    #[test]
    fn calls_while_alive_and_defaults_after() {
        let account = Rc::new(Account::new());
        let deposit = safe_bind(Rc::downgrade(&account), Account::deposit);
        let balance = safe_bind(Rc::downgrade(&account), Account::balance);
        assert_eq!(deposit.call((10,)), 10);
        assert_eq!(balance.call(()), 10);
        assert!(deposit.is_alive());

        drop(account);
        assert!(!deposit.is_alive());
        assert_eq!(deposit.call((10,)), 0);
        assert_eq!(balance.call(()), 0);
    }

    #[test]
    fn three_arguments() {
        let account = Rc::new(Account::new());
        let transfer = safe_bind(Rc::downgrade(&account), Account::transfer);
        assert!(transfer.call((5, String::from("rent"), 1)));
        assert_eq!(account.balance(), -6);
        assert_eq!(*account.history.borrow(), vec![String::from("rent")]);
        drop(account);
        assert!(!transfer.call((5, String::from("rent"), 1)));
    }

    #[test]
    fn object_receivers_use_object_ptr() {
        let tester = CallbackTester::new();
        let add = safe_bind(&tester, |t: &CallbackTester, v: i32| t.add_value(v));
        let _: &ObjectPtr<CallbackTester> = add.receiver();
        add.call((3,));
        assert_eq!(tester.values(), vec![3]);
        drop(tester);
        add.call((4,));
        assert!(!add.is_alive());
    }

    #[test]
    fn arc_receivers_use_sync_weak() {
        let shared = Arc::new(Mutex::new(0_u32));
        let bump = safe_bind(&shared, |m: &Mutex<u32>| {
            let mut guard = m.lock().expect("poisoned");
            *guard += 1;
            *guard
        });
        assert_eq!(bump.call(()), 1);
        drop(shared);
        assert_eq!(bump.call(()), 0);
    }

    #[test]
    fn untyped_object_handles() {
        let tester = CallbackTester::new();
        let id = safe_bind(tester.core().weak(), |o: &dyn Object| Some(o.id()));
        assert_eq!(id.call(()), Some(tester.core().id()));
        drop(tester);
        assert_eq!(id.call(()), None);
    }
}
