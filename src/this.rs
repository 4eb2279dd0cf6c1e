use crate::{Shared, Weak};

use core::cell::RefCell;
use core::fmt;

/// Lets an object hand out [`Shared`] and [`Weak`] handles to itself.
///
/// Embed a `SelfRef<Self>` in the type and implement [`SharedFromThis`] to
/// expose it. The `SelfRef` starts out unbound; the `_bound` constructors of
/// [`Shared`] bind it to the new control block the first time the object
/// comes under shared ownership. It is never rebound afterwards.
///
/// Cloning a `SelfRef` yields an unbound one: a copied object is a different
/// object, with no owner yet.
pub struct SelfRef<T: ?Sized> {
    weak: RefCell<Weak<T>>,
}

impl<T: ?Sized> SelfRef<T> {
    /// Creates an unbound `SelfRef`.
    pub const fn new() -> SelfRef<T> {
        SelfRef {
            weak: RefCell::new(Weak::new()),
        }
    }

    pub(crate) fn bind(&self, shared: &Shared<T>) {
        let mut weak = self.weak.borrow_mut();
        if weak.bind(shared) {
            if let Some(parts) = weak.parts() {
                parts.block().set_self_ref(true);
            }
        }
    }

    /// Shares ownership with the handles that own the enclosing object.
    /// Empty if the object has never been owned, or is being destroyed.
    pub fn lock(&self) -> Shared<T> {
        self.weak.borrow().lock()
    }

    /// Creates a [`Weak`] observing the enclosing object. Empty if the object
    /// has never been owned.
    pub fn downgrade(&self) -> Weak<T> {
        self.weak.borrow().clone()
    }

    /// Returns whether some [`Shared`] has ever taken ownership of the
    /// enclosing object.
    pub fn is_bound(&self) -> bool {
        self.weak.borrow().parts().is_some()
    }
}

impl<T: ?Sized> Drop for SelfRef<T> {
    fn drop(&mut self) {
        if let Some(parts) = self.weak.get_mut().parts() {
            parts.block().set_self_ref(false);
        }
    }
}

impl<T: ?Sized> Default for SelfRef<T> {
    fn default() -> SelfRef<T> {
        SelfRef::new()
    }
}

impl<T: ?Sized> Clone for SelfRef<T> {
    fn clone(&self) -> Self {
        SelfRef::new()
    }
}

impl<T: ?Sized> fmt::Debug for SelfRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfRef")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Types that embed a [`SelfRef`] to themselves.
///
/// Whether a type can hand out handles to itself is decided by this trait
/// bound at compile time: only for implementors do the `_bound` constructors
/// of [`Shared`] exist.
///
/// # Notes
///
/// Only the `_bound` constructors ([`Shared::new_bound`],
/// [`Shared::try_new_bound`], [`Shared::try_new_bound_with`],
/// [`Shared::from_box_bound`], [`Shared::adopt_bound`]) bind the embedded
/// [`SelfRef`]. An implementor placed under [`Shared::new`] or
/// [`Shared::from_box`] stays unbound, and [`shared_from_this`] returns an
/// empty handle even while owners exist.
///
/// [`shared_from_this`]: SharedFromThis::shared_from_this
pub trait SharedFromThis {
    /// Returns the embedded [`SelfRef`].
    fn self_ref(&self) -> &SelfRef<Self>;

    /// Returns a new strong handle to `self`, or an empty handle if no
    /// [`Shared`] owns `self`.
    fn shared_from_this(&self) -> Shared<Self> {
        self.self_ref().lock()
    }

    /// Returns a new weak handle to `self`, or an empty one if `self` has
    /// never been owned by a [`Shared`].
    fn weak_from_this(&self) -> Weak<Self> {
        self.self_ref().downgrade()
    }
}
