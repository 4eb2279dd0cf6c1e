use crate::block::{Adopted, Block, Combined, Parts};
use crate::{defer, Error, InitError, SharedFromThis, Weak};

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

use alloc::alloc::handle_alloc_error;
use alloc::boxed::Box;

/// A shared-ownership handle to an object, or an empty handle.
///
/// Every non-empty `Shared` accounts for one strong reference on the object's
/// control block. The object is destroyed when the last strong reference goes
/// away; the control block itself outlives it for as long as [`Weak`]
/// handles observe it.
///
/// Reference counts are plain integers, so `Shared` is neither `Send` nor
/// `Sync`.
///
/// # Examples
/// ```
/// use rcown::Shared;
///
/// let a = Shared::new(42);
/// let b = a.clone();
/// assert_eq!(*b, 42);
/// assert_eq!(a.strong_count(), 2);
///
/// drop(a);
/// assert_eq!(b.strong_count(), 1);
/// ```
pub struct Shared<T: ?Sized> {
    parts: Option<Parts<T>>,
    phantom: PhantomData<T>,
}

/// Stand-in for a null pointer when comparing against a [`Shared`].
///
/// # Examples
/// ```
/// use rcown::{Null, Shared};
///
/// let empty: Shared<u32> = Shared::empty();
/// assert!(empty == Null);
/// assert!(Null != Shared::new(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Null;

impl<T: ?Sized> Shared<T> {
    /// Creates a handle that owns nothing.
    pub const fn empty() -> Shared<T> {
        Shared {
            parts: None,
            phantom: PhantomData,
        }
    }

    pub(crate) fn from_parts(parts: Parts<T>) -> Shared<T> {
        Shared {
            parts: Some(parts),
            phantom: PhantomData,
        }
    }

    pub(crate) fn parts(&self) -> Option<Parts<T>> {
        self.parts
    }

    /// Takes ownership of a separately allocated object.
    ///
    /// Works for unsized objects as well, e.g. `Box<dyn Trait>` or `Box<[T]>`.
    /// If no control block can be allocated, the object is dropped and
    /// [`Error::Alloc`] is returned.
    pub fn from_box(object: Box<T>) -> Result<Shared<T>, Error> {
        Adopted::try_alloc(object).map(Shared::from_parts)
    }

    /// Like [`from_box`](Shared::from_box), but a missing object yields an
    /// empty handle instead of an error.
    pub fn adopt(object: Option<Box<T>>) -> Result<Shared<T>, Error> {
        match object {
            Some(object) => Shared::from_box(object),
            None => Ok(Shared::empty()),
        }
    }

    /// Returns a reference to the object, or `None` for an empty handle.
    pub fn get(&self) -> Option<&T> {
        self.parts.as_ref().map(|parts| unsafe { parts.ptr.as_ref() })
    }

    /// Returns the address of the object, or `None` for an empty handle.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.parts.map(|parts| parts.ptr)
    }

    fn addr(&self) -> *const () {
        match self.parts {
            Some(parts) => parts.ptr.as_ptr() as *const (),
            None => core::ptr::null(),
        }
    }

    /// Number of strong owners of the object, or 0 for an empty handle.
    pub fn strong_count(&self) -> usize {
        self.parts
            .map(|parts| parts.block().strong_count())
            .unwrap_or(0)
    }

    /// Number of [`Weak`] handles observing the object, or 0 for an empty
    /// handle. The reference held by a bound [`SelfRef`](crate::SelfRef) is
    /// not counted.
    pub fn weak_count(&self) -> usize {
        self.parts
            .map(|parts| parts.block().observers())
            .unwrap_or(0)
    }

    /// Returns whether this handle owns an object.
    pub fn is_some(&self) -> bool {
        self.parts.is_some()
    }

    /// Returns whether this handle is empty.
    pub fn is_empty(&self) -> bool {
        self.parts.is_none()
    }

    /// Copies the handle, failing with [`Error::Resurrection`] if the object
    /// is already destroyed. That can only happen if some other invariant has
    /// been broken first; [`Clone`] panics in that case instead.
    pub fn try_clone(&self) -> Result<Shared<T>, Error> {
        self.share(|value| Some(value))
    }

    /// Releases this handle's strong reference early, leaving it empty.
    /// Calling `reset` on an empty handle does nothing.
    pub fn reset(&mut self) {
        if let Some(parts) = self.parts.take() {
            unsafe { Block::release_strong(parts.block) };
        }
    }

    /// Moves the strong reference out, leaving this handle empty.
    pub fn take(&mut self) -> Shared<T> {
        core::mem::take(self)
    }

    /// Creates a new [`Weak`] handle observing the same object.
    pub fn downgrade(&self) -> Weak<T> {
        Weak::from(self)
    }

    /// Creates a handle to something reachable from the object that shares
    /// ownership with `this`.
    ///
    /// The strong count increases by one. This covers upcasts to trait
    /// objects as well as projections to a field.
    ///
    /// # Examples
    /// ```
    /// use core::fmt::Display;
    /// use rcown::Shared;
    ///
    /// let pair = Shared::new((1u8, 2u16));
    /// let second = Shared::map(&pair, |pair| &pair.1);
    /// let display = Shared::map(&pair, |pair| &pair.0 as &dyn Display);
    ///
    /// assert_eq!(*second, 2);
    /// assert_eq!(display.to_string(), "1");
    /// assert_eq!(pair.strong_count(), 3);
    /// ```
    pub fn map<U: ?Sized, F>(this: &Shared<T>, f: F) -> Shared<U>
    where
        F: for<'a> FnOnce(&'a T) -> &'a U,
    {
        match this.share(|value| Some(f(value))) {
            Ok(shared) => shared,
            Err(err) => panic!("{}", err),
        }
    }

    /// Runtime-checked variant of [`map`](Shared::map). If `f` returns
    /// `None`, or `this` is empty, the result is empty and no count changes.
    pub fn try_map<U: ?Sized, F>(this: &Shared<T>, f: F) -> Shared<U>
    where
        F: for<'a> FnOnce(&'a T) -> Option<&'a U>,
    {
        this.share(f).unwrap_or_default()
    }

    fn share<U: ?Sized, F>(&self, f: F) -> Result<Shared<U>, Error>
    where
        F: for<'a> FnOnce(&'a T) -> Option<&'a U>,
    {
        let parts = match self.parts {
            Some(parts) => parts,
            None => return Ok(Shared::empty()),
        };

        let target = match f(unsafe { parts.ptr.as_ref() }) {
            Some(target) => NonNull::from(target),
            None => return Ok(Shared::empty()),
        };

        parts.block().add_strong()?;
        Ok(Shared::from_parts(Parts {
            ptr: target,
            block: parts.block,
        }))
    }
}

impl<T> Shared<T> {
    /// Moves `value` into a new allocation shared with its control block.
    ///
    /// Aborts through [`handle_alloc_error`] if the allocation fails, like
    /// `Box::new`. Use [`try_new`](Shared::try_new) to observe the failure.
    ///
    /// An embedded [`SelfRef`](crate::SelfRef) is left unbound, so
    /// `shared_from_this` on the result returns an empty handle. Types
    /// implementing [`SharedFromThis`] go through
    /// [`new_bound`](Shared::new_bound) and the other `_bound` constructors.
    pub fn new(value: T) -> Shared<T> {
        let node = Combined::<T>::try_alloc()
            .unwrap_or_else(|_| handle_alloc_error(Combined::<T>::layout()));
        Shared::from_parts(unsafe { Combined::write(node, value) })
    }

    /// Moves `value` into a new allocation shared with its control block.
    pub fn try_new(value: T) -> Result<Shared<T>, Error> {
        let node = Combined::<T>::try_alloc()?;
        Ok(Shared::from_parts(unsafe { Combined::write(node, value) }))
    }

    /// Allocates the control block first, then runs `init` to produce the
    /// object.
    ///
    /// If `init` fails or panics, the allocation is released before the
    /// failure propagates.
    ///
    /// # Examples
    /// ```
    /// use rcown::{InitError, Shared};
    ///
    /// let parsed = Shared::try_new_with(|| "17".parse::<u32>());
    /// assert_eq!(*parsed.unwrap(), 17);
    ///
    /// let failed = Shared::try_new_with(|| "x".parse::<u32>());
    /// assert!(matches!(failed, Err(InitError::Init(_))));
    /// ```
    pub fn try_new_with<E, F>(init: F) -> Result<Shared<T>, InitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let node = Combined::<T>::try_alloc()?;
        let mut guard = defer(move || unsafe { Combined::dealloc(node) });
        let value = init().map_err(InitError::Init)?;
        guard.dismiss();

        Ok(Shared::from_parts(unsafe { Combined::write(node, value) }))
    }
}

impl<T: ?Sized + SharedFromThis> Shared<T> {
    fn bind_self(self) -> Shared<T> {
        if let Some(value) = self.get() {
            value.self_ref().bind(&self);
        }
        self
    }

    /// [`from_box`](Shared::from_box) for objects that can hand out handles
    /// to themselves.
    pub fn from_box_bound(object: Box<T>) -> Result<Shared<T>, Error> {
        Shared::from_box(object).map(Shared::bind_self)
    }

    /// [`adopt`](Shared::adopt) for objects that can hand out handles to
    /// themselves.
    pub fn adopt_bound(object: Option<Box<T>>) -> Result<Shared<T>, Error> {
        Shared::adopt(object).map(Shared::bind_self)
    }
}

impl<T: SharedFromThis> Shared<T> {
    /// [`new`](Shared::new) for objects that can hand out handles to
    /// themselves.
    ///
    /// # Examples
    /// ```
    /// use rcown::{SelfRef, Shared, SharedFromThis};
    ///
    /// struct Session {
    ///     this: SelfRef<Session>,
    /// }
    ///
    /// impl SharedFromThis for Session {
    ///     fn self_ref(&self) -> &SelfRef<Session> {
    ///         &self.this
    ///     }
    /// }
    ///
    /// let session = Shared::new_bound(Session { this: SelfRef::new() });
    /// let again = session.shared_from_this();
    /// assert!(again == session);
    /// assert_eq!(session.strong_count(), 2);
    /// ```
    pub fn new_bound(value: T) -> Shared<T> {
        Shared::new(value).bind_self()
    }

    /// [`try_new`](Shared::try_new) for objects that can hand out handles to
    /// themselves.
    pub fn try_new_bound(value: T) -> Result<Shared<T>, Error> {
        Shared::try_new(value).map(Shared::bind_self)
    }

    /// [`try_new_with`](Shared::try_new_with) for objects that can hand out
    /// handles to themselves.
    pub fn try_new_bound_with<E, F>(init: F) -> Result<Shared<T>, InitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        Shared::try_new_with(init).map(Shared::bind_self)
    }
}

impl Shared<dyn Any> {
    /// Re-views the object as a `U` if that is its concrete type, sharing
    /// ownership. Returns an empty handle otherwise.
    pub fn downcast<U: Any>(&self) -> Shared<U> {
        Shared::try_map(self, |value| value.downcast_ref::<U>())
    }
}

/// Allocates `value` together with its control block.
pub fn make_shared<T>(value: T) -> Result<Shared<T>, Error> {
    Shared::try_new(value)
}

/// Re-views a handle through a conversion the type system guarantees,
/// sharing ownership. Always succeeds.
///
/// # Examples
/// ```
/// use rcown::{static_pointer_cast, Shared};
///
/// let owned = Shared::new(String::from("hello"));
/// let text: Shared<str> = static_pointer_cast(&owned);
/// assert_eq!(&*text, "hello");
/// assert_eq!(owned.strong_count(), 2);
/// ```
pub fn static_pointer_cast<U: ?Sized, T: ?Sized + AsRef<U>>(from: &Shared<T>) -> Shared<U> {
    Shared::map(from, |value| value.as_ref())
}

/// Handles only ever give out shared references, so there is no constness to
/// strip: this is an ordinary copy under a name that matches the other
/// casts.
pub fn const_pointer_cast<T: ?Sized>(from: &Shared<T>) -> Shared<T> {
    from.clone()
}

/// Re-views a type-erased handle as its concrete type `U`. On a type
/// mismatch the result is empty and the strong count is left alone.
///
/// # Examples
/// ```
/// use core::any::Any;
/// use rcown::{dynamic_pointer_cast, Shared};
///
/// let any: Shared<dyn Any> = Shared::map(&Shared::new(5u32), |v| v as &dyn Any);
///
/// assert_eq!(*dynamic_pointer_cast::<u32>(&any), 5);
/// assert!(dynamic_pointer_cast::<i64>(&any).is_empty());
/// ```
pub fn dynamic_pointer_cast<U: Any>(from: &Shared<dyn Any>) -> Shared<U> {
    from.downcast()
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Shared<T> {
        Shared::empty()
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(shared) => shared,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Shared"),
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Shared<T> {
    type Error = Error;

    /// Upgrades `weak`, raising [`Error::Resurrection`] if the object is gone.
    /// An empty `weak` gives an empty handle.
    fn try_from(weak: &Weak<T>) -> Result<Shared<T>, Error> {
        match weak.parts() {
            Some(parts) => {
                parts.block().add_strong()?;
                Ok(Shared::from_parts(parts))
            }
            None => Ok(Shared::empty()),
        }
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    fn eq(&self, other: &Shared<U>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialEq<Null> for Shared<T> {
    fn eq(&self, _: &Null) -> bool {
        self.is_empty()
    }
}

impl<T: ?Sized> PartialEq<Shared<T>> for Null {
    fn eq(&self, other: &Shared<T>) -> bool {
        other.is_empty()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Shared").field(&value).finish(),
            None => f.write_str("Shared(<empty>)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

#[cfg(feature = "stable_deref_trait")]
unsafe impl<T: ?Sized> stable_deref_trait::StableDeref for Shared<T> {}

#[cfg(feature = "stable_deref_trait")]
unsafe impl<T: ?Sized> stable_deref_trait::CloneStableDeref for Shared<T> {}
