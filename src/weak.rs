use crate::block::{Block, Parts};
use crate::Shared;

use core::fmt;

/// A non-owning handle to an object managed by [`Shared`].
///
/// A `Weak` keeps the control block alive but not the object. The object can
/// only be reached by upgrading to a [`Shared`] with [`lock`], which fails
/// once the last strong owner is gone.
///
/// # Examples
/// ```
/// use rcown::Shared;
///
/// let shared = Shared::new(5);
/// let weak = shared.downgrade();
/// assert_eq!(*weak.lock(), 5);
///
/// drop(shared);
/// assert!(weak.lock().is_empty());
/// ```
///
/// [`lock`]: crate::Weak::lock
pub struct Weak<T: ?Sized> {
    parts: Option<Parts<T>>,
}

impl<T: ?Sized> Weak<T> {
    /// Creates a `Weak` that observes nothing.
    pub const fn new() -> Weak<T> {
        Weak { parts: None }
    }

    pub(crate) fn parts(&self) -> Option<Parts<T>> {
        self.parts
    }

    /// Points a never-bound `Weak` at the object owned by `shared`. Does
    /// nothing if this `Weak` has been bound before. Returns whether it bound.
    pub(crate) fn bind(&mut self, shared: &Shared<T>) -> bool {
        if self.parts.is_some() {
            return false;
        }
        match shared.parts() {
            Some(parts) => {
                parts.block().add_weak();
                self.parts = Some(parts);
                true
            }
            None => false,
        }
    }

    /// Attempts to obtain shared ownership of the object. Returns an empty
    /// handle if the object has already been destroyed or this `Weak` is
    /// empty.
    pub fn lock(&self) -> Shared<T> {
        if self.strong_count() == 0 {
            return Shared::empty();
        }
        Shared::try_from(self).unwrap_or_default()
    }

    /// [`lock`](Weak::lock), with the empty case as `None`.
    pub fn upgrade(&self) -> Option<Shared<T>> {
        Some(self.lock()).filter(Shared::is_some)
    }

    /// Number of strong owners of the observed object. A `Weak` never
    /// contributes to it.
    pub fn strong_count(&self) -> usize {
        self.parts
            .map(|parts| parts.block().strong_count())
            .unwrap_or(0)
    }

    /// Number of `Weak` handles observing the same object, including this
    /// one. The reference held by a bound [`SelfRef`](crate::SelfRef) is not
    /// counted.
    pub fn weak_count(&self) -> usize {
        self.parts
            .map(|parts| parts.block().observers())
            .unwrap_or(0)
    }

    /// Returns whether the observed object is gone, or there never was one.
    pub fn expired(&self) -> bool {
        self.strong_count() == 0
    }

    /// Stops observing, leaving this `Weak` empty.
    pub fn reset(&mut self) {
        if let Some(parts) = self.parts.take() {
            unsafe { Block::release_weak(parts.block) };
        }
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(shared: &Shared<T>) -> Weak<T> {
        let mut weak = Weak::new();
        weak.bind(shared);
        weak
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Weak<T> {
        Weak::new()
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        if let Some(parts) = self.parts {
            parts.block().add_weak();
        }
        Weak { parts: self.parts }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}
