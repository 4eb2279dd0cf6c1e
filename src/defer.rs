/// Runs a closure when it goes out of scope, unless dismissed first.
///
/// A `Defer` is armed from construction until it is either dropped, at which
/// point the action runs exactly once, or [`dismiss`]ed, after which the
/// action never runs. Moving a `Defer` moves the armed action along with it;
/// the moved-from binding can no longer fire. `Defer` is deliberately not
/// `Clone`, since two armed copies would run the action twice.
///
/// # Examples
/// ```
/// use core::cell::Cell;
/// use rcown::defer;
///
/// let fired = Cell::new(0);
/// {
///     let _guard = defer(|| fired.set(fired.get() + 1));
///     assert_eq!(fired.get(), 0);
/// }
/// assert_eq!(fired.get(), 1);
///
/// {
///     let mut guard = defer(|| fired.set(fired.get() + 1));
///     guard.dismiss();
/// }
/// assert_eq!(fired.get(), 1);
/// ```
///
/// [`dismiss`]: crate::Defer::dismiss
#[must_use = "a `Defer` fires immediately if it is not bound to a variable"]
pub struct Defer<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> Defer<F> {
    /// Creates an armed guard for `action`.
    pub fn new(action: F) -> Defer<F> {
        Defer {
            action: Some(action),
        }
    }

    /// Disarms the guard permanently. The action is dropped without being
    /// called.
    pub fn dismiss(&mut self) {
        self.action = None;
    }

    /// Returns whether the action will still run on drop.
    pub fn is_armed(&self) -> bool {
        self.action.is_some()
    }
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl<F: FnOnce()> core::fmt::Debug for Defer<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Defer")
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Shorthand for [`Defer::new`].
pub fn defer<F: FnOnce()>(action: F) -> Defer<F> {
    Defer::new(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::vec::Vec;
    use core::cell::Cell;

    #[test]
    fn fires_once_on_scope_exit() {
        let fired = Cell::new(0);
        {
            let guard = defer(|| fired.set(fired.get() + 1));
            assert!(guard.is_armed());
        }
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn dismissed_never_fires() {
        let fired = Cell::new(0);
        {
            let mut guard = defer(|| fired.set(fired.get() + 1));
            guard.dismiss();
            assert!(!guard.is_armed());
            guard.dismiss();
        }
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn move_fires_from_destination_only() {
        let fired = Cell::new(0);
        let mut guards = Vec::new();
        {
            let guard = defer(|| fired.set(fired.get() + 1));
            guards.push(guard);
        }
        assert_eq!(fired.get(), 0);

        let moved = guards.pop();
        assert_eq!(fired.get(), 0);
        core::mem::drop(moved);
        assert_eq!(fired.get(), 1);

        core::mem::drop(guards);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn fires_during_unwind() {
        extern crate std;

        let fired = Cell::new(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = defer(|| fired.set(fired.get() + 1));
            panic!("unwinding");
        }));
        assert!(result.is_err());
        assert_eq!(fired.get(), 1);
    }
}
