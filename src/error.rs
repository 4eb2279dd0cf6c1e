/// Errors raised by constructors that cannot hand out a valid handle.
///
/// Query-style operations ([`Weak::lock`], [`Shared::try_map`],
/// [`dynamic_pointer_cast`]) never produce these; they return an empty
/// handle instead.
///
/// [`Weak::lock`]: crate::Weak::lock
/// [`Shared::try_map`]: crate::Shared::try_map
/// [`dynamic_pointer_cast`]: crate::dynamic_pointer_cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Storage for a control block could not be obtained.
    #[error("control block allocation failed")]
    Alloc,
    /// A strong reference was requested for an object that has already been
    /// destroyed.
    #[error("attempted to add a strong reference to a destroyed object")]
    Resurrection,
}

/// Error returned by [`Shared::try_new_with`] and
/// [`Shared::try_new_bound_with`].
///
/// [`Shared::try_new_with`]: crate::Shared::try_new_with
/// [`Shared::try_new_bound_with`]: crate::Shared::try_new_bound_with
#[derive(Debug, thiserror::Error)]
pub enum InitError<E> {
    /// The control block itself could not be set up.
    #[error(transparent)]
    Block(#[from] Error),
    /// The constructor of the managed object failed. The block allocation has
    /// been released by the time this is observed.
    #[error("in-place construction failed: {0}")]
    Init(E),
}
