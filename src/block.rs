use core::alloc::Layout;
use core::cell::Cell;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use alloc::alloc::{alloc, dealloc};
use alloc::boxed::Box;

use crate::{defer, Error};

const MAX_REFCOUNT: usize = isize::MAX as usize;

const OVERFLOW_ERROR: &str = "reference count overflow";

/// Bookkeeping shared by every handle to one managed object.
///
/// `use_count` is the number of strong owners. `weak_count` is the number of
/// weak observers plus one unit held collectively by the strong owners, which
/// is given up only after the object has been destroyed. The object is
/// destroyed when `use_count` reaches zero; the block is freed when
/// `weak_count` reaches zero, which cannot happen earlier.
///
/// `self_ref` is set while a bound `SelfRef` inside the object holds one of
/// the weak references. That reference is not reported as an observer.
///
/// `Block` is always the first field of a [`Combined`] or [`Adopted`]
/// allocation, and `release`/`free` know which one they are looking at.
#[repr(C)]
pub(crate) struct Block {
    use_count: Cell<usize>,
    weak_count: Cell<usize>,
    self_ref: Cell<bool>,
    release: unsafe fn(NonNull<Block>),
    free: unsafe fn(NonNull<Block>),
}

impl Block {
    fn new(release: unsafe fn(NonNull<Block>), free: unsafe fn(NonNull<Block>)) -> Block {
        Block {
            use_count: Cell::new(1),
            weak_count: Cell::new(1),
            self_ref: Cell::new(false),
            release,
            free,
        }
    }

    pub(crate) fn strong_count(&self) -> usize {
        self.use_count.get()
    }

    /// Includes the unit held by the strong owners while any exist.
    pub(crate) fn weak_count(&self) -> usize {
        self.weak_count.get()
    }

    /// Weak handles held by callers: excludes the implicit unit while strong
    /// owners exist, and the reference held by a bound `SelfRef`.
    pub(crate) fn observers(&self) -> usize {
        let mut count = self.weak_count.get();
        if self.use_count.get() > 0 {
            count -= 1;
        }
        if self.self_ref.get() {
            count -= 1;
        }
        count
    }

    pub(crate) fn set_self_ref(&self, bound: bool) {
        self.self_ref.set(bound);
    }

    pub(crate) fn add_strong(&self) -> Result<(), Error> {
        let count = self.use_count.get();
        if count == 0 {
            log::warn!("refusing to revive destroyed object behind control block {:p}", self);
            return Err(Error::Resurrection);
        }
        assert!(count < MAX_REFCOUNT, "{}", OVERFLOW_ERROR);
        self.use_count.set(count + 1);
        Ok(())
    }

    pub(crate) fn add_weak(&self) {
        let count = self.weak_count.get();
        assert!(count < MAX_REFCOUNT, "{}", OVERFLOW_ERROR);
        self.weak_count.set(count + 1);
    }

    /// Gives up one strong reference.
    ///
    /// The caller must own a strong reference to `this` and must not touch the
    /// block again afterwards.
    pub(crate) unsafe fn release_strong(this: NonNull<Block>) {
        let release = {
            let block = unsafe { this.as_ref() };
            let count = block.use_count.get() - 1;
            block.use_count.set(count);
            if count != 0 {
                return;
            }
            block.release
        };

        // The implicit weak unit goes only once the object is gone, and also
        // when its destructor unwinds.
        let _implicit = defer(|| unsafe { Block::release_weak(this) });

        log::trace!("control block {:p}: destroying managed object", this);
        unsafe { release(this) };
    }

    /// Gives up one weak reference.
    ///
    /// The caller must own a weak reference to `this` (or the implicit unit)
    /// and must not touch the block again afterwards.
    pub(crate) unsafe fn release_weak(this: NonNull<Block>) {
        let free = {
            let block = unsafe { this.as_ref() };
            let count = block.weak_count.get() - 1;
            block.weak_count.set(count);
            if count != 0 || block.use_count.get() != 0 {
                return;
            }
            block.free
        };

        log::trace!("control block {:p}: freed", this);
        unsafe { free(this) };
    }
}

/// Typed view of a live control block: where the object is, and who counts
/// references to it.
pub(crate) struct Parts<T: ?Sized> {
    pub(crate) ptr: NonNull<T>,
    pub(crate) block: NonNull<Block>,
}

impl<T: ?Sized> Clone for Parts<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Parts<T> {}

impl<T: ?Sized> Parts<T> {
    pub(crate) fn block(&self) -> &Block {
        unsafe { self.block.as_ref() }
    }
}

/// Single allocation holding both the control block and the object.
#[repr(C)]
pub(crate) struct Combined<T> {
    block: Block,
    value: MaybeUninit<T>,
}

unsafe fn release_combined<T>(block: NonNull<Block>) {
    let node = block.cast::<Combined<T>>().as_ptr();
    unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*node).value).cast::<T>()) };
}

unsafe fn free_combined<T>(block: NonNull<Block>) {
    unsafe { Combined::<T>::dealloc(block.cast()) };
}

impl<T> Combined<T> {
    pub(crate) fn layout() -> Layout {
        Layout::new::<Combined<T>>()
    }

    /// Allocates a block whose object slot is still uninitialized. The result
    /// must be passed to either [`Combined::write`] or [`Combined::dealloc`].
    pub(crate) fn try_alloc() -> Result<NonNull<Combined<T>>, Error> {
        let layout = Self::layout();
        let node = unsafe { alloc(layout) } as *mut Combined<T>;
        let node = NonNull::new(node).ok_or(Error::Alloc)?;

        unsafe {
            ptr::addr_of_mut!((*node.as_ptr()).block)
                .write(Block::new(release_combined::<T>, free_combined::<T>));
        }
        log::trace!(
            "control block {:p}: allocated with inline object ({} bytes)",
            node,
            layout.size()
        );

        Ok(node)
    }

    /// Moves `value` into the object slot of a block obtained from
    /// [`Combined::try_alloc`], handing out the first strong reference.
    pub(crate) unsafe fn write(node: NonNull<Combined<T>>, value: T) -> Parts<T> {
        let slot = unsafe { ptr::addr_of_mut!((*node.as_ptr()).value).cast::<T>() };
        unsafe { slot.write(value) };

        Parts {
            ptr: unsafe { NonNull::new_unchecked(slot) },
            block: node.cast(),
        }
    }

    /// Frees the allocation without touching the object slot.
    pub(crate) unsafe fn dealloc(node: NonNull<Combined<T>>) {
        unsafe { dealloc(node.as_ptr() as *mut u8, Self::layout()) };
    }
}

/// Control block for an object that was allocated on its own.
#[repr(C)]
pub(crate) struct Adopted<T: ?Sized> {
    block: Block,
    object: NonNull<T>,
}

unsafe fn release_adopted<T: ?Sized>(block: NonNull<Block>) {
    let node = block.cast::<Adopted<T>>().as_ptr();
    drop(unsafe { Box::from_raw((*node).object.as_ptr()) });
}

unsafe fn free_adopted<T: ?Sized>(block: NonNull<Block>) {
    unsafe { dealloc(block.as_ptr() as *mut u8, Layout::new::<Adopted<T>>()) };
}

impl<T: ?Sized> Adopted<T> {
    /// Takes ownership of `object`. If no block can be allocated, `object` is
    /// dropped before the error is returned.
    pub(crate) fn try_alloc(object: Box<T>) -> Result<Parts<T>, Error> {
        let layout = Layout::new::<Adopted<T>>();
        let node = unsafe { alloc(layout) } as *mut Adopted<T>;
        let node = NonNull::new(node).ok_or(Error::Alloc)?;

        let object = unsafe { NonNull::new_unchecked(Box::into_raw(object)) };
        unsafe {
            node.as_ptr().write(Adopted {
                block: Block::new(release_adopted::<T>, free_adopted::<T>),
                object,
            });
        }
        log::trace!("control block {:p}: adopted object at {:p}", node, object);

        Ok(Parts {
            ptr: object,
            block: node.cast(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    struct Logged {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Drop for Logged {
        fn drop(&mut self) {
            self.log.borrow_mut().push("object dropped");
        }
    }

    fn logged() -> (Logged, Rc<RefCell<Vec<&'static str>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (Logged { log: log.clone() }, log)
    }

    fn combined(value: Logged) -> Parts<Logged> {
        let node = Combined::<Logged>::try_alloc().unwrap();
        unsafe { Combined::write(node, value) }
    }

    #[test]
    fn fresh_block_counts() {
        let (value, _log) = logged();
        let parts = combined(value);

        assert_eq!(parts.block().strong_count(), 1);
        assert_eq!(parts.block().weak_count(), 1);

        unsafe { Block::release_strong(parts.block) };
    }

    #[test]
    fn last_strong_destroys_object_once() {
        let (value, log) = logged();
        let parts = combined(value);

        parts.block().add_strong().unwrap();
        assert_eq!(parts.block().strong_count(), 2);

        unsafe { Block::release_strong(parts.block) };
        assert!(log.borrow().is_empty());

        unsafe { Block::release_strong(parts.block) };
        assert_eq!(*log.borrow(), ["object dropped"]);
    }

    #[test]
    fn weak_keeps_block_after_object() {
        let (value, log) = logged();
        let parts = combined(value);

        parts.block().add_weak();
        assert_eq!(parts.block().weak_count(), 2);

        unsafe { Block::release_strong(parts.block) };
        assert_eq!(*log.borrow(), ["object dropped"]);
        assert_eq!(parts.block().strong_count(), 0);
        assert_eq!(parts.block().weak_count(), 1);

        assert_eq!(parts.block().add_strong(), Err(Error::Resurrection));
        assert_eq!(parts.block().strong_count(), 0);

        parts.block().add_weak();
        unsafe { Block::release_weak(parts.block) };
        unsafe { Block::release_weak(parts.block) };
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn weak_release_while_owned_keeps_block() {
        let (value, log) = logged();
        let parts = combined(value);

        parts.block().add_weak();
        unsafe { Block::release_weak(parts.block) };
        assert_eq!(parts.block().strong_count(), 1);
        assert_eq!(parts.block().weak_count(), 1);
        assert!(log.borrow().is_empty());

        unsafe { Block::release_strong(parts.block) };
        assert_eq!(*log.borrow(), ["object dropped"]);
    }

    #[test]
    fn observers_exclude_internal_units() {
        let (value, _log) = logged();
        let parts = combined(value);
        assert_eq!(parts.block().observers(), 0);

        parts.block().add_weak();
        parts.block().set_self_ref(true);
        assert_eq!(parts.block().weak_count(), 2);
        assert_eq!(parts.block().observers(), 0);

        parts.block().add_weak();
        assert_eq!(parts.block().observers(), 1);

        parts.block().set_self_ref(false);
        unsafe { Block::release_weak(parts.block) };
        assert_eq!(parts.block().observers(), 1);

        unsafe { Block::release_weak(parts.block) };
        unsafe { Block::release_strong(parts.block) };
    }

    #[test]
    fn adopted_object_dropped_through_box() {
        let (value, log) = logged();
        let boxed = Box::new(value);
        let address: *const Logged = &*boxed;

        let parts = Adopted::try_alloc(boxed).unwrap();
        assert_eq!(parts.ptr.as_ptr() as *const Logged, address);
        assert_eq!(parts.block().strong_count(), 1);

        unsafe { Block::release_strong(parts.block) };
        assert_eq!(*log.borrow(), ["object dropped"]);
    }

    #[test]
    fn dealloc_skips_uninitialized_object() {
        let node = Combined::<Logged>::try_alloc().unwrap();
        unsafe { Combined::dealloc(node) };
    }
}
