//! Single-threaded shared ownership with an explicit control block.
//!
//! [`Shared`] owns an object together with any number of other `Shared`
//! handles; [`Weak`] observes it without keeping it alive. Both point at a
//! control block that counts strong and weak references and decides when the
//! object is destroyed and when the block's own memory is freed:
//!
//! - the object is destroyed exactly once, when the last `Shared` goes away;
//! - the block is freed exactly once, when the last `Weak` goes away and no
//!   `Shared` is left.
//!
//! Objects can be allocated together with their control block
//! ([`Shared::new`], [`make_shared`]) or adopted from an existing `Box`
//! ([`Shared::from_box`]). Types embedding a [`SelfRef`] can hand out handles
//! to themselves through [`SharedFromThis`]. [`Defer`] runs a closure on
//! scope exit.
//!
//! The counters are plain integers. None of the handle types are `Send` or
//! `Sync`, and there is no way to share them between threads.
//!
//! # Examples
//! ```
//! use rcown::Shared;
//!
//! let a = Shared::new(42);
//! let b = a.clone();
//! assert_eq!(b.strong_count(), 2);
//!
//! let weak = b.downgrade();
//! drop(a);
//! drop(b);
//! assert!(weak.lock().is_empty());
//! ```

#![no_std]

extern crate alloc;

mod block;
mod defer;
mod error;
mod shared;
mod this;
mod weak;

pub use defer::{defer, Defer};
pub use error::{Error, InitError};
pub use shared::{
    const_pointer_cast, dynamic_pointer_cast, make_shared, static_pointer_cast, Null, Shared,
};
pub use this::{SelfRef, SharedFromThis};
pub use weak::Weak;
