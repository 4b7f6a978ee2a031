//! Common structs and abstractions used by `eft`
//!
//! Everything here exists so that the rest of the runtime can be
//! written once and run both on heap-allocating platforms (`Vec`,
//! `BTreeMap`) and on allocator-less targets (`tinyvec::ArrayVec`
//! and friends).

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(not(test), forbid(missing_debug_implementations, unreachable_pub))]
#![cfg_attr(not(test), deny(unsafe_code, missing_copy_implementations))]
#![allow(clippy::unused_unit)]
#![deny(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc as std_alloc;

/// Cursor
pub mod cursor;
pub use cursor::*;

/// Map
pub mod map;
pub use map::*;

/// Array
pub mod array;
pub use array::*;

/// Stem
pub mod stem;
pub use stem::*;

/// Writable
pub mod writable;
pub use writable::*;
