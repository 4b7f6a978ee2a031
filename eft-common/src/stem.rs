use core::ops::{Deref, DerefMut};

#[cfg(feature = "std")]
type Inner<T> = std::sync::RwLock<T>;

#[cfg(not(feature = "std"))]
type Inner<T> = core::cell::RefCell<T>;

/// A mutable memory location that allows for
/// many concurrent readers or a single writer.
///
/// This is a wrapper of [`std::sync::RwLock`] that
/// switches to [`core::cell::RefCell`] when feature `std`
/// is disabled.
///
/// # Naming
/// "Stem cell" is a pun, since stem cells in biology are
/// defined as cells which can mutate into any other kind
/// of cell, and this data structure will change its shape
/// based on the runtime.
#[derive(Debug, Default)]
pub struct Stem<T>(Inner<T>);

impl<T> Stem<T> {
  /// Create a new Stem cell
  pub const fn new(t: T) -> Self {
    Self(Inner::new(t))
  }

  /// Read `T`
  ///
  /// # Blocks
  /// When feature `std` enabled, this
  /// will block if a call to [`Stem::map_mut`]
  /// is running.
  ///
  /// # Panics
  /// When feature `std` disabled, this
  /// will panic if invoked while a call
  /// to [`Stem::map_mut`] is running.
  pub fn map_ref<F, R>(&self, f: F) -> R
    where F: for<'a> FnMut(&'a T) -> R
  {
    self.0.map_ref(f)
  }

  /// Modify `T`
  ///
  /// # Blocks
  /// When feature `std` enabled, this
  /// will block until all other borrows
  /// are released.
  ///
  /// # Panics
  /// When feature `std` disabled, this
  /// will panic if invoked while another
  /// borrow is held.
  pub fn map_mut<F, R>(&self, f: F) -> R
    where F: for<'a> FnMut(&'a mut T) -> R
  {
    self.0.map_mut(f)
  }
}

/// A mutable memory location
///
/// This is used to back the behavior of [`Stem`],
/// which should be used instead of this trait.
pub trait StemCellBehavior<T> {
  /// Create an instance of `Self`
  fn new(t: T) -> Self
    where Self: Sized;

  /// Get a reference to `T` contained in `Self`
  fn map_ref<F, R>(&self, f: F) -> R
    where F: for<'a> FnMut(&'a T) -> R;

  /// Mutate the `T` contained in `Self`
  fn map_mut<F, R>(&self, f: F) -> R
    where F: for<'a> FnMut(&'a mut T) -> R;
}

#[cfg(feature = "std")]
impl<T> StemCellBehavior<T> for std::sync::RwLock<T> {
  fn new(t: T) -> Self {
    Self::new(t)
  }

  fn map_ref<F, R>(&self, mut f: F) -> R
    where F: for<'a> FnMut(&'a T) -> R
  {
    f(self.read().unwrap().deref())
  }

  fn map_mut<F, R>(&self, mut f: F) -> R
    where F: for<'a> FnMut(&'a mut T) -> R
  {
    f(self.write().unwrap().deref_mut())
  }
}

impl<T> StemCellBehavior<T> for core::cell::RefCell<T> {
  fn new(t: T) -> Self {
    Self::new(t)
  }

  fn map_ref<F, R>(&self, mut f: F) -> R
    where F: for<'a> FnMut(&'a T) -> R
  {
    f(self.borrow().deref())
  }

  fn map_mut<F, R>(&self, mut f: F) -> R
    where F: for<'a> FnMut(&'a mut T) -> R
  {
    f(self.borrow_mut().deref_mut())
  }
}

#[cfg(test)]
mod test {
  use core::cell::RefCell;
  use std::sync::RwLock;

  use super::*;

  #[test]
  fn refcell_modify() {
    let s = RefCell::new(Vec::<usize>::new());
    s.map_mut(|v| v.push(12));
    s.map_ref(|v| assert_eq!(v, &vec![12usize]));
  }

  #[test]
  fn rwlock_modify() {
    let s = RwLock::new(Vec::<usize>::new());
    s.map_mut(|v| v.push(12));
    s.map_ref(|v| assert_eq!(v, &vec![12usize]));
  }

  #[test]
  fn stem_modify() {
    let s = Stem::new(Vec::<usize>::new());
    s.map_mut(|v| v.push(12));
    assert_eq!(s.map_ref(|v| v.clone()), vec![12usize]);
  }
}
