//! Interior-mutability cell shared by every table of the manager.
//!
//! Without the `reentrant` feature the manager is single-threaded and the cell
//! is a [`RefCell`](std::cell::RefCell). With `reentrant` it is a
//! `parking_lot::RwLock`: lookups take the read lock, insertions take the
//! write lock.
//!
//! Callers never hold a guard across a recursive manager call.

use std::ops::{Deref, DerefMut};

#[cfg(not(feature = "reentrant"))]
pub struct Lock<T>(std::cell::RefCell<T>);

#[cfg(not(feature = "reentrant"))]
impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self(std::cell::RefCell::new(value))
    }

    pub fn read(&self) -> impl Deref<Target = T> + '_ {
        self.0.borrow()
    }

    pub fn write(&self) -> impl DerefMut<Target = T> + '_ {
        self.0.borrow_mut()
    }
}

#[cfg(feature = "reentrant")]
pub struct Lock<T>(parking_lot::RwLock<T>);

#[cfg(feature = "reentrant")]
impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self(parking_lot::RwLock::new(value))
    }

    pub fn read(&self) -> impl Deref<Target = T> + '_ {
        self.0.read()
    }

    pub fn write(&self) -> impl DerefMut<Target = T> + '_ {
        self.0.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let lock = Lock::new(vec![1, 2]);
        lock.write().push(3);
        assert_eq!(lock.read().len(), 3);
        {
            let a = lock.read();
            let b = lock.read();
            assert_eq!(a[0], b[0]);
        }
        assert_eq!(*lock.read(), vec![1, 2, 3]);
    }
}
