//! Lock helpers.
//!
//! A panic while a lock is held must not take the engine down with it: every
//! protected structure here stays consistent between statements, so a
//! poisoned guard is recovered and used as is.

use std::ops::{Deref, DerefMut};
use std::sync::{
    Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Instant;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// A mutex whose waiters can give up at a deadline.
///
/// Ownership is a single permit guarded by `held`; waiters sleep on
/// `released` until the holder's guard drops. The inner mutex is only locked
/// by the permit holder.
pub(crate) struct TimedMutex<T> {
    held: Mutex<bool>,
    released: Condvar,
    value: Mutex<T>,
}

impl<T> TimedMutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            value: Mutex::new(value),
        }
    }

    /// Block until the lock is free.
    pub(crate) fn lock(&self) -> TimedGuard<'_, T> {
        let mut held = lock(&self.held);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
        drop(held);
        self.guard()
    }

    /// Block until the lock is free or `deadline` passes. Returns `None` on
    /// timeout.
    pub(crate) fn lock_until(&self, deadline: Instant) -> Option<TimedGuard<'_, T>> {
        let mut held = lock(&self.held);
        while *held {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|d| !d.is_zero())?;
            let (guard, _) = self
                .released
                .wait_timeout(held, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }
        *held = true;
        drop(held);
        Some(self.guard())
    }

    fn guard(&self) -> TimedGuard<'_, T> {
        TimedGuard {
            owner: self,
            value: lock(&self.value),
        }
    }
}

/// Holds a [`TimedMutex`]; releases it and wakes one waiter on drop.
pub(crate) struct TimedGuard<'a, T> {
    owner: &'a TimedMutex<T>,
    value: MutexGuard<'a, T>,
}

impl<T> Deref for TimedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for TimedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for TimedGuard<'_, T> {
    fn drop(&mut self) {
        *lock(&self.owner.held) = false;
        self.owner.released.notify_one();
    }
}
