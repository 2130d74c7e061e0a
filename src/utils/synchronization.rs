//! Reader/writer locking around a table store.
//!
//! The engine never locks on its own. An embedding that shares a [`crate::TableStore`] between
//! threads guards it with one [`MetadataLock`] and acquires it through a scoped [`LockGuard`]
//! before calling into the engine. Mutating engine operations check, in debug builds only,
//! that the write side is held when a lock has been attached to the store.
//!
//! # Key Components
//!
//! - [`MetadataLock`] - The reader/writer lock guarding one store and its heaps
//! - [`LockGuard`] - Scoped acquisition with `lock_read`, `lock_write`,
//!   `convert_read_to_write` and `unlock`. A guard built without a lock is a no-op that
//!   reports every acquisition as successful, for embeddings that are single-threaded.
//!
//! # Examples
//!
//! ```rust
//! use mdstore::utils::synchronization::{LockGuard, MetadataLock};
//!
//! let lock = MetadataLock::new();
//! let mut guard = LockGuard::new(Some(&lock));
//! guard.lock_read()?;
//! guard.convert_read_to_write()?;
//! assert!(lock.is_write_locked());
//! guard.unlock();
//! assert!(!lock.is_write_locked());
//! # Ok::<(), mdstore::Error>(())
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::Result;

/// Reader/writer lock guarding one table store
#[derive(Debug, Default)]
pub struct MetadataLock {
    inner: RwLock<()>,
    writer: AtomicBool,
}

impl MetadataLock {
    /// Create an unlocked lock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a [`LockGuard`] holds the write side
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.writer.load(Ordering::Acquire)
    }
}

enum Held<'a> {
    Nothing,
    Read(RwLockReadGuard<'a, ()>),
    Write(RwLockWriteGuard<'a, ()>),
}

/// Scoped holder of a [`MetadataLock`]; whatever is held is released on drop
pub struct LockGuard<'a> {
    lock: Option<&'a MetadataLock>,
    held: Held<'a>,
}

impl<'a> LockGuard<'a> {
    /// Create a guard for `lock`. With `None` every operation succeeds without locking.
    #[must_use]
    pub fn new(lock: Option<&'a MetadataLock>) -> Self {
        LockGuard {
            lock,
            held: Held::Nothing,
        }
    }

    /// Acquire the shared side. A guard that already holds a side keeps it.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the lock is poisoned.
    pub fn lock_read(&mut self) -> Result<()> {
        let Some(lock) = self.lock else {
            return Ok(());
        };
        if matches!(self.held, Held::Nothing) {
            self.held = Held::Read(read_lock!(lock.inner));
        }
        Ok(())
    }

    /// Acquire the exclusive side. A guard holding the shared side converts it.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the lock is poisoned.
    pub fn lock_write(&mut self) -> Result<()> {
        let Some(lock) = self.lock else {
            return Ok(());
        };
        match self.held {
            Held::Write(_) => Ok(()),
            Held::Read(_) => self.convert_read_to_write(),
            Held::Nothing => {
                self.held = Held::Write(write_lock!(lock.inner));
                lock.writer.store(true, Ordering::Release);
                Ok(())
            }
        }
    }

    /// Trade the shared side for the exclusive side.
    ///
    /// The shared side is released before the exclusive side is acquired, so another writer
    /// may run in between; callers must re-validate anything read under the shared side.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the lock is poisoned.
    pub fn convert_read_to_write(&mut self) -> Result<()> {
        let Some(lock) = self.lock else {
            return Ok(());
        };
        if matches!(self.held, Held::Write(_)) {
            return Ok(());
        }

        self.held = Held::Nothing;
        self.held = Held::Write(write_lock!(lock.inner));
        lock.writer.store(true, Ordering::Release);
        Ok(())
    }

    /// Release whatever side is held
    pub fn unlock(&mut self) {
        if let (Some(lock), Held::Write(_)) = (self.lock, &self.held) {
            lock.writer.store(false, Ordering::Release);
        }
        self.held = Held::Nothing;
    }

    /// True if this guard holds the exclusive side, or has no lock to hold
    #[must_use]
    pub fn is_write_held(&self) -> bool {
        self.lock.is_none() || matches!(self.held, Held::Write(_))
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn no_lock_fallback() {
        let mut guard = LockGuard::new(None);
        guard.lock_read().unwrap();
        guard.lock_write().unwrap();
        guard.convert_read_to_write().unwrap();
        assert!(guard.is_write_held());
        guard.unlock();
    }

    #[test]
    fn write_flag_follows_guard() {
        let lock = MetadataLock::new();
        {
            let mut guard = LockGuard::new(Some(&lock));
            guard.lock_write().unwrap();
            assert!(lock.is_write_locked());
        }
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn readers_share() {
        let lock = MetadataLock::new();
        let mut first = LockGuard::new(Some(&lock));
        let mut second = LockGuard::new(Some(&lock));
        first.lock_read().unwrap();
        second.lock_read().unwrap();
        assert!(!first.is_write_held());
        second.unlock();
        first.convert_read_to_write().unwrap();
        assert!(first.is_write_held());
    }

    #[test]
    fn writer_excludes_other_threads() {
        let lock = Arc::new(MetadataLock::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut guard = LockGuard::new(Some(&lock));
                        guard.lock_write().unwrap();
                        let seen = counter.load(Ordering::Relaxed);
                        counter.store(seen + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 400);
    }
}
