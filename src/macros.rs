#![allow(unused_macros)]

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let data = read_lock!(my_rwlock);
///  println!("{}", data.some_field);
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut data = write_lock!(my_rwlock);
///  data.some_field = 42;
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().map_err(|_| crate::Error::LockError)?
    };
}

/// Rejects mutation of a store that was opened read-only
///
/// ```rust, ignore
///  ensure_writable!(self);
/// ```
macro_rules! ensure_writable {
    ($store:expr) => {
        if $store.is_read_only() {
            return Err(crate::Error::ReadOnly);
        }
        $store.debug_assert_write_locked();
    };
}
