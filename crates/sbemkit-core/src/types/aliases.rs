//! Type aliases for shared state crossing the worker/presentation boundary.
//!
//! ```rust,ignore
//! use sbemkit_core::types::*;
//!
//! // Instead of: Arc<RwLock<RunSnapshot>>
//! let snapshot: ThreadSafeRw<RunSnapshot> = thread_safe_rw(RunSnapshot::default());
//! ```

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex`, which does not poison when a worker panics.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe vector, used for append-only logs read from another thread.
pub type ThreadSafeVec<T> = Arc<Mutex<Vec<T>>>;

/// A thread-safe reader-writer lock for state written by one worker and
/// read by the presentation side.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Create a new `ThreadSafe<T>` from a value.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new empty `ThreadSafeVec<T>`.
#[inline]
pub fn thread_safe_vec<T>() -> ThreadSafeVec<T> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Create a new `ThreadSafeRw<T>` from a value.
#[inline]
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_across_threads() {
        let value: ThreadSafe<i32> = thread_safe(0);
        let worker = value.clone();
        std::thread::spawn(move || *worker.lock() += 5)
            .join()
            .expect("worker thread");
        assert_eq!(*value.lock(), 5);
    }

    #[test]
    fn test_thread_safe_vec() {
        let lines: ThreadSafeVec<String> = thread_safe_vec();
        lines.lock().push("0.000, 0.000, 0.000, OK".to_string());
        assert_eq!(lines.lock().len(), 1);
    }

    #[test]
    fn test_thread_safe_rw() {
        let value: ThreadSafeRw<i32> = thread_safe_rw(42);
        assert_eq!(*value.read(), 42);
        *value.write() = 100;
        assert_eq!(*value.read(), 100);
    }
}
