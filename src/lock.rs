use std::sync::{Mutex, MutexGuard};

/// Lock a mutex shared with the listener thread, recovering the data if a holder panicked.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        crate::log_debug(&format!("Mutex poisoned in {context}; recovering"));
        tracing::warn!(context, "recovered poisoned mutex");
        poisoned.into_inner()
    })
}
