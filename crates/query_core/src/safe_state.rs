use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// State cell whose writes are dropped once the owning session has been torn down.
///
/// The current value lives in a `watch` channel so readers always see a whole
/// value and can subscribe to changes. Every write goes through
/// [`SafeState::update`], which runs under the channel lock.
#[derive(Debug)]
pub struct SafeState<T> {
    tx: watch::Sender<T>,
    mounted: AtomicBool,
}

impl<T> SafeState<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            mounted: AtomicBool::new(true),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Replaces the current value. Returns `false` if the write was suppressed.
    pub fn set(&self, value: T) -> bool {
        self.update(|current| {
            *current = value;
            true
        })
    }

    /// Runs `modify` against the current value while holding the channel lock.
    ///
    /// `modify` returns whether it changed anything; subscribers are notified only
    /// then. After [`SafeState::unmount`] the closure is never called.
    pub fn update<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        self.tx.send_if_modified(|current| {
            if !self.mounted.load(Ordering::Acquire) {
                return false;
            }
            modify(current)
        })
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "tests/safe_state_tests.rs"]
mod tests;
