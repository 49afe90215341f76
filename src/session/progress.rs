use parking_lot::RwLock;
use std::sync::Arc;

pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Single replaceable progress callback
///
/// Setting a callback replaces the previous one; nothing is queued. Delivery
/// reads the slot at the moment a progress message is handled, so a message
/// racing with `set` reaches whichever callback is registered at that instant
/// (last write wins).
#[derive(Default)]
pub struct ProgressSlot {
    callback: RwLock<Option<ProgressCallback>>,
}

impl ProgressSlot {
    pub fn set(&self, callback: Option<ProgressCallback>) {
        *self.callback.write() = callback;
    }

    /// Invoke the current callback, if any. Returns whether one was called.
    pub fn deliver(&self, count: u64) -> bool {
        // Clone out so the callback runs without the lock held
        let callback = self.callback.read().clone();
        match callback {
            Some(cb) => {
                cb(count);
                true
            }
            None => false,
        }
    }
}
