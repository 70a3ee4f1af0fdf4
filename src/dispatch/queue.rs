use crossbeam_channel::{unbounded, Receiver, Sender};

/// Unbounded FIFO shared between the listener thread and the main-thread tick.
///
/// Every handle holds both ends of the channel, so `push` never fails and any
/// holder can drain or clear the queue.
pub struct DispatchQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for DispatchQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, item: T) {
        // We own a receiver, so the channel can never be disconnected here.
        let _ = self.tx.send(item);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take every entry queued before this call, in enqueue order.
    ///
    /// Entries pushed concurrently while draining stay queued for the next call.
    pub fn drain(&self) -> Vec<T> {
        let pending = self.rx.len();
        self.rx.try_iter().take(pending).collect()
    }

    /// Discard everything currently queued and report how many entries were dropped.
    pub fn clear(&self) -> usize {
        self.drain().len()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
