use parking_lot::{Condvar, Mutex};

/// Counting semaphore used to idle workers between running sessions.
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub(crate) fn new(permits: usize) -> Semaphore {
        Semaphore {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then consumes it.
    pub(crate) fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    pub(crate) fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        *self.permits.lock() += count;
        self.available.notify_all();
    }
}
