//! Write handle ownership for Brook storage.
//!
//! A storage handle has a single writable connection. A thread that begins a transaction
//! owns it until its outermost transaction ends; every other thread waits.

use std::thread::{self, ThreadId};

/// Ownership record for the writable connection.
#[derive(Debug, Default)]
pub struct WriteOwner {
    /// Thread holding an open transaction, if any.
    holder: Option<ThreadId>,
    /// Threads currently blocked waiting for the holder to release.
    waiting: usize,
}

impl WriteOwner {
    /// Creates an unowned record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the given thread may use the connection now.
    pub fn can_enter(&self, thread: ThreadId) -> bool {
        self.holder.map_or(true, |holder| holder == thread)
    }

    /// Returns true if the calling thread may use the connection now.
    pub fn can_enter_current(&self) -> bool {
        self.can_enter(thread::current().id())
    }

    /// Claims the connection for the calling thread.
    pub fn acquire_current(&mut self) {
        self.holder = Some(thread::current().id());
    }

    /// Releases the connection.
    pub fn release(&mut self) {
        self.holder = None;
    }

    /// Returns true if the calling thread holds the connection.
    pub fn is_held_by_current(&self) -> bool {
        self.holder == Some(thread::current().id())
    }

    /// Returns true if any thread holds the connection.
    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    /// Records that a thread started waiting.
    pub fn start_waiting(&mut self) {
        self.waiting += 1;
    }

    /// Records that a waiting thread woke up.
    pub fn stop_waiting(&mut self) {
        self.waiting = self.waiting.saturating_sub(1);
    }

    /// Returns true if another thread is waiting for the connection.
    pub fn is_contended(&self) -> bool {
        self.waiting > 0
    }
}
