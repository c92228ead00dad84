use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Reusable per-file buffers for the line reader
#[derive(Debug, Default)]
pub struct ScratchBuffers {
    /// Raw bytes of the current chunk
    pub bytes: Vec<u8>,
    /// Decoded text of the current chunk
    pub decoded: String,
    /// Incomplete line carried between chunks
    pub head: String,
}

impl ScratchBuffers {
    fn reset(&mut self, keep: usize) {
        self.bytes.clear();
        self.decoded.clear();
        self.head.clear();
        // Buffers that grew on a pathological file are not kept around
        if self.decoded.capacity() > keep {
            self.decoded.shrink_to(keep);
        }
        if self.head.capacity() > keep {
            self.head.shrink_to(keep);
        }
    }
}

/// Pool of scratch buffers shared by the content workers
#[derive(Debug)]
pub struct ScratchPool {
    free: Mutex<Vec<ScratchBuffers>>,
    keep_capacity: usize,
}

impl ScratchPool {
    pub fn new(keep_capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            keep_capacity,
        }
    }

    // A worker that panicked while returning buffers leaves them intact
    fn free_list(&self) -> MutexGuard<'_, Vec<ScratchBuffers>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks out a set of buffers; they return to the pool when the guard drops
    pub fn checkout(&self) -> ScratchGuard<'_> {
        let buffers = self.free_list().pop().unwrap_or_default();
        ScratchGuard {
            pool: self,
            buffers,
        }
    }

    pub fn available(&self) -> usize {
        self.free_list().len()
    }
}

pub struct ScratchGuard<'a> {
    pool: &'a ScratchPool,
    buffers: ScratchBuffers,
}

impl Deref for ScratchGuard<'_> {
    type Target = ScratchBuffers;

    fn deref(&self) -> &ScratchBuffers {
        &self.buffers
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut ScratchBuffers {
        &mut self.buffers
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        let mut buffers = std::mem::take(&mut self.buffers);
        buffers.reset(self.pool.keep_capacity);
        self.pool.free_list().push(buffers);
    }
}
