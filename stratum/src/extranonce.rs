use parking_lot::Mutex;
use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

pub const EXTRANONCE1_SIZE: usize = 4;

/// Hands out extranonce1 values that are unique among live sessions.
///
/// Values come from a wrapping counter seeded at random; a value still held by
/// a live session is skipped until its [`Extranonce1`] guard is dropped.
pub struct ExtranonceAllocator {
    next: AtomicU32,
    live: Mutex<HashSet<u32>>,
}

impl ExtranonceAllocator {
    pub fn new() -> Self {
        Self::starting_at(rand::random())
    }

    pub fn starting_at(first: u32) -> Self {
        Self { next: AtomicU32::new(first), live: Mutex::new(HashSet::new()) }
    }

    pub fn allocate(self: &Arc<Self>) -> Extranonce1 {
        let mut live = self.live.lock();
        loop {
            let value = self.next.fetch_add(1, Ordering::Relaxed);
            if live.insert(value) {
                return Extranonce1 { value, allocator: self.clone() };
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    fn release(&self, value: u32) {
        self.live.lock().remove(&value);
    }
}

impl Default for ExtranonceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A live extranonce1 allocation, released on drop.
pub struct Extranonce1 {
    value: u32,
    allocator: Arc<ExtranonceAllocator>,
}

impl Extranonce1 {
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn bytes(&self) -> [u8; EXTRANONCE1_SIZE] {
        self.value.to_be_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes())
    }
}

impl fmt::Debug for Extranonce1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Extranonce1").field(&self.to_hex()).finish()
    }
}

impl Drop for Extranonce1 {
    fn drop(&mut self) {
        self.allocator.release(self.value);
    }
}
