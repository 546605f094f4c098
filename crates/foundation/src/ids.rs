/// Monotonic id source.
///
/// Ids are never reused within one allocator, so a stale id can always be
/// told apart from a live one.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}
