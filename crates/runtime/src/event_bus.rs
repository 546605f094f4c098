use std::collections::VecDeque;

use tracing::debug;

/// One orchestration event, kept for traceability.
///
/// `seq` is assigned by the bus and strictly increases, so the trace keeps
/// the order in which transitions actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub seq: u64,
    pub kind: &'static str,
    pub message: String,
}

/// Ordered, bounded event trace.
///
/// When full, the oldest events are dropped first.
#[derive(Debug)]
pub struct EventBus {
    next_seq: u64,
    capacity: usize,
    events: VecDeque<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_seq: 0,
            capacity: capacity.max(1),
            events: VecDeque::new(),
        }
    }

    pub fn emit(&mut self, kind: &'static str, message: impl Into<String>) -> u64 {
        let message = message.into();
        debug!(kind, seq = self.next_seq, "{message}");

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push_back(Event { seq, kind, message });
        seq
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Messages of every retained event of `kind`, oldest first.
    pub fn messages_of(&self, kind: &str) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;

    #[test]
    fn sequence_numbers_increase() {
        let mut bus = EventBus::new();
        let a = bus.emit("mode", "Idle -> AwaitingAreaPick");
        let b = bus.emit("job", "submitted");
        assert!(b > a);
        assert_eq!(bus.messages_of("mode"), vec!["Idle -> AwaitingAreaPick"]);
    }

    #[test]
    fn oldest_events_are_dropped_when_full() {
        let mut bus = EventBus::with_capacity(2);
        bus.emit("k", "one");
        bus.emit("k", "two");
        bus.emit("k", "three");
        assert_eq!(bus.messages_of("k"), vec!["two", "three"]);
        assert_eq!(bus.events().next().map(|e| e.seq), Some(1));
    }

    #[test]
    fn drain_clears_events_but_keeps_numbering() {
        let mut bus = EventBus::new();
        bus.emit("k", "m");
        assert_eq!(bus.drain().len(), 1);
        assert!(bus.is_empty());
        assert_eq!(bus.emit("k", "n"), 1);
    }
}
