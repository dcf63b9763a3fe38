//! Sequence-number acceptance shared by the server sessions and the client

/// Remembers the highest accepted sequence number of one sender
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceWindow {
    last_accepted: u64,
}

impl SequenceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted(&self) -> u64 {
        self.last_accepted
    }

    /// Accepts `sequence` iff it is strictly greater than anything accepted
    /// before, which rejects duplicates and late arrivals alike.
    pub fn accept(&mut self, sequence: u64) -> bool {
        if sequence > self.last_accepted {
            self.last_accepted = sequence;
            true
        } else {
            false
        }
    }
}

/// Hands out outbound sequence numbers starting at 1
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceCounter {
    last_issued: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        self.last_issued += 1;
        self.last_issued
    }
}
