use alloc::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Proceed,
    Exhausted,
}

#[derive(Debug)]
pub struct RetryLedger {
    attempts: BTreeMap<u32, u8>,
    ceiling: u8,
}

impl RetryLedger {
    pub const DEFAULT_CEILING: u8 = 5;

    pub fn new(ceiling: u8) -> Self {
        Self {
            attempts: BTreeMap::new(),
            ceiling,
        }
    }

    pub fn ceiling(&self) -> u8 {
        self.ceiling
    }

    pub fn attempts(&self, chunk_index: u32) -> u8 {
        self.attempts.get(&chunk_index).copied().unwrap_or(0)
    }

    pub fn record_attempt(&mut self, chunk_index: u32) -> RetryOutcome {
        let attempts = self.attempts.entry(chunk_index).or_insert(0);
        *attempts = attempts.saturating_add(1);

        if *attempts > self.ceiling {
            RetryOutcome::Exhausted
        } else {
            RetryOutcome::Proceed
        }
    }

    pub fn reset(&mut self) {
        self.attempts.clear();
    }
}

impl Default for RetryLedger {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CEILING)
    }
}
