//! Navigation history: the last few URLs a session requested.

use std::collections::VecDeque;

/// Entries kept per session.
pub const HISTORY_CAPACITY: usize = 10;

/// Bounded, append-only URL history; oldest entry evicted first.
#[derive(Debug, Clone)]
pub struct NavigationHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, url: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(url.into());
    }

    /// Most recent entry: the default referrer for the next request.
    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_last_ten_in_order() {
        let mut history = NavigationHistory::new();
        for i in 0..15 {
            history.push(format!("https://example.com/{i}"));
            assert!(history.len() <= HISTORY_CAPACITY);
        }
        let expected: Vec<String> = (5..15).map(|i| format!("https://example.com/{i}")).collect();
        assert_eq!(history.to_vec(), expected);
        assert_eq!(history.last(), Some("https://example.com/14"));
    }

    #[test]
    fn test_empty_has_no_referrer() {
        assert_eq!(NavigationHistory::new().last(), None);
    }
}
