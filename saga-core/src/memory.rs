//! Player-curated narrative notes.
//!
//! Memories are appended by the narrator through `MEMORY_ADD` tags and can
//! be pinned by the player. Pinned memories are injected into every prompt,
//! outliving the sliding history window.

use serde::{Deserialize, Serialize};

/// A single remembered fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub text: String,
    #[serde(default)]
    pub pinned: bool,
}

/// Append-only list of memories. Only the pinned flag ever changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryLog(Vec<Memory>);

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unpinned memory.
    pub fn add(&mut self, text: impl Into<String>) {
        self.0.push(Memory {
            text: text.into(),
            pinned: false,
        });
    }

    /// Flip the pinned flag. Returns false if `index` is out of range.
    pub fn toggle_pin(&mut self, index: usize) -> bool {
        match self.0.get_mut(index) {
            Some(memory) => {
                memory.pinned = !memory.pinned;
                true
            }
            None => false,
        }
    }

    pub fn pinned(&self) -> impl Iterator<Item = &Memory> {
        self.0.iter().filter(|m| m.pinned)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Memory> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_pin() {
        let mut log = MemoryLog::new();
        log.add("The innkeeper owes us a favor");
        log.add("The bridge is out");

        assert_eq!(log.pinned().count(), 0);
        assert!(log.toggle_pin(1));
        assert_eq!(log.pinned().next().map(|m| m.text.as_str()), Some("The bridge is out"));

        assert!(log.toggle_pin(1));
        assert_eq!(log.pinned().count(), 0);
    }

    #[test]
    fn test_toggle_out_of_range() {
        let mut log = MemoryLog::new();
        assert!(!log.toggle_pin(0));
    }
}
