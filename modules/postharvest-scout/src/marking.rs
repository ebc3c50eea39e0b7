//! Per-container session marks. Not persisted; a new process starts clean.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// Inspected and rejected. Never a scan target again, but does not hide
    /// posts nested inside it.
    Checked,
    /// Accepted. `replaceable` while a short capture waits for its one
    /// re-expansion attempt.
    Done { replaceable: bool },
}

#[derive(Debug)]
pub struct ContainerMarks<K> {
    marks: HashMap<K, Mark>,
}

impl<K> Default for ContainerMarks<K> {
    fn default() -> Self {
        Self {
            marks: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> ContainerMarks<K> {
    pub fn get(&self, key: K) -> Option<Mark> {
        self.marks.get(&key).copied()
    }

    pub fn is_marked(&self, key: K) -> bool {
        self.marks.contains_key(&key)
    }

    pub fn is_done(&self, key: K) -> bool {
        matches!(self.get(key), Some(Mark::Done { .. }))
    }

    pub fn mark_checked(&mut self, key: K) {
        self.marks.insert(key, Mark::Checked);
    }

    pub fn mark_done(&mut self, key: K, replaceable: bool) {
        self.marks.insert(key, Mark::Done { replaceable });
    }

    /// Forget a container so the next scan visits it again.
    pub fn unmark(&mut self, key: K) {
        self.marks.remove(&key);
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }
}
