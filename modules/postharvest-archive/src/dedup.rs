//! Dedup index: exact-duplicate suppression by fingerprint and
//! replace-if-longer tracking by permalink.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use postharvest_common::Record;

/// Outcome of offering a record to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// First sight of this post.
    New(Ticket),
    /// Same permalink, strictly longer text than the indexed capture.
    Replace(Ticket),
    /// Identical (author, text) already seen.
    Duplicate,
    /// Same permalink, not longer than what is already stored.
    NotLonger { known_len: usize },
}

/// Proof of an admission, needed to undo it when the store write fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    fingerprint: String,
    permalink: Option<String>,
    len: usize,
    previous_len: Option<usize>,
}

impl Ticket {
    pub fn previous_len(&self) -> Option<usize> {
        self.previous_len
    }
}

#[derive(Default)]
struct IndexState {
    fingerprints: HashSet<String>,
    best_len: HashMap<String, usize>,
}

#[derive(Default)]
pub struct DedupIndex {
    state: Mutex<IndexState>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored records so "never regress" holds across restarts.
    pub fn hydrate(records: &[Record]) -> Self {
        let index = Self::new();
        {
            let mut state = index.lock();
            for record in records {
                state.fingerprints.insert(record.fingerprint());
                if let Some(permalink) = &record.permalink {
                    let len = record.text_len();
                    let best = state.best_len.entry(permalink.clone()).or_insert(len);
                    *best = (*best).max(len);
                }
            }
        }
        index
    }

    /// Check and claim in one step. A `New` or `Replace` admission records the
    /// fingerprint and the permalink length immediately, so a concurrent
    /// capture of the same content sees it before the store write finishes.
    pub fn admit(&self, record: &Record) -> Admission {
        let fingerprint = record.fingerprint();
        let len = record.text_len();
        let mut state = self.lock();

        if state.fingerprints.contains(&fingerprint) {
            return Admission::Duplicate;
        }

        let previous_len = match &record.permalink {
            Some(permalink) => match state.best_len.get(permalink) {
                Some(&known_len) if known_len >= len => return Admission::NotLonger { known_len },
                other => other.copied(),
            },
            None => None,
        };

        state.fingerprints.insert(fingerprint.clone());
        if let Some(permalink) = &record.permalink {
            state.best_len.insert(permalink.clone(), len);
        }

        let ticket = Ticket {
            fingerprint,
            permalink: record.permalink.clone(),
            len,
            previous_len,
        };
        if previous_len.is_some() {
            Admission::Replace(ticket)
        } else {
            Admission::New(ticket)
        }
    }

    /// Undo an admission whose store write failed. The permalink length is
    /// left alone once a later, longer admission has taken it over.
    pub fn rollback(&self, ticket: Ticket) {
        let mut state = self.lock();
        state.fingerprints.remove(&ticket.fingerprint);
        if let Some(permalink) = ticket.permalink {
            if state.best_len.get(&permalink) != Some(&ticket.len) {
                return;
            }
            match ticket.previous_len {
                Some(len) => {
                    state.best_len.insert(permalink, len);
                }
                None => {
                    state.best_len.remove(&permalink);
                }
            }
        }
    }

    pub fn best_len(&self, permalink: &str) -> Option<usize> {
        self.lock().best_len.get(permalink).copied()
    }

    pub fn knows_fingerprint(&self, fingerprint: &str) -> bool {
        self.lock().fingerprints.contains(fingerprint)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.fingerprints.clear();
        state.best_len.clear();
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(author: &str, text: &str, permalink: Option<&str>) -> Record {
        Record {
            author: author.into(),
            text: text.into(),
            timestamp: String::new(),
            permalink: permalink.map(String::from),
            reactions_label: String::new(),
            comments_label: String::new(),
            images: Vec::new(),
            videos: Vec::new(),
            local_files: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn identical_content_is_a_duplicate() {
        let index = DedupIndex::new();
        assert!(matches!(index.admit(&record("Ana", "hi there", None)), Admission::New(_)));
        assert_eq!(index.admit(&record("Ana", "hi there", None)), Admission::Duplicate);
        assert!(matches!(index.admit(&record("Bo", "hi there", None)), Admission::New(_)));
    }

    #[test]
    fn longer_capture_of_same_permalink_replaces() {
        let index = DedupIndex::new();
        let p = Some("https://www.facebook.com/a/posts/1");
        assert!(matches!(index.admit(&record("Ana", "short", p)), Admission::New(_)));
        match index.admit(&record("Ana", "short but longer", p)) {
            Admission::Replace(ticket) => assert_eq!(ticket.previous_len(), Some(5)),
            other => panic!("expected replace, got {other:?}"),
        }
        assert_eq!(
            index.admit(&record("Ana", "tiny", p)),
            Admission::NotLonger { known_len: 16 }
        );
        assert_eq!(index.best_len(p.unwrap()), Some(16));
    }

    #[test]
    fn rollback_restores_previous_state() {
        let index = DedupIndex::new();
        let p = Some("p1");
        index.admit(&record("Ana", "abc", p));
        let Admission::Replace(ticket) = index.admit(&record("Ana", "abcdef", p)) else {
            panic!("expected replace");
        };
        index.rollback(ticket);
        assert_eq!(index.best_len("p1"), Some(3));
        assert!(matches!(index.admit(&record("Ana", "abcdef", p)), Admission::Replace(_)));
    }

    #[test]
    fn rollback_keeps_a_later_longer_admission() {
        let index = DedupIndex::new();
        let p = Some("p1");
        let Admission::New(first) = index.admit(&record("Ana", "abc", p)) else {
            panic!("expected new");
        };
        assert!(matches!(index.admit(&record("Ana", "abcdef", p)), Admission::Replace(_)));

        index.rollback(first);
        assert_eq!(index.best_len("p1"), Some(6));
        assert_eq!(
            index.admit(&record("Ana", "abcd", p)),
            Admission::NotLonger { known_len: 6 }
        );
        assert!(!index.knows_fingerprint(&record("Ana", "abc", p).fingerprint()));
    }

    #[test]
    fn hydrate_keeps_the_longest_length() {
        let stored = vec![record("Ana", "abc", Some("p1")), record("Bo", "xyz", None)];
        let index = DedupIndex::hydrate(&stored);
        assert_eq!(index.best_len("p1"), Some(3));
        assert_eq!(index.admit(&record("Bo", "xyz", None)), Admission::Duplicate);
    }
}
