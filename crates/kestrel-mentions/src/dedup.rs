use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

/// Bounded, insertion-ordered set of seen identifiers.
///
/// Once `capacity` is reached the oldest identifier is evicted for every new
/// one, so memory stays flat no matter how long the poller runs.
#[derive(Debug, Clone)]
pub struct DedupLog {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl DedupLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert `id` unless already present. Returns `true` when the id is new.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        self.order.push_back(id.to_string());
        self.members.insert(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Identifiers oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    /// Re-insert a persisted snapshot, oldest first. Anything beyond
    /// capacity pushes out the oldest entries as usual.
    pub fn restore<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            self.insert(id.as_ref());
        }
    }
}

/// Order two upstream ids.
///
/// Snowflake-style ids are decimal strings that outgrow 64 bits in some
/// sources, so all-digit ids compare by length first and then lexically.
/// Anything else falls back to plain lexical order.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if numeric(a) && numeric(b) {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

/// The greater of `current` and `candidate` under [`compare_ids`].
pub fn max_id(current: Option<String>, candidate: &str) -> String {
    match current {
        Some(c) if compare_ids(&c, candidate) != Ordering::Less => c,
        _ => candidate.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_novelty() {
        let mut log = DedupLog::new(10);
        assert!(log.insert("a"));
        assert!(!log.insert("a"));
        assert!(log.contains("a"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_beyond_capacity() {
        let mut log = DedupLog::new(3);
        for id in ["1", "2", "3", "4"] {
            log.insert(id);
        }
        assert_eq!(log.snapshot(), vec!["2", "3", "4"]);
        assert!(!log.contains("1"));
        // An evicted id counts as new again.
        assert!(log.insert("1"));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut log = DedupLog::new(0);
        log.insert("a");
        log.insert("b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.snapshot(), vec!["b"]);
    }

    #[test]
    fn test_restore_respects_capacity() {
        let mut log = DedupLog::new(2);
        log.restore(["x", "y", "z"]);
        assert_eq!(log.snapshot(), vec!["y", "z"]);
    }

    #[test]
    fn test_compare_numeric_ids() {
        assert_eq!(compare_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_ids("1800000000000000001", "999"), Ordering::Greater);
        assert_eq!(compare_ids("42", "42"), Ordering::Equal);
        assert_eq!(compare_ids("007", "7"), Ordering::Equal);
    }

    #[test]
    fn test_compare_mixed_ids_is_lexical() {
        assert_eq!(compare_ids("abc", "abd"), Ordering::Less);
        assert_eq!(compare_ids("9", "a"), Ordering::Less);
    }

    #[test]
    fn test_max_id_never_regresses() {
        assert_eq!(max_id(None, "5"), "5");
        assert_eq!(max_id(Some("5".into()), "3"), "5");
        assert_eq!(max_id(Some("5".into()), "12"), "12");
    }
}
