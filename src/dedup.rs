//! Bounded history of recently relayed spawns, newest first.
//!
//! The log answers "was this already sent?" and doubles as the backfill
//! handed to viewers when they subscribe.  It lives only in memory.

use std::collections::VecDeque;

use crate::spawn::SpawnRecord;

#[derive(Debug, Clone)]
pub struct DedupLog {
    entries: VecDeque<SpawnRecord>,
    capacity: usize,
}

impl DedupLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.saturating_add(1)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact string match on name, latitude and longitude.  IV is not part
    /// of the identity of a spawn.
    pub fn contains(&self, name: &str, lat: &str, lon: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.name == name && e.lat == lat && e.lon == lon)
    }

    pub fn push(&mut self, record: SpawnRecord) {
        self.entries.push_front(record);
    }

    /// Drop the oldest entries until at most `max_len` remain.
    pub fn trim(&mut self, max_len: usize) {
        self.entries.truncate(max_len);
    }

    /// Push and trim to the configured capacity in one step.
    pub fn record(&mut self, record: SpawnRecord) {
        self.push(record);
        self.trim(self.capacity);
    }

    /// Current entries, newest first.
    pub fn snapshot(&self) -> Vec<SpawnRecord> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(name: &str, lat: &str, lon: &str) -> SpawnRecord {
        SpawnRecord {
            name: name.into(),
            lat: lat.into(),
            lon: lon.into(),
            iv: None,
        }
    }

    #[test]
    fn contains_right_after_push() {
        let mut log = DedupLog::new(10);
        assert!(!log.contains("Pidgey", "1.0", "2.0"));
        log.push(spawn("Pidgey", "1.0", "2.0"));
        assert!(log.contains("Pidgey", "1.0", "2.0"));
    }

    #[test]
    fn match_is_exact_on_all_three_fields() {
        let mut log = DedupLog::new(10);
        log.push(spawn("Pidgey", "1.0", "2.0"));
        assert!(!log.contains("Pidgey", "1.00", "2.0"));
        assert!(!log.contains("Pidgey", "1.0", "2.00"));
        assert!(!log.contains("pidgey", "1.0", "2.0"));
        assert!(!log.contains("Rattata", "1.0", "2.0"));
    }

    #[test]
    fn iv_does_not_affect_identity() {
        let mut log = DedupLog::new(10);
        log.push(SpawnRecord {
            iv: Some(90),
            ..spawn("Pidgey", "1.0", "2.0")
        });
        assert!(log.contains("Pidgey", "1.0", "2.0"));
    }

    #[test]
    fn snapshot_is_newest_first() {
        let mut log = DedupLog::new(10);
        log.push(spawn("Pidgey", "1.0", "2.0"));
        log.push(spawn("Rattata", "3.0", "4.0"));
        let names: Vec<_> = log.snapshot().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Rattata", "Pidgey"]);
    }

    #[test]
    fn trim_drops_oldest() {
        let mut log = DedupLog::new(10);
        for i in 0..5 {
            log.push(spawn("Pidgey", &format!("{i}.0"), "0.0"));
        }
        log.trim(2);
        assert_eq!(log.len(), 2);
        assert!(log.contains("Pidgey", "4.0", "0.0"));
        assert!(log.contains("Pidgey", "3.0", "0.0"));
        assert!(!log.contains("Pidgey", "2.0", "0.0"));
    }

    #[test]
    fn entry_survives_until_trimmed_past() {
        let mut log = DedupLog::new(3);
        log.record(spawn("Mew", "1.0", "1.0"));
        for i in 0..2 {
            log.record(spawn("Pidgey", &format!("{i}.5"), "0.0"));
            assert!(log.contains("Mew", "1.0", "1.0"));
        }
        log.record(spawn("Pidgey", "9.5", "0.0"));
        assert!(!log.contains("Mew", "1.0", "1.0"));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut log = DedupLog::new(4);
        for i in 0..50 {
            log.record(spawn("Zubat", &format!("{i}.1"), "0.0"));
            assert!(log.len() <= log.capacity());
        }
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut log = DedupLog::new(0);
        log.record(spawn("Zubat", "1.1", "0.0"));
        assert!(log.is_empty());
    }
}
