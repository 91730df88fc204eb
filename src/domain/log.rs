// ============================================================
// Layer 3 — Training Log
// ============================================================
// An insertion-ordered dictionary of scalar values produced by
// the most recent training step (e.g. "l_pix").
//
// Entries print in the order they were recorded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainLog {
    entries: Vec<(String, f64)>,
}

impl TrainLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value. Overwriting keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None        => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `key: value` pairs, e.g. `l_pix: 1.2340e-2`
    pub fn summary(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}: {v:.4e}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order() {
        let mut log = TrainLog::new();
        log.insert("l_pix", 1.0);
        log.insert("lr", 1e-4);
        log.insert("l_pix", 0.5);

        let keys: Vec<&str> = log.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["l_pix", "lr"]);
        assert_eq!(log.get("l_pix"), Some(0.5));
    }

    #[test]
    fn test_missing_key() {
        let log = TrainLog::new();
        assert!(log.is_empty());
        assert_eq!(log.get("l_pix"), None);
    }
}
