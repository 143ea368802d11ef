//! Ordered key/value collection used for configuration and for XML-derived
//! parameter passing to the XSLT engine.
//!
//! This re-expresses the original `eurephiaVALUES` pointer chain (group id +
//! per-chain element id, singly linked) as a plain `Vec` of entry records.
//! Lookup stays O(n), which is fine at configuration-bag sizes. No key
//! uniqueness is enforced; `get_value` returns the first match, matching the
//! "first match wins at lookup" behavior the original relies on.

/// One key/value pair in a [`KeyValueBag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Group id: all entries added through the same bag share this id.
    pub group: u32,
    /// Unique id within the chain, assigned in insertion order.
    pub id: u32,
    pub key: String,
    pub val: String,
}

#[derive(Debug, Clone)]
pub struct KeyValueBag {
    group: u32,
    next_id: u32,
    entries: Vec<Entry>,
}

impl KeyValueBag {
    pub fn new(group: u32) -> Self {
        Self { group, next_id: 0, entries: Vec::new() }
    }

    /// Look up the full entry for `key`, returning the first match.
    pub fn get_struct(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Look up the value for `key`, returning the first match.
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.get_struct(key).map(|e| e.val.as_str())
    }

    /// Append a new key/value pair, regardless of whether `key` already exists.
    pub fn add(&mut self, key: impl Into<String>, val: impl Into<String>) {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry { group: self.group, id, key: key.into(), val: val.into() });
    }

    /// Update the first entry matching `key` in place. If no entry matches
    /// and `add_if_missing` is false, this is a no-op; if true, a new entry
    /// is appended.
    pub fn update(&mut self, key: &str, val: impl Into<String>, add_if_missing: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.val = val.into();
            return;
        }
        if add_if_missing {
            self.add(key.to_string(), val);
        }
    }

    /// Remove the entry identified by the (group, id) pair. Returns whether
    /// an entry was removed.
    pub fn remove(&mut self, group: u32, id: u32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !(e.group == group && e.id == id));
        self.entries.len() != before
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Merge `other` into `self`, appending every entry (used to layer a
    /// `.conf` section or CLI overrides on top of defaults).
    pub fn merge_overlay(&mut self, other: &KeyValueBag, add_if_missing: bool) {
        for e in other.iter() {
            self.update(&e.key, e.val.clone(), add_if_missing);
        }
    }
}

impl Default for KeyValueBag {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_preserved() {
        let mut bag = KeyValueBag::new(1);
        bag.add("a", "1");
        bag.add("b", "2");
        bag.add("a", "3");
        let keys: Vec<_> = bag.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["a", "b", "a"]);
    }

    #[test]
    fn get_value_returns_first_match() {
        let mut bag = KeyValueBag::new(1);
        bag.add("dup", "first");
        bag.add("dup", "second");
        assert_eq!(bag.get_value("dup"), Some("first"));
    }

    #[test]
    fn update_no_add_is_noop_when_missing() {
        let mut bag = KeyValueBag::new(1);
        bag.update("missing", "x", false);
        assert_eq!(bag.count(), 0);
    }

    #[test]
    fn update_adds_when_missing_and_requested() {
        let mut bag = KeyValueBag::new(1);
        bag.update("missing", "x", true);
        assert_eq!(bag.get_value("missing"), Some("x"));
    }

    #[test]
    fn update_in_place_keeps_position() {
        let mut bag = KeyValueBag::new(1);
        bag.add("a", "1");
        bag.add("b", "2");
        bag.update("a", "99", false);
        let vals: Vec<_> = bag.iter().map(|e| e.val.as_str()).collect();
        assert_eq!(vals, ["99", "2"]);
    }

    #[test]
    fn remove_by_group_and_id() {
        let mut bag = KeyValueBag::new(7);
        bag.add("a", "1");
        bag.add("b", "2");
        let id_b = bag.get_struct("b").unwrap().id;
        assert!(bag.remove(7, id_b));
        assert_eq!(bag.count(), 1);
        assert!(bag.get_value("b").is_none());
    }

    #[test]
    fn merge_overlay_respects_add_if_missing() {
        let mut base = KeyValueBag::new(1);
        base.add("threads", "4");
        let mut overlay = KeyValueBag::new(2);
        overlay.add("threads", "8");
        overlay.add("loglevel", "info");
        base.merge_overlay(&overlay, true);
        assert_eq!(base.get_value("threads"), Some("8"));
        assert_eq!(base.get_value("loglevel"), Some("info"));
    }
}
