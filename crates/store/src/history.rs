use cinder_core::ResourceKey;

/// Browser-style history: pushing while not at the tip discards the forward
/// entries. `index` stays within `[-1, len - 1]`.
#[derive(Debug, Clone)]
pub struct History {
    keys: Vec<ResourceKey>,
    index: isize,
}

impl Default for History {
    fn default() -> Self { Self { keys: Vec::new(), index: -1 } }
}

impl History {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.keys.len() }
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }
    pub fn index(&self) -> isize { self.index }
    pub fn keys(&self) -> &[ResourceKey] { &self.keys }

    pub fn current(&self) -> Option<&ResourceKey> {
        usize::try_from(self.index).ok().and_then(|i| self.keys.get(i))
    }

    pub fn push(&mut self, key: ResourceKey) {
        let keep = (self.index + 1) as usize;
        self.keys.truncate(keep);
        self.keys.push(key);
        self.index = self.keys.len() as isize - 1;
    }

    pub fn forward(&mut self) -> Option<&ResourceKey> {
        if self.index < self.keys.len() as isize - 1 {
            self.index += 1;
            self.current()
        } else {
            None
        }
    }

    pub fn backward(&mut self) -> Option<&ResourceKey> {
        if self.index > 0 {
            self.index -= 1;
            self.current()
        } else {
            None
        }
    }

    /// Remove every occurrence of `key`. Each removed occurrence at or before
    /// the index moves the index back by one. Returns the number removed.
    pub fn remove_all(&mut self, key: &ResourceKey) -> usize {
        let mut removed = 0;
        let current = self.index;
        let mut index = current;
        let mut pos = 0isize;
        self.keys.retain(|k| {
            let drop = k == key;
            if drop {
                removed += 1;
                if pos <= current {
                    index -= 1;
                }
            }
            pos += 1;
            !drop
        });
        self.index = if self.keys.is_empty() { -1 } else { index.max(0) };
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(keys: &[&str], index: isize) -> History {
        History { keys: keys.iter().map(|k| ResourceKey::from(*k)).collect(), index }
    }

    fn names(h: &History) -> Vec<&str> {
        h.keys().iter().map(|k| k.as_str()).collect()
    }

    #[test]
    fn push_truncates_forward_entries() {
        let mut hist = h(&["a", "b", "c"], 1);
        hist.push(ResourceKey::from("d"));
        assert_eq!(names(&hist), vec!["a", "b", "d"]);
        assert_eq!(hist.index(), 2);
    }

    #[test]
    fn first_push_starts_at_zero() {
        let mut hist = History::new();
        assert_eq!(hist.index(), -1);
        assert!(hist.current().is_none());
        hist.push(ResourceKey::from("clusters"));
        assert_eq!(hist.index(), 0);
    }

    #[test]
    fn backward_and_forward_respect_bounds() {
        let mut hist = h(&["a", "b"], 0);
        assert!(hist.backward().is_none());
        assert_eq!(hist.index(), 0);
        assert_eq!(hist.forward().map(|k| k.as_str()), Some("b"));
        assert_eq!(hist.index(), 1);
        assert!(hist.forward().is_none());
        assert_eq!(hist.index(), 1);
    }

    #[test]
    fn remove_all_repairs_index() {
        let mut hist = h(&["a", "b", "a", "c", "d"], 3);
        assert_eq!(hist.remove_all(&ResourceKey::from("a")), 2);
        assert_eq!(names(&hist), vec!["b", "c", "d"]);
        assert_eq!(hist.current().map(|k| k.as_str()), Some("c"));

        // Occurrences after the index leave it alone.
        let mut hist = h(&["a", "b", "c"], 0);
        hist.remove_all(&ResourceKey::from("c"));
        assert_eq!(hist.index(), 0);
    }

    #[test]
    fn removing_the_first_current_entry_clamps_to_zero() {
        let mut hist = h(&["a", "b"], 0);
        hist.remove_all(&ResourceKey::from("a"));
        assert_eq!(hist.index(), 0);
        assert_eq!(hist.current().map(|k| k.as_str()), Some("b"));

        hist.remove_all(&ResourceKey::from("b"));
        assert!(hist.is_empty());
        assert_eq!(hist.index(), -1);
    }
}
