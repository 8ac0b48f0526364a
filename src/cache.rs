use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// Storage for resolved values. Entries are never evicted implicitly.
pub trait Cache {
    type K;
    type V;

    /// Returns the value cached for `key`.
    fn lookup(&self, key: &Self::K) -> Option<&Self::V>;

    /// Stores `value`, replacing any previous entry.
    fn store(&mut self, key: Self::K, value: Self::V);

    /// Stores `value` only if `key` is absent. Returns whether the insertion happened.
    fn store_if_absent(&mut self, key: Self::K, value: Self::V) -> bool;

    fn evict(&mut self, keys: &[Self::K]);
    fn flush(&mut self);
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn lookup(&self, key: &Self::K) -> Option<&Self::V> {
        self.get(key)
    }

    fn store(&mut self, key: Self::K, value: Self::V) {
        self.insert(key, value);
    }

    fn store_if_absent(&mut self, key: Self::K, value: Self::V) -> bool {
        match self.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    fn evict(&mut self, keys: &[Self::K]) {
        for key in keys.iter() {
            self.remove(key);
        }
    }

    fn flush(&mut self) {
        self.clear();
    }
}
