//! # Keyed Free-List
//!
//! Bounded per-key stacks of recycled values.

use std::collections::HashMap;
use std::hash::Hash;

/// A free-list of recycled values grouped by a compatibility key.
///
/// Values pushed under a key can only be popped back with an equal key,
/// which is what makes it safe to hand a recycled GPU texture to a new
/// owner: shape and format are part of the key.
///
/// # Thread Safety
///
/// This list is NOT thread-safe. Wrap it in a mutex when shared.
///
/// # Example
///
/// ```rust,ignore
/// let mut free: KeyedFreeList<(u32, u32), TextureId> = KeyedFreeList::new(8);
///
/// // Evicted storage goes back to the list - O(1)
/// free.push((256, 256), id).ok();
///
/// // Same shape reclaims the same storage - O(1), no allocation
/// assert_eq!(free.pop(&(256, 256)), Some(id));
/// ```
pub struct KeyedFreeList<K, V> {
    /// One LIFO stack per key.
    lists: HashMap<K, Vec<V>>,
    /// Maximum values kept per key.
    capacity_per_key: usize,
    /// Total values across all keys.
    len: usize,
}

impl<K: Hash + Eq, V> KeyedFreeList<K, V> {
    /// Creates an empty free-list.
    ///
    /// # Arguments
    ///
    /// * `capacity_per_key` - Maximum number of values kept for one key
    ///
    /// # Panics
    ///
    /// Panics if `capacity_per_key` is zero.
    #[must_use]
    pub fn new(capacity_per_key: usize) -> Self {
        assert!(capacity_per_key > 0, "Capacity must be greater than zero");

        Self {
            lists: HashMap::new(),
            capacity_per_key,
            len: 0,
        }
    }

    /// Returns the per-key capacity.
    #[inline]
    #[must_use]
    pub const fn capacity_per_key(&self) -> usize {
        self.capacity_per_key
    }

    /// Returns the total number of values held.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no value is held.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of values held for `key`.
    #[must_use]
    pub fn len_for(&self, key: &K) -> usize {
        self.lists.get(key).map_or(0, Vec::len)
    }

    /// Pushes a value under `key`.
    ///
    /// This is a **O(1)** operation (amortized).
    ///
    /// # Returns
    ///
    /// `Err(value)` if the list for `key` is already at capacity; the caller
    /// keeps ownership and must dispose of it.
    pub fn push(&mut self, key: K, value: V) -> Result<(), V> {
        let list = self.lists.entry(key).or_default();
        if list.len() >= self.capacity_per_key {
            return Err(value);
        }

        list.push(value);
        self.len += 1;
        Ok(())
    }

    /// Pops the most recently pushed value for `key`.
    ///
    /// This is a **O(1)** operation.
    pub fn pop(&mut self, key: &K) -> Option<V> {
        let value = self.lists.get_mut(key)?.pop()?;
        self.len -= 1;
        Some(value)
    }

    /// Pops the most recently pushed value of any key accepted by `matches`.
    ///
    /// Which accepted key is visited first is unspecified.
    pub fn pop_matching(&mut self, mut matches: impl FnMut(&K) -> bool) -> Option<(K, V)>
    where
        K: Clone,
    {
        let (key, list) = self
            .lists
            .iter_mut()
            .find(|(key, list)| !list.is_empty() && matches(*key))?;
        let value = list.pop()?;
        self.len -= 1;
        Some((key.clone(), value))
    }

    /// Removes every value, returning them with their keys.
    pub fn drain(&mut self) -> Vec<(K, V)>
    where
        K: Clone,
    {
        let mut drained = Vec::with_capacity(self.len);
        for (key, list) in self.lists.drain() {
            drained.extend(list.into_iter().map(|value| (key.clone(), value)));
        }
        self.len = 0;
        drained
    }

    /// Iterates over all held values.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.lists
            .iter()
            .flat_map(|(key, list)| list.iter().map(move |value| (key, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_same_key() {
        let mut free: KeyedFreeList<u32, &str> = KeyedFreeList::new(4);

        free.push(1, "a").unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free.len_for(&1), 1);

        assert_eq!(free.pop(&1), Some("a"));
        assert!(free.is_empty());
    }

    #[test]
    fn test_key_mismatch_never_reclaims() {
        let mut free: KeyedFreeList<u32, u64> = KeyedFreeList::new(4);

        free.push(1, 100).unwrap();
        assert_eq!(free.pop(&2), None);
        assert_eq!(free.len(), 1);
        assert_eq!(free.pop(&1), Some(100));
    }

    #[test]
    fn test_per_key_capacity() {
        let mut free: KeyedFreeList<u32, u64> = KeyedFreeList::new(2);

        free.push(1, 10).unwrap();
        free.push(1, 11).unwrap();
        assert_eq!(free.push(1, 12), Err(12));

        // Other keys are unaffected.
        free.push(2, 20).unwrap();
        assert_eq!(free.len(), 3);
    }

    #[test]
    fn test_lifo_reuse() {
        let mut free: KeyedFreeList<u32, u64> = KeyedFreeList::new(4);

        free.push(1, 10).unwrap();
        free.push(1, 11).unwrap();
        assert_eq!(free.pop(&1), Some(11));
        assert_eq!(free.pop(&1), Some(10));
        assert_eq!(free.pop(&1), None);
    }

    #[test]
    fn test_drain() {
        let mut free: KeyedFreeList<u32, u64> = KeyedFreeList::new(4);
        free.push(1, 10).unwrap();
        free.push(2, 20).unwrap();

        let mut drained = free.drain();
        drained.sort_unstable();
        assert_eq!(drained, vec![(1, 10), (2, 20)]);
        assert!(free.is_empty());
        assert_eq!(free.iter().count(), 0);
    }

    #[test]
    fn test_pop_matching_skips_rejected_keys() {
        let mut free: KeyedFreeList<u32, u64> = KeyedFreeList::new(4);
        free.push(1, 10).unwrap();
        free.push(2, 20).unwrap();
        free.push(2, 21).unwrap();

        assert_eq!(free.pop_matching(|&key| key != 1), Some((2, 21)));
        assert_eq!(free.pop_matching(|&key| key != 1), Some((2, 20)));
        assert_eq!(free.pop_matching(|&key| key != 1), None);
        assert_eq!(free.len(), 1);
        assert_eq!(free.len_for(&1), 1);
    }

    #[test]
    #[should_panic(expected = "Capacity must be greater than zero")]
    fn test_zero_capacity_panics() {
        let _ = KeyedFreeList::<u32, u32>::new(0);
    }
}
