//! Read-only map views built lazily from a one-shot pair source.
//!
//! A [`LazyMapping`] keeps the pair iterator untouched until the first read.
//! The first `get`, `contains_key`, `len` or iteration drains it into a
//! `HashMap` through a single [`LazyCell`]; every later read uses that map.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::{Iter, Keys, Values};
use std::fmt;
use std::hash::Hash;

use crate::error::Result;
use crate::lazy::LazyCell;

/// A read-only mapping whose contents are built on first access.
///
/// Duplicate keys in the source keep the last value.
///
/// # Examples
/// ```
/// use injection_core::mapping::LazyMapping;
///
/// let ports = LazyMapping::new(vec![("http", 80u16), ("https", 443)]);
/// assert!(!ports.is_set());
///
/// assert_eq!(ports.get("https").unwrap(), Some(&443));
/// assert_eq!(ports.len().unwrap(), 2);
/// assert!(ports.is_set());
/// ```
pub struct LazyMapping<K, V> {
    lazy: LazyCell<HashMap<K, V>>,
}

impl<K, V> LazyMapping<K, V>
where
    K: Eq + Hash,
{
    /// Creates a mapping that will drain `pairs` on first access.
    pub fn new<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: Send + 'static,
        K: 'static,
        V: 'static,
    {
        let pairs = pairs.into_iter();
        Self {
            lazy: LazyCell::new(move || pairs.collect()),
        }
    }

    /// Returns the whole map, building it if needed.
    pub fn force(&self) -> Result<&HashMap<K, V>> {
        self.lazy.force()
    }

    /// Returns the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Result<Option<&V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.force()?.get(key))
    }

    /// Returns `true` if the mapping holds `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.force()?.contains_key(key))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.force()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.force()?.is_empty())
    }

    pub fn iter(&self) -> Result<Iter<'_, K, V>> {
        Ok(self.force()?.iter())
    }

    pub fn keys(&self) -> Result<Keys<'_, K, V>> {
        Ok(self.force()?.keys())
    }

    pub fn values(&self) -> Result<Values<'_, K, V>> {
        Ok(self.force()?.values())
    }
}

impl<K, V> LazyMapping<K, V> {
    /// Returns `true` once the source has started being drained.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.lazy.is_set()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for LazyMapping<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lazy.get() {
            Some(map) => f.debug_map().entries(map.iter()).finish(),
            None => f.debug_struct("LazyMapping").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InjectionError;
    use std::sync::{Arc, Weak};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    fn counted_source(pulled: Arc<AtomicU32>) -> impl Iterator<Item = (&'static str, u32)> + Send {
        vec![("a", 1), ("b", 2), ("c", 3)]
            .into_iter()
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
    }

    #[test]
    fn source_not_drained_until_read() {
        let pulled = Arc::new(AtomicU32::new(0));
        let mapping = LazyMapping::new(counted_source(pulled.clone()));

        assert_eq!(pulled.load(Ordering::SeqCst), 0);
        assert!(!mapping.is_set());
        assert!(format!("{mapping:?}").contains("LazyMapping"));

        drop(mapping);
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_read_shares_one_construction() {
        let pulled = Arc::new(AtomicU32::new(0));
        let mapping = LazyMapping::new(counted_source(pulled.clone()));

        assert_eq!(mapping.get("b").unwrap(), Some(&2));
        assert!(mapping.contains_key("c").unwrap());
        assert!(!mapping.contains_key("z").unwrap());
        assert_eq!(mapping.len().unwrap(), 3);
        assert!(!mapping.is_empty().unwrap());

        let mut keys: Vec<_> = mapping.keys().unwrap().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, ["a", "b", "c"]);

        let total: u32 = mapping.values().unwrap().sum();
        assert_eq!(total, 6);
        assert_eq!(mapping.iter().unwrap().count(), 3);

        assert_eq!(pulled.load(Ordering::SeqCst), 3);
        assert!(mapping.is_set());
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let mapping = LazyMapping::new(vec![("db", 1), ("cache", 2), ("db", 3)]);

        assert_eq!(mapping.len().unwrap(), 2);
        assert_eq!(mapping.get("db").unwrap(), Some(&3));
    }

    #[test]
    fn empty_source() {
        let mapping: LazyMapping<String, u8> = LazyMapping::new(Vec::new());
        assert!(mapping.is_empty().unwrap());
        assert_eq!(mapping.get("missing").unwrap(), None);
    }

    #[test]
    fn owned_keys_borrowed_lookup() {
        let mapping = LazyMapping::new(vec![(String::from("primary_db"), 5432u16)]);
        assert_eq!(mapping.get("primary_db").unwrap(), Some(&5432));
    }

    #[test]
    fn concurrent_reads_drain_once() {
        let pulled = Arc::new(AtomicU32::new(0));
        let mapping = LazyMapping::new(counted_source(pulled.clone()));

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| assert_eq!(mapping.get("a").unwrap(), Some(&1)));
            }
        });

        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_source_poisons_mapping() {
        let source = (0..3).map(|i| {
            if i == 2 {
                panic!("source exhausted early");
            }
            (i, i * 10)
        });
        let mapping = LazyMapping::new(source);

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| mapping.len()));
        assert!(first.is_err());

        assert!(matches!(
            mapping.len(),
            Err(InjectionError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn is_set_true_while_source_drains() {
        let mapping = Arc::new_cyclic(|weak: &Weak<LazyMapping<&'static str, bool>>| {
            let weak = weak.clone();
            LazyMapping::new(
                (0..1).map(move |_| ("draining", weak.upgrade().is_some_and(|m| m.is_set()))),
            )
        });

        assert!(!mapping.is_set());
        assert_eq!(mapping.get("draining").unwrap(), Some(&true));
        assert!(mapping.is_set());
    }

    #[test]
    fn debug_shows_entries_once_built() {
        let mapping = LazyMapping::new(vec![("k", 1)]);
        mapping.force().unwrap();
        assert!(format!("{mapping:?}").contains("\"k\": 1"));
    }
}
