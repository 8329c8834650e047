//! Get-or-compute cache with mark-dirty invalidation.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

struct Slot<V> {
    value: Arc<V>,
    generation: u64,
    computed_at: DateTime<Utc>,
}

/// Values computed on first read and recomputed on the first read after an
/// invalidation. Invalidating never computes anything itself.
///
/// A value computed while an invalidation lands is stored under the older
/// generation, so the next read recomputes it.
pub struct BoardCache<K, V> {
    slots: DashMap<K, Slot<V>>,
    generations: DashMap<K, u64>,
}

impl<K, V> Default for BoardCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
            generations: DashMap::new(),
        }
    }
}

impl<K, V> BoardCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn generation(&self, key: &K) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }

    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let generation = self.generation(&key);
        if let Some(value) = self.fresh(&key, generation) {
            return Ok(value);
        }

        let value = Arc::new(compute().await?);
        self.slots.insert(
            key,
            Slot {
                value: value.clone(),
                generation,
                computed_at: Utc::now(),
            },
        );
        Ok(value)
    }

    fn fresh(&self, key: &K, generation: u64) -> Option<Arc<V>> {
        let slot = self.slots.get(key)?;
        (slot.generation == generation).then(|| slot.value.clone())
    }

    /// Mark the entry dirty
    pub fn invalidate(&self, key: &K) {
        self.generations
            .entry(key.clone())
            .and_modify(|g| *g += 1)
            .or_insert(1);
    }

    /// Whether the next read has to compute
    pub fn is_dirty(&self, key: &K) -> bool {
        let generation = self.generation(key);
        self.fresh(key, generation).is_none()
    }

    /// When the cached value (fresh or stale) was computed
    pub fn computed_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.slots.get(key).map(|slot| slot.computed_at)
    }
}
