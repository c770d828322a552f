use crate::{IntrospectResult, IntrospectionParams, StageIntrospection};
use fnv::{FnvHashMap, FnvHasher};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

// Content hash of an introspection request. Equal params always have equal hashes, the reverse is
// confirmed by a full comparison.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IntrospectionHash(u64);

impl IntrospectionHash {
    pub fn from_params(params: &IntrospectionParams) -> IntrospectionHash {
        let mut hasher = FnvHasher::default();
        params.entry_point.hash(&mut hasher);
        if let Some(shader) = &params.shader {
            shader.stage.hash(&mut hasher);
            shader.content_type.hash(&mut hasher);
            shader.bytecode.hash(&mut hasher);
        }
        IntrospectionHash(hasher.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct IntrospectionCacheDef {
    /// Once this many results are cached, new results are still returned but no longer inserted.
    /// `None` means unbounded.
    pub max_entries: Option<usize>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct IntrospectionCacheMetrics {
    pub count: usize,
    /// Number of times an introspection was built because no cached result existed
    pub build_count: u64,
    pub hit_count: u64,
}

#[derive(Default)]
struct IntrospectionCacheInner {
    // Results are compared with the full params on lookup, so colliding hashes share a bucket
    buckets: FnvHashMap<IntrospectionHash, Vec<Arc<StageIntrospection>>>,
    count: usize,
}

impl IntrospectionCacheInner {
    fn find(
        &self,
        hash: IntrospectionHash,
        params: &IntrospectionParams,
    ) -> Option<&Arc<StageIntrospection>> {
        self.buckets
            .get(&hash)
            .and_then(|bucket| bucket.iter().find(|x| x.params() == params))
    }
}

/// Content-addressed store of finished introspections, shared between everything that
/// introspects shaders. Lookups take a read lock only, so cached reads never block each other.
///
/// Building happens outside the lock. Two threads missing on the same params may both build; the
/// first insert wins and both receive the same shared result.
pub struct IntrospectionCache {
    max_entries: Option<usize>,
    inner: RwLock<IntrospectionCacheInner>,
    build_count: AtomicU64,
    hit_count: AtomicU64,
}

impl Default for IntrospectionCache {
    fn default() -> Self {
        IntrospectionCache::new(&Default::default())
    }
}

impl IntrospectionCache {
    pub fn new(cache_def: &IntrospectionCacheDef) -> Self {
        IntrospectionCache {
            max_entries: cache_def.max_entries,
            inner: Default::default(),
            build_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
        }
    }

    pub fn get(
        &self,
        params: &IntrospectionParams,
    ) -> Option<Arc<StageIntrospection>> {
        let hash = IntrospectionHash::from_params(params);
        let guard = self.inner.read().unwrap();
        let result = guard.find(hash, params).cloned();
        if result.is_some() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Returns the cached result for `params`, calling `build_fn` if there is none. With
    /// `insert_to_cache` false, a freshly built result is handed back without being stored.
    pub fn get_or_build<F>(
        &self,
        params: &IntrospectionParams,
        insert_to_cache: bool,
        build_fn: F,
    ) -> IntrospectResult<Arc<StageIntrospection>>
    where
        F: FnOnce() -> IntrospectResult<StageIntrospection>,
    {
        if let Some(result) = self.get(params) {
            log::debug!("Introspection cache hit for entry point {}", params.entry_point);
            return Ok(result);
        }

        log::debug!("Introspection cache miss for entry point {}", params.entry_point);
        self.build_count.fetch_add(1, Ordering::Relaxed);
        let result = Arc::new((build_fn)()?);

        if insert_to_cache {
            Ok(self.insert(result))
        } else {
            Ok(result)
        }
    }

    /// Stores `result` and returns the shared instance for its params. If an equal result was
    /// inserted first, that one is returned instead and `result` is dropped.
    pub fn insert(
        &self,
        result: Arc<StageIntrospection>,
    ) -> Arc<StageIntrospection> {
        let hash = IntrospectionHash::from_params(result.params());
        let mut guard = self.inner.write().unwrap();

        if let Some(existing) = guard.find(hash, result.params()) {
            return existing.clone();
        }

        if let Some(max_entries) = self.max_entries {
            if guard.count >= max_entries {
                log::warn!(
                    "Introspection cache is full ({} entries), not caching entry point {}",
                    guard.count,
                    result.params().entry_point
                );
                return result;
            }
        }

        log::trace!(
            "insert introspection {:?} for entry point {}",
            hash,
            result.params().entry_point
        );
        guard.buckets.entry(hash).or_default().push(result.clone());
        guard.count += 1;
        result
    }

    /// Removes the result for `params`. Holders of the result keep it alive.
    pub fn evict(
        &self,
        params: &IntrospectionParams,
    ) -> Option<Arc<StageIntrospection>> {
        let hash = IntrospectionHash::from_params(params);
        let mut guard = self.inner.write().unwrap();

        let bucket = guard.buckets.get_mut(&hash)?;
        let index = bucket.iter().position(|x| x.params() == params)?;
        let removed = bucket.swap_remove(index);
        if bucket.is_empty() {
            guard.buckets.remove(&hash);
        }

        guard.count -= 1;
        Some(removed)
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap();
        log::debug!("Clearing {} cached introspections", guard.count);
        guard.buckets.clear();
        guard.count = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> IntrospectionCacheMetrics {
        IntrospectionCacheMetrics {
            count: self.len(),
            build_count: self.build_count.load(Ordering::Relaxed),
            hit_count: self.hit_count.load(Ordering::Relaxed),
        }
    }
}
