//! Cache counters shared by every memoizer.

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that ran the underlying function.
    pub misses: u64,
    /// Entries dropped (round sweep, explicit clear, or ceiling bypass).
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache, `0.0` when unused.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    pub(crate) fn hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn evict(&mut self, count: usize) {
        self.evictions += count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_of_unused_cache_is_zero() {
        assert!(CacheStats::default().hit_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn hit_rate() {
        let stats = CacheStats { hits: 3, misses: 1, evictions: 0 };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
