// PointCache - memoized (time -> value) entries for curve queries
// Invalidation rule: a mutation at time t drops every entry at or after t

use crate::timeline::{TIME_EPSILON, time_lte};

/// Sorted memo of `(time, value)` query results
///
/// Entries before a mutation stay exact because the underlying integrals
/// are additive; everything at or after the mutation is dropped. No
/// entry ever points at another entry, so there is no stale chain to
/// chase on invalidation.
#[derive(Debug, Clone, Default)]
pub(crate) struct PointCache {
    entries: Vec<(f64, f64)>,
}

impl PointCache {
    /// Latest cached `(time, value)` at or before `t`
    pub fn anchor(&self, t: f64) -> Option<(f64, f64)> {
        let index = self.entries.partition_point(|&(time, _)| time_lte(time, t));
        if index == 0 {
            None
        } else {
            Some(self.entries[index - 1])
        }
    }

    /// Cached value at exactly (epsilon-fuzzy) `t`
    pub fn get_exact(&self, t: f64) -> Option<f64> {
        self.anchor(t)
            .filter(|&(time, _)| (time - t).abs() <= TIME_EPSILON)
            .map(|(_, value)| value)
    }

    pub fn insert(&mut self, t: f64, value: f64) {
        let index = self
            .entries
            .partition_point(|&(time, _)| time < t - TIME_EPSILON);
        if let Some(entry) = self.entries.get_mut(index) {
            if (entry.0 - t).abs() <= TIME_EPSILON {
                *entry = (t, value);
                return;
            }
        }
        self.entries.insert(index, (t, value));
    }

    /// Drop every entry with `time >= t`
    pub fn invalidate_from(&mut self, t: f64) {
        let index = self
            .entries
            .partition_point(|&(time, _)| time < t - TIME_EPSILON);
        self.entries.truncate(index);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_and_exact() {
        let mut cache = PointCache::default();
        cache.insert(1.0, 10.0);
        cache.insert(2.0, 20.0);

        assert_eq!(cache.anchor(1.5), Some((1.0, 10.0)));
        assert_eq!(cache.anchor(0.5), None);
        assert_eq!(cache.get_exact(2.0), Some(20.0));
        assert_eq!(cache.get_exact(1.5), None);
    }

    #[test]
    fn test_invalidate_from() {
        let mut cache = PointCache::default();
        cache.insert(1.0, 10.0);
        cache.insert(2.0, 20.0);
        cache.insert(3.0, 30.0);

        cache.invalidate_from(2.0);
        assert_eq!(cache.get_exact(1.0), Some(10.0));
        assert_eq!(cache.get_exact(2.0), None);
        assert_eq!(cache.get_exact(3.0), None);
    }

    #[test]
    fn test_insert_replaces_fuzzy_duplicate() {
        let mut cache = PointCache::default();
        cache.insert(1.0, 10.0);
        cache.insert(1.0 + 1e-8, 11.0);
        assert_eq!(cache.get_exact(1.0), Some(11.0));
        assert_eq!(cache.anchor(5.0), Some((1.0 + 1e-8, 11.0)));
    }
}
