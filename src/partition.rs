//! Range partitioning of the key domain
use crate::types::{DistSortError, Key, Result};

/// Maps a key to the worker owning its value range.
///
/// The domain `[0, max_value)` is cut into `partitions` equal ranges and key `v`
/// belongs to `min(floor(v * partitions / max_value), partitions - 1)`. Keys
/// below zero belong to the first range and keys at or above `max_value` to
/// the last, so every key has exactly one owner and owners never decrease as
/// keys grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePartitioner {
    partitions: usize,
    max_value: i128,
}

impl RangePartitioner {
    /// Create a partitioner over `[0, max_value)`
    pub fn new<K: Key>(partitions: usize, max_value: K) -> Result<Self> {
        if partitions == 0 {
            return Err(DistSortError::InvalidPartition(
                "at least one partition is required".to_string(),
            ));
        }
        let max_value = max_value.to_i128().unwrap_or_default();
        if max_value <= 0 {
            return Err(DistSortError::InvalidPartition(format!(
                "the key domain [0, {max_value}) is empty"
            )));
        }
        Ok(Self {
            partitions,
            max_value,
        })
    }

    /// Number of partitions
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Exclusive upper bound of the key domain
    pub fn max_value(&self) -> i128 {
        self.max_value
    }

    /// The partition owning `value`
    pub fn destination<K: Key>(&self, value: K) -> usize {
        let value = value.to_i128().unwrap_or_default();
        if value <= 0 {
            return 0;
        }
        let last = self.partitions as i128 - 1;
        (value * self.partitions as i128 / self.max_value).min(last) as usize
    }

    /// Smallest key owned by `partition`
    pub fn lower_bound(&self, partition: usize) -> i128 {
        // ceil(partition * max_value / partitions)
        let numerator = partition as i128 * self.max_value;
        let partitions = self.partitions as i128;
        (numerator + partitions - 1) / partitions
    }
}

#[cfg(test)]
mod test {
    use super::RangePartitioner;

    #[test]
    fn test_even_ranges() {
        let partitioner = RangePartitioner::new(4, 100i32).unwrap();
        assert_eq!(partitioner.destination(0), 0);
        assert_eq!(partitioner.destination(24), 0);
        assert_eq!(partitioner.destination(25), 1);
        assert_eq!(partitioner.destination(50), 2);
        assert_eq!(partitioner.destination(99), 3);
    }

    #[test]
    fn test_out_of_domain_clamps() {
        let partitioner = RangePartitioner::new(3, 10i64).unwrap();
        assert_eq!(partitioner.destination(-1i64), 0);
        assert_eq!(partitioner.destination(10i64), 2);
        assert_eq!(partitioner.destination(i64::MAX), 2);
        assert_eq!(partitioner.destination(i64::MIN), 0);
    }

    #[test]
    fn test_uneven_ranges_are_monotone_and_total() {
        let partitioner = RangePartitioner::new(7, 1_000i32).unwrap();
        let mut previous = 0;
        for v in 0..1_000i32 {
            let d = partitioner.destination(v);
            assert!(d < 7);
            assert!(d >= previous);
            // Pure: the same key always lands in the same place
            assert_eq!(d, partitioner.destination(v));
            previous = d;
        }
        assert_eq!(previous, 6);
    }

    #[test]
    fn test_lower_bounds_match_destinations() {
        let partitioner = RangePartitioner::new(7, 1_000i32).unwrap();
        for partition in 0..7 {
            let lower = partitioner.lower_bound(partition) as i32;
            assert_eq!(partitioner.destination(lower), partition);
            if lower > 0 {
                assert_eq!(partitioner.destination(lower - 1), partition - 1);
            }
        }
    }

    #[test]
    fn test_more_partitions_than_keys() {
        let partitioner = RangePartitioner::new(8, 3i32).unwrap();
        assert_eq!(partitioner.destination(0), 0);
        assert_eq!(partitioner.destination(1), 2);
        assert_eq!(partitioner.destination(2), 5);
    }

    #[test]
    fn test_invalid() {
        assert!(RangePartitioner::new(0, 10i32).is_err());
        assert!(RangePartitioner::new(2, 0i32).is_err());
        assert!(RangePartitioner::new(2, -5i32).is_err());
    }
}
