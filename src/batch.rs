//! Partitioning of coordinates into fixed-size query batches.

use crate::model::PackageCoordinate;

/// Maximum number of coordinates the component-report API accepts per request.
pub const BATCH_SIZE: usize = 128;

/// A contiguous, order-preserving group of at most [`BATCH_SIZE`] coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    index: usize,
    coordinates: Vec<PackageCoordinate>,
}

impl Batch {
    /// Position of this batch within its partition.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn coordinates(&self) -> &[PackageCoordinate] {
        &self.coordinates
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn into_coordinates(self) -> Vec<PackageCoordinate> {
        self.coordinates
    }
}

/// Splits `coordinates` into batches of `capacity`, the last one holding the
/// remainder. Concatenating the result reproduces the input exactly.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn partition(coordinates: Vec<PackageCoordinate>, capacity: usize) -> Vec<Batch> {
    assert!(capacity > 0, "batch capacity must be positive");

    let mut batches = Vec::with_capacity(coordinates.len().div_ceil(capacity));
    let mut iter = coordinates.into_iter().peekable();
    while iter.peek().is_some() {
        let chunk: Vec<PackageCoordinate> = iter.by_ref().take(capacity).collect();
        batches.push(Batch {
            index: batches.len(),
            coordinates: chunk,
        });
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coords(n: usize) -> Vec<PackageCoordinate> {
        (0..n)
            .map(|i| PackageCoordinate::maven("org.example", format!("artifact-{}", i), "1.0.0"))
            .collect()
    }

    #[test]
    fn test_partition_300() {
        let batches = partition(coords(300), BATCH_SIZE);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![128, 128, 44]);
        assert_eq!(batches[2].index(), 2);
        assert_eq!(batches[1].coordinates()[0].name(), "artifact-128");
    }

    #[test]
    fn test_partition_empty() {
        assert!(partition(Vec::new(), BATCH_SIZE).is_empty());
    }

    #[test]
    fn test_partition_exact_multiple() {
        let batches = partition(coords(256), BATCH_SIZE);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == BATCH_SIZE));
    }

    #[test]
    #[should_panic(expected = "batch capacity must be positive")]
    fn test_partition_zero_capacity() {
        partition(coords(1), 0);
    }

    proptest! {
        #[test]
        fn test_partition_is_lossless(n in 0usize..700, capacity in 1usize..200) {
            let input = coords(n);
            let batches = partition(input.clone(), capacity);

            prop_assert_eq!(batches.len(), n.div_ceil(capacity));
            prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= capacity));
            if let Some((last, rest)) = batches.split_last() {
                prop_assert!(rest.iter().all(|b| b.len() == capacity));
                let expected_last = if n % capacity == 0 { capacity } else { n % capacity };
                prop_assert_eq!(last.len(), expected_last);
            }

            let rejoined: Vec<PackageCoordinate> =
                batches.into_iter().flat_map(Batch::into_coordinates).collect();
            prop_assert_eq!(rejoined, input);
        }
    }
}
