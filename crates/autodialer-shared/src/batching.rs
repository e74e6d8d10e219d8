//! Conference group batching.
//!
//! A call list is dialed a few numbers at a time. [`make_groups`] cuts the
//! dialable sequence into contiguous chunks that partition it exactly.

use serde::{Deserialize, Serialize};

/// A contiguous slice of a call list dialed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceGroup {
    pub group_id: String,
    pub numbers: Vec<String>,
    pub start_index: usize,
    /// Inclusive.
    pub end_index: usize,
}

impl ConferenceGroup {
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Whether the number at `index` of the parent list falls in this group.
    pub fn contains_index(&self, index: usize) -> bool {
        index >= self.start_index && index <= self.end_index
    }
}

/// Partition `numbers` into groups of at most `max_group_size`, preserving
/// order. Only the final group may be short. A size of 0 is treated as 1.
pub fn make_groups(numbers: &[String], max_group_size: usize) -> Vec<ConferenceGroup> {
    let size = max_group_size.max(1);

    numbers
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| {
            let start_index = i * size;
            ConferenceGroup {
                group_id: format!("group-{}", i + 1),
                numbers: chunk.to_vec(),
                start_index,
                end_index: start_index + chunk.len() - 1,
            }
        })
        .collect()
}

/// Index of the group holding the number at `position`, clamped to the last
/// group. `None` when there are no groups.
pub fn group_for_position(groups: &[ConferenceGroup], position: usize) -> Option<usize> {
    if groups.is_empty() {
        return None;
    }
    Some(
        groups
            .iter()
            .position(|g| g.contains_index(position))
            .unwrap_or(groups.len() - 1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("1199999{:04}", i)).collect()
    }

    #[test]
    fn test_groups_partition_in_order() {
        for len in [0usize, 1, 5, 6, 7, 12, 13, 40] {
            for size in [1usize, 2, 6, 10] {
                let input = numbers(len);
                let groups = make_groups(&input, size);

                assert_eq!(groups.len(), len.div_ceil(size), "len={len} size={size}");
                assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= size));

                let joined: Vec<String> =
                    groups.iter().flat_map(|g| g.numbers.clone()).collect();
                assert_eq!(joined, input);
            }
        }
    }

    #[test]
    fn test_group_indices() {
        let groups = make_groups(&numbers(14), 6);
        assert_eq!(groups.len(), 3);
        assert_eq!((groups[0].start_index, groups[0].end_index), (0, 5));
        assert_eq!((groups[1].start_index, groups[1].end_index), (6, 11));
        assert_eq!((groups[2].start_index, groups[2].end_index), (12, 13));
        assert_eq!(groups[2].group_id, "group-3");
    }

    #[test]
    fn test_deterministic() {
        let input = numbers(9);
        assert_eq!(make_groups(&input, 4), make_groups(&input, 4));
    }

    #[test]
    fn test_zero_size_treated_as_one() {
        let groups = make_groups(&numbers(3), 0);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_group_for_position() {
        let groups = make_groups(&numbers(8), 6);
        assert_eq!(group_for_position(&groups, 0), Some(0));
        assert_eq!(group_for_position(&groups, 6), Some(1));
        assert_eq!(group_for_position(&groups, 8), Some(1));
        assert_eq!(group_for_position(&[], 0), None);
    }
}
