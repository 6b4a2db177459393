//! Sorted-merge diff of two keyed sequences.

use std::cmp::Ordering;

/// Result of comparing candidate (left) and persisted (right) sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<L, R> {
    /// Present only on the left: to be created/added.
    pub left_only: Vec<L>,
    /// Present only on the right: to be deleted/removed.
    pub right_only: Vec<R>,
    /// Same key on both sides but different payload.
    pub changed: Vec<(L, R)>,
}

impl<L, R> Default for Diff<L, R> {
    fn default() -> Self {
        Self {
            left_only: Vec::new(),
            right_only: Vec::new(),
            changed: Vec::new(),
        }
    }
}

/// Merge-walks two sequences that are already sorted by key.
///
/// `compare` orders a left item against a right item by key. Runs in
/// O(n + m). Items whose keys match are passed to `differs`; those reported
/// as different land in `changed` and the rest are dropped.
pub fn diff_sorted<L, R, FC, FD>(
    left: Vec<L>,
    right: Vec<R>,
    compare: FC,
    differs: FD,
) -> Diff<L, R>
where
    FC: Fn(&L, &R) -> Ordering,
    FD: Fn(&L, &R) -> bool,
{
    let mut diff = Diff::default();
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (Some(this), Some(that)) => compare(this, that),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => diff.left_only.extend(left.next()),
            Ordering::Greater => diff.right_only.extend(right.next()),
            Ordering::Equal => {
                if let (Some(this), Some(that)) = (left.next(), right.next()) {
                    if differs(&this, &that) {
                        diff.changed.push((this, that));
                    }
                }
            }
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::diff_sorted;

    #[test]
    fn splits_into_three_disjoint_sets() {
        let left = vec![("a", 1), ("b", 2), ("d", 4)];
        let right = vec![("b", 20), ("c", 3), ("d", 4)];
        let diff = diff_sorted(left, right, |l, r| l.0.cmp(r.0), |l, r| l.1 != r.1);
        assert_eq!(diff.left_only, vec![("a", 1)]);
        assert_eq!(diff.right_only, vec![("c", 3)]);
        assert_eq!(diff.changed, vec![(("b", 2), ("b", 20))]);
    }

    #[test]
    fn empty_sides() {
        let diff = diff_sorted(Vec::<u8>::new(), vec![1u8, 2], |l, r| l.cmp(r), |_, _| false);
        assert!(diff.left_only.is_empty());
        assert_eq!(diff.right_only, vec![1, 2]);

        let diff = diff_sorted(vec![1u8], Vec::<u8>::new(), |l, r| l.cmp(r), |_, _| false);
        assert_eq!(diff.left_only, vec![1]);
        assert!(diff.changed.is_empty());
    }
}
