//! Myers O(ND) line diff.
//!
//! Produces the shortest edit script between two line sequences. Common
//! prefix and suffix are stripped before the search so that the trace the
//! backtrack needs stays proportional to the edited region.

/// One step of an edit script, indexing into the old and new sequences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffOp {
    /// `old[old] == new[new]`.
    Equal {
        /// Index into the old sequence.
        old: usize,
        /// Index into the new sequence.
        new: usize,
    },
    /// `old[old]` is removed.
    Delete {
        /// Index into the old sequence.
        old: usize,
    },
    /// `new[new]` is inserted.
    Insert {
        /// Index into the new sequence.
        new: usize,
    },
}

impl DiffOp {
    /// Returns `true` for [`DiffOp::Equal`].
    #[must_use]
    pub const fn is_equal(self) -> bool {
        matches!(self, Self::Equal { .. })
    }
}

/// Compute a minimal edit script turning `old` into `new`.
///
/// The result is ordered: old indices and new indices are each visited
/// exactly once, in increasing order.
#[must_use]
pub fn diff<T: PartialEq>(old: &[T], new: &[T]) -> Vec<DiffOp> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = Vec::with_capacity(old.len().max(new.len()));
    ops.extend((0..prefix).map(|i| DiffOp::Equal { old: i, new: i }));
    for op in shortest_edit(old_mid, new_mid) {
        ops.push(match op {
            DiffOp::Equal { old, new } => DiffOp::Equal {
                old: old + prefix,
                new: new + prefix,
            },
            DiffOp::Delete { old } => DiffOp::Delete { old: old + prefix },
            DiffOp::Insert { new } => DiffOp::Insert { new: new + prefix },
        });
    }
    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    ops.extend((0..suffix).map(|i| DiffOp::Equal {
        old: old_tail + i,
        new: new_tail + i,
    }));
    ops
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn shortest_edit<T: PartialEq>(a: &[T], b: &[T]) -> Vec<DiffOp> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = a.len() + b.len();
    let offset = max as isize;
    let idx = |k: isize| (k + offset) as usize;

    let mut v = vec![0isize; 2 * max + 2];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max as isize {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let mut x = if k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]) {
                v[idx(k + 1)]
            } else {
                v[idx(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx(k)] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut ops = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[idx(prev_k)];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push(DiffOp::Equal {
                old: (x - 1) as usize,
                new: (y - 1) as usize,
            });
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                ops.push(DiffOp::Insert {
                    new: (y - 1) as usize,
                });
            } else {
                ops.push(DiffOp::Delete {
                    old: (x - 1) as usize,
                });
            }
        }
        x = prev_x;
        y = prev_y;
    }
    ops.reverse();
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replay an edit script and return the reconstructed new sequence.
    fn replay<'a>(old: &[&'a str], new: &[&'a str], ops: &[DiffOp]) -> Vec<&'a str> {
        let mut out = Vec::new();
        for op in ops {
            match *op {
                DiffOp::Equal { old: o, new: n } => {
                    assert_eq!(old[o], new[n]);
                    out.push(old[o]);
                }
                DiffOp::Insert { new: n } => out.push(new[n]),
                DiffOp::Delete { .. } => {}
            }
        }
        out
    }

    fn edits(ops: &[DiffOp]) -> usize {
        ops.iter().filter(|op| !op.is_equal()).count()
    }

    #[test]
    fn identical_sequences_are_all_equal() {
        let a = ["x", "y", "z"];
        let ops = diff(&a, &a);
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| op.is_equal()));
    }

    #[test]
    fn both_empty() {
        let empty: [&str; 0] = [];
        assert!(diff(&empty, &empty).is_empty());
    }

    #[test]
    fn insert_into_empty() {
        let empty: [&str; 0] = [];
        let b = ["a", "b"];
        let ops = diff(&empty, &b);
        assert_eq!(ops, vec![DiffOp::Insert { new: 0 }, DiffOp::Insert { new: 1 }]);
    }

    #[test]
    fn delete_everything() {
        let a = ["a", "b"];
        let empty: [&str; 0] = [];
        let ops = diff(&a, &empty);
        assert_eq!(ops, vec![DiffOp::Delete { old: 0 }, DiffOp::Delete { old: 1 }]);
    }

    #[test]
    fn single_substitution_is_minimal() {
        let a = ["A", "B", "C"];
        let b = ["A", "X", "C"];
        let ops = diff(&a, &b);
        assert_eq!(edits(&ops), 2);
        assert_eq!(replay(&a, &b, &ops), b.to_vec());
    }

    #[test]
    fn classic_myers_example() {
        let a: Vec<&str> = "ABCABBA".split("").filter(|s| !s.is_empty()).collect();
        let b: Vec<&str> = "CBABAC".split("").filter(|s| !s.is_empty()).collect();
        let ops = diff(&a, &b);
        assert_eq!(edits(&ops), 5);
        assert_eq!(replay(&a, &b, &ops), b);
    }

    #[test]
    fn indices_are_monotonic() {
        let a = ["1", "2", "3", "4", "5", "6"];
        let b = ["0", "2", "3", "x", "5", "6", "7"];
        let ops = diff(&a, &b);
        let mut last_old = None;
        let mut last_new = None;
        for op in &ops {
            match *op {
                DiffOp::Equal { old, new } => {
                    assert!(last_old.is_none_or(|l| old > l));
                    assert!(last_new.is_none_or(|l| new > l));
                    last_old = Some(old);
                    last_new = Some(new);
                }
                DiffOp::Delete { old } => {
                    assert!(last_old.is_none_or(|l| old > l));
                    last_old = Some(old);
                }
                DiffOp::Insert { new } => {
                    assert!(last_new.is_none_or(|l| new > l));
                    last_new = Some(new);
                }
            }
        }
        assert_eq!(replay(&a, &b, &ops), b.to_vec());
    }
}
