//! Cell sequence differ.
//!
//! Computes a minimal edit script between two cell sequences with a
//! longest-common-subsequence table. The walk is deterministic: whenever two
//! cells are equivalent they are matched immediately, which yields the
//! earliest possible matches in both sequences, and when the table allows
//! skipping either side, the A cell is skipped first.

pub mod equivalence;
pub mod script;

use tracing::debug;

pub use equivalence::{EquivalenceConfig, DEFAULT_IGNORED_FIELDS};
pub use script::{EditKind, EditOp, EditScript};

use crate::notebook::Cell;

/// Diff `a` against `b` under `equiv`.
pub fn diff(a: &[Cell], b: &[Cell], equiv: &EquivalenceConfig) -> EditScript {
    let table = LcsTable::build(a, b, equiv);
    let (n, m) = (a.len(), b.len());
    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < n || j < m {
        let (si, sj) = (i, j);
        while i < n && j < m && table.eq(i, j) {
            i += 1;
            j += 1;
        }
        if i > si {
            ops.push(EditOp {
                kind: EditKind::Equal,
                a: si..i,
                b: sj..j,
            });
        }

        let (si, sj) = (i, j);
        loop {
            if i < n && j < m {
                if table.eq(i, j) {
                    break;
                }
                if table.len(i + 1, j) >= table.len(i, j + 1) {
                    i += 1;
                } else {
                    j += 1;
                }
            } else if i < n {
                i += 1;
            } else if j < m {
                j += 1;
            } else {
                break;
            }
        }
        if (i, j) != (si, sj) {
            let kind = match (i > si, j > sj) {
                (true, true) => EditKind::Replace,
                (true, false) => EditKind::Delete,
                _ => EditKind::Insert,
            };
            ops.push(EditOp {
                kind,
                a: si..i,
                b: sj..j,
            });
        }
    }

    debug!(len_a = n, len_b = m, ops = ops.len(), "computed cell diff");
    EditScript::new(ops, n, m)
}

/// Suffix LCS lengths plus the pairwise equivalence matrix.
struct LcsTable {
    m: usize,
    eq: Vec<bool>,
    lcs: Vec<u32>,
}

impl LcsTable {
    fn build(a: &[Cell], b: &[Cell], equiv: &EquivalenceConfig) -> Self {
        let (n, m) = (a.len(), b.len());
        let mut eq = vec![false; n * m];
        for (i, ca) in a.iter().enumerate() {
            for (j, cb) in b.iter().enumerate() {
                eq[i * m + j] = equiv.equivalent(ca, cb);
            }
        }

        let w = m + 1;
        let mut lcs = vec![0u32; (n + 1) * w];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                lcs[i * w + j] = if eq[i * m + j] {
                    lcs[(i + 1) * w + j + 1] + 1
                } else {
                    lcs[(i + 1) * w + j].max(lcs[i * w + j + 1])
                };
            }
        }
        Self { m, eq, lcs }
    }

    fn eq(&self, i: usize, j: usize) -> bool {
        self.eq[i * self.m + j]
    }

    /// LCS length of `a[i..]` and `b[j..]`.
    fn len(&self, i: usize, j: usize) -> u32 {
        self.lcs[i * (self.m + 1) + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(s: &str) -> Cell {
        Cell::markdown(s)
    }

    fn cells(names: &[&str]) -> Vec<Cell> {
        names.iter().map(|n| md(n)).collect()
    }

    fn kinds(script: &EditScript) -> Vec<EditKind> {
        script.iter().map(|op| op.kind).collect()
    }

    #[test]
    fn test_reflexive_diff_is_single_equal_run() {
        let a = cells(&["m1", "c1", "c2", "c1"]);
        let script = diff(&a, &a, &EquivalenceConfig::default());
        assert_eq!(script.ops().len(), 1);
        assert_eq!(script.ops()[0].kind, EditKind::Equal);
        assert_eq!(script.ops()[0].a, 0..4);
        assert_eq!(script.ops()[0].b, 0..4);
        assert!(script.is_identity());
    }

    #[test]
    fn test_both_empty() {
        let script = diff(&[], &[], &EquivalenceConfig::default());
        assert!(script.ops().is_empty());
    }

    #[test]
    fn test_insert_against_empty() {
        let b = cells(&["a", "b", "c"]);
        let script = diff(&[], &b, &EquivalenceConfig::default());
        assert_eq!(script.ops().len(), 1);
        let op = &script.ops()[0];
        assert_eq!(op.kind, EditKind::Insert);
        assert_eq!(op.a, 0..0);
        assert_eq!(op.b, 0..3);
    }

    #[test]
    fn test_trailing_delete() {
        let a = cells(&["m1", "c1", "c2"]);
        let b = cells(&["m1", "c1"]);
        let script = diff(&a, &b, &EquivalenceConfig::default());
        assert_eq!(kinds(&script), vec![EditKind::Equal, EditKind::Delete]);
        assert_eq!(script.ops()[1].a, 2..3);
        assert_eq!(script.ops()[1].b, 2..2);
    }

    #[test]
    fn test_replace_in_middle() {
        let a = cells(&["x", "old", "z"]);
        let b = cells(&["x", "new1", "new2", "z"]);
        let script = diff(&a, &b, &EquivalenceConfig::default());
        assert_eq!(
            kinds(&script),
            vec![EditKind::Equal, EditKind::Replace, EditKind::Equal]
        );
        assert_eq!(script.ops()[1].a, 1..2);
        assert_eq!(script.ops()[1].b, 1..3);
        assert_eq!(script.change_count(), 1);
    }

    #[test]
    fn test_prefers_earliest_match() {
        // "a" could match either b[0] or b[2]; the earliest pairing wins.
        let a = cells(&["a"]);
        let b = cells(&["a", "x", "a"]);
        let script = diff(&a, &b, &EquivalenceConfig::default());
        assert_eq!(kinds(&script), vec![EditKind::Equal, EditKind::Insert]);
        assert_eq!(script.ops()[0].pairs().collect::<Vec<_>>(), vec![(0, 0)]);
        assert_eq!(script.ops()[1].b, 1..3);
    }

    #[test]
    fn test_script_is_minimal() {
        let a = cells(&["a", "b", "c", "d", "e"]);
        let b = cells(&["b", "c", "x", "e", "f"]);
        let script = diff(&a, &b, &EquivalenceConfig::default());
        let matched: usize = script
            .iter()
            .filter(|op| op.kind == EditKind::Equal)
            .map(|op| op.a.len())
            .sum();
        assert_eq!(matched, 3);
        // Ranges tile both sequences without gaps.
        let mut next_a = 0;
        let mut next_b = 0;
        for op in &script {
            assert_eq!(op.a.start, next_a);
            assert_eq!(op.b.start, next_b);
            next_a = op.a.end;
            next_b = op.b.end;
        }
        assert_eq!((next_a, next_b), (5, 5));
    }

    #[test]
    fn test_diff_is_deterministic() {
        let a = cells(&["a", "b", "a", "c", "b"]);
        let b = cells(&["b", "a", "c", "a", "b"]);
        let eq = EquivalenceConfig::default();
        let first = diff(&a, &b, &eq);
        for _ in 0..10 {
            assert_eq!(diff(&a, &b, &eq), first);
        }
    }

    #[test]
    fn test_regenerated_ids_still_match() {
        let a = vec![md("intro").with_id("aaa"), Cell::code("x = 1").with_id("bbb")];
        let b = vec![md("intro").with_id("111"), Cell::code("x = 1").with_id("222")];
        assert!(diff(&a, &b, &EquivalenceConfig::default()).is_identity());
        assert!(!diff(&a, &b, &EquivalenceConfig::strict()).is_identity());
    }
}
