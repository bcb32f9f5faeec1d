use std::num::NonZeroUsize;

use crate::rules::CandidateRow;

/// A contiguous slice of the valid rows, submitted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub rows: Vec<CandidateRow>,
}

/// Partition `rows` into batches of at most `batch_size`, keeping order.
/// Only the last batch may be short.
pub fn schedule(rows: Vec<CandidateRow>, batch_size: NonZeroUsize) -> Vec<Batch> {
    let size = batch_size.get();
    let mut batches = Vec::with_capacity(rows.len().div_ceil(size));
    let mut rows = rows.into_iter().peekable();

    while rows.peek().is_some() {
        let chunk: Vec<CandidateRow> = rows.by_ref().take(size).collect();
        batches.push(Batch {
            index: batches.len(),
            rows: chunk,
        });
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Verdict;
    use std::collections::BTreeMap;

    fn rows(n: usize) -> Vec<CandidateRow> {
        (0..n)
            .map(|i| CandidateRow {
                line: i + 2,
                fields: BTreeMap::new(),
                verdict: Verdict::Valid,
            })
            .collect()
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn sizes_are_bounded_and_last_is_remainder() {
        for (n, b) in [(25, 10), (20, 10), (1, 10), (7, 1), (10, 3)] {
            let batches = schedule(rows(n), nz(b));
            assert_eq!(batches.len(), n.div_ceil(b), "n={n} b={b}");
            let (last, full) = batches.split_last().unwrap();
            assert!(full.iter().all(|batch| batch.rows.len() == b));
            let expected_last = if n % b == 0 { b } else { n % b };
            assert_eq!(last.rows.len(), expected_last);
        }
    }

    #[test]
    fn order_and_indices_are_preserved() {
        let batches = schedule(rows(25), nz(10));
        assert_eq!(batches.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        let lines: Vec<usize> = batches
            .iter()
            .flat_map(|b| b.rows.iter().map(|r| r.line))
            .collect();
        assert_eq!(lines, (2..27).collect::<Vec<_>>());
    }

    #[test]
    fn no_rows_no_batches() {
        assert!(schedule(Vec::new(), nz(10)).is_empty());
    }
}
