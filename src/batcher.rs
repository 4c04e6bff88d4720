//! Splits the pending stories into completion-sized batches.

/// Lazy, single-pass iterator over batches of at most `max_size` items.
///
/// Every yielded batch is non-empty. An empty input yields nothing.
#[derive(Debug)]
pub struct Batches<I> {
    inner: I,
    max_size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<_> = self.inner.by_ref().take(self.max_size).collect();
        (!batch.is_empty()).then_some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.inner.size_hint();
        (
            lo.div_ceil(self.max_size),
            hi.map(|hi| hi.div_ceil(self.max_size)),
        )
    }
}

/// Partition `items` into consecutive batches of at most `max_size`.
///
/// A `max_size` of zero is treated as one.
pub fn batches<I: IntoIterator>(items: I, max_size: usize) -> Batches<I::IntoIter> {
    Batches {
        inner: items.into_iter(),
        max_size: max_size.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Story;

    fn stories(n: i32) -> Vec<Story> {
        (1..=n).map(|i| Story::new(i, format!("title {i}"))).collect()
    }

    #[test]
    fn test_batch_count_and_sizes() {
        for (len, size) in [(1, 50), (50, 50), (51, 50), (120, 40), (7, 3), (9, 3)] {
            let input = stories(len);
            let out: Vec<_> = batches(input.clone(), size).collect();
            assert_eq!(out.len(), (len as usize).div_ceil(size), "len={len} size={size}");
            assert!(out.iter().all(|b| !b.is_empty() && b.len() <= size));
            let flat: Vec<Story> = out.into_iter().flatten().collect();
            assert_eq!(flat, input);
        }
    }

    #[test]
    fn test_last_batch_is_partial() {
        let out: Vec<_> = batches(stories(7), 3).collect();
        assert_eq!(out.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        let mut it = batches(Vec::<Story>::new(), 50);
        assert!(it.next().is_none());
        assert_eq!(it.size_hint(), (0, Some(0)));
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let out: Vec<_> = batches(stories(3), 0).collect();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_is_lazy() {
        let mut pulled = 0;
        let source = (0..1_000).inspect(|_| pulled += 1);
        let first = batches(source, 10).next().unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(pulled, 10);
    }
}
