// ============================================================
// Layer 4 — Epoch Loader
// ============================================================
// Feeds batches to the training loop, one epoch at a time.
//
// Burn's DataLoaderBuilder always emits the trailing partial
// batch, so this loader does the index bookkeeping itself and
// hands each group of items to a Burn `Batcher`:
//
//   epoch()  ──►  order = 0..n   (shuffled with the loader RNG
//                 │               when `shuffle` is set)
//                 ▼
//               chunks of `batch_size` indices
//                 │   (last chunk dropped when short and
//                 │    `drop_last` is set)
//                 ▼
//               Dataset::get → Batcher::batch → O
//
// Every call to `epoch()` starts over, drawing a fresh
// permutation from the same seeded RNG, so runs with the same
// seed see the same batch order.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

use std::marker::PhantomData;

use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub shuffle:    bool,
    pub drop_last:  bool,
    pub seed:       u64,
}

pub struct EpochLoader<I, O, D, Bt> {
    dataset: D,
    batcher: Bt,
    options: LoaderOptions,
    rng:     StdRng,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, D, Bt> EpochLoader<I, O, D, Bt>
where
    D: Dataset<I>,
    Bt: Batcher<I, O>,
{
    pub fn new(dataset: D, batcher: Bt, options: LoaderOptions) -> Self {
        assert!(options.batch_size > 0, "batch_size must be positive");
        Self {
            dataset,
            batcher,
            rng: StdRng::seed_from_u64(options.seed),
            options,
            _marker: PhantomData,
        }
    }

    /// Number of examples behind the loader.
    pub fn num_items(&self) -> usize {
        self.dataset.len()
    }

    /// Number of batches one epoch yields.
    pub fn num_batches(&self) -> usize {
        batch_count(self.dataset.len(), self.options.batch_size, self.options.drop_last)
    }

    /// Start a new epoch.
    pub fn epoch(&mut self) -> EpochIter<'_, I, O, D, Bt> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.options.shuffle {
            order.shuffle(&mut self.rng);
        }
        let num_batches = self.num_batches();
        EpochIter {
            dataset:    &self.dataset,
            batcher:    &self.batcher,
            order,
            batch_size: self.options.batch_size,
            next_batch: 0,
            num_batches,
            _marker:    PhantomData,
        }
    }
}

/// Batches per epoch for `n` items.
pub fn batch_count(n: usize, batch_size: usize, drop_last: bool) -> usize {
    if drop_last { n / batch_size } else { n.div_ceil(batch_size) }
}

pub struct EpochIter<'a, I, O, D, Bt> {
    dataset:    &'a D,
    batcher:    &'a Bt,
    order:      Vec<usize>,
    batch_size: usize,
    next_batch: usize,
    num_batches: usize,
    _marker:    PhantomData<fn(I) -> O>,
}

impl<I, O, D, Bt> Iterator for EpochIter<'_, I, O, D, Bt>
where
    D: Dataset<I>,
    Bt: Batcher<I, O>,
{
    type Item = O;

    fn next(&mut self) -> Option<O> {
        if self.next_batch >= self.num_batches {
            return None;
        }
        let start = self.next_batch * self.batch_size;
        let end   = (start + self.batch_size).min(self.order.len());
        self.next_batch += 1;

        let items: Vec<I> = self.order[start..end]
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();
        Some(self.batcher.batch(items))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.num_batches - self.next_batch;
        (left, Some(left))
    }
}

impl<I, O, D, Bt> ExactSizeIterator for EpochIter<'_, I, O, D, Bt>
where
    D: Dataset<I>,
    Bt: Batcher<I, O>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;

    /// Batcher that just hands the items back.
    struct Collect;

    impl Batcher<usize, Vec<usize>> for Collect {
        fn batch(&self, items: Vec<usize>) -> Vec<usize> {
            items
        }
    }

    fn loader(n: usize, batch_size: usize, shuffle: bool, drop_last: bool)
        -> EpochLoader<usize, Vec<usize>, InMemDataset<usize>, Collect>
    {
        let options = LoaderOptions { batch_size, shuffle, drop_last, seed: 42 };
        EpochLoader::new(InMemDataset::new((0..n).collect()), Collect, options)
    }

    #[test]
    fn test_drop_last_yields_only_full_batches() {
        let mut l = loader(100, 64, true, true);
        let batches: Vec<_> = l.epoch().collect();
        assert_eq!(batches.len(), 1);
        assert!(batches.iter().all(|b| b.len() == 64));
    }

    #[test]
    fn test_keep_last_yields_partial_batch() {
        let mut l = loader(100, 64, false, false);
        let sizes: Vec<usize> = l.epoch().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![64, 36]);
    }

    #[test]
    fn test_documented_run_batch_counts() {
        let train = loader(17_500, 64, true, true);
        let valid = loader(7_500, 64, false, true);
        assert_eq!(train.num_batches(), 273);
        assert_eq!(valid.num_batches(), 117);
    }

    #[test]
    fn test_batch_count_is_floor_with_drop_last() {
        for (n, b) in [(0, 4), (3, 4), (4, 4), (9, 4), (1000, 7)] {
            let mut l = loader(n, b, true, true);
            let batches: Vec<_> = l.epoch().collect();
            assert_eq!(batches.len(), n / b);
            assert!(batches.iter().all(|x| x.len() == b));
        }
    }

    #[test]
    fn test_unshuffled_keeps_order() {
        let mut l = loader(6, 3, false, true);
        let batches: Vec<_> = l.epoch().collect();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_shuffle_changes_between_epochs_but_is_seeded() {
        let mut a = loader(50, 10, true, true);
        let mut b = loader(50, 10, true, true);
        let a1: Vec<_> = a.epoch().collect();
        let a2: Vec<_> = a.epoch().collect();
        let b1: Vec<_> = b.epoch().collect();
        assert_eq!(a1, b1);
        assert_ne!(a1, a2);
    }

    #[test]
    fn test_epoch_is_restartable() {
        let mut l = loader(10, 5, false, true);
        assert_eq!(l.epoch().count(), 2);
        assert_eq!(l.epoch().count(), 2);
    }
}
