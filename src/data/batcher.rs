// ============================================================
// Layer 4 — Classification Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec of indexed
// samples into a (tokens, labels) tensor pair.
//
// How batching works here:
//   Input:  Vec of N ClassificationItems, each already padded to S
//   Output: ClassificationBatch with tokens [N, S] and labels [N]
//
//   All token ids are flattened into one Vec then reshaped:
//   [s1_t1, s1_t2, ..., s1_tS, s2_t1, ..., sN_tS] → [N, S]
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::ClassificationItem;

/// A batch of reviews ready for the classifier forward pass.
#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    /// Token ids, shape [batch_size, max_len]
    pub tokens: Tensor<B, 2, Int>,

    /// Class indices, shape [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

/// Holds the target device so tensors are created where the
/// model lives.
#[derive(Clone, Debug)]
pub struct ClassificationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ClassificationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ClassificationItem, ClassificationBatch<B>> for ClassificationBatcher<B> {
    fn batch(&self, items: Vec<ClassificationItem>) -> ClassificationBatch<B> {
        let batch_size = items.len();
        // Every item is pre-padded to the same length
        let seq_len    = items.first().map(|i| i.token_ids.len()).unwrap_or(0);

        let token_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.token_ids.iter().map(|&x| x as i32))
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        let tokens = Tensor::<B, 1, Int>::from_ints(token_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ClassificationBatch { tokens, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes() {
        let batcher = ClassificationBatcher::<NdArray>::new(Default::default());
        let items = vec![
            ClassificationItem { token_ids: vec![4, 5, 1, 1], label: 1 },
            ClassificationItem { token_ids: vec![6, 7, 8, 9], label: 0 },
            ClassificationItem { token_ids: vec![3, 1, 1, 1], label: 1 },
        ];
        let batch = batcher.batch(items);
        assert_eq!(batch.tokens.dims(), [3, 4]);
        assert_eq!(batch.labels.dims(), [3]);

        let labels = batch.labels.into_data().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![1, 0, 1]);
    }
}
