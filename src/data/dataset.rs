use anyhow::{bail, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::example::TokenizedExample;
use crate::domain::vocabulary::Vocabulary;

/// One fully indexed and padded classification sample.
/// `token_ids.len()` is always the configured max length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationItem {
    pub token_ids: Vec<u32>,
    pub label:     u32,
}

/// Truncate to `max_len`, or right-pad with `pad_idx` up to it.
pub fn pad_or_truncate(mut ids: Vec<u32>, max_len: usize, pad_idx: u32) -> Vec<u32> {
    ids.truncate(max_len);
    ids.resize(max_len, pad_idx);
    ids
}

/// Counts gathered while indexing a split.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncodingStats {
    pub tokens:    usize,
    pub unknown:   usize,
    pub truncated: usize,
}

impl EncodingStats {
    pub fn unknown_rate(&self) -> f64 {
        if self.tokens == 0 { 0.0 } else { self.unknown as f64 / self.tokens as f64 }
    }
}

/// Index a tokenised split against the vocabulary.
///
/// Fails on a label outside `0..num_classes`, and when more than
/// `max_unknown_rate` of all tokens fall back to `<unk>`. That
/// is what a tokenizer/vocabulary mismatch looks like.
pub fn encode_examples(
    examples:         &[TokenizedExample],
    vocab:            &Vocabulary,
    max_len:          usize,
    num_classes:      usize,
    max_unknown_rate: f64,
) -> Result<(Vec<ClassificationItem>, EncodingStats)> {
    let pad_idx   = vocab.pad_idx() as u32;
    let mut stats = EncodingStats::default();
    let mut items = Vec::with_capacity(examples.len());

    for (i, ex) in examples.iter().enumerate() {
        if ex.label as usize >= num_classes {
            bail!("Example {} has label {} but the model has {} classes", i, ex.label, num_classes);
        }
        let (ids, unknown) = vocab.encode(&ex.tokens);
        stats.tokens  += ids.len();
        stats.unknown += unknown;
        if ids.len() > max_len {
            stats.truncated += 1;
        }
        items.push(ClassificationItem {
            token_ids: pad_or_truncate(ids, max_len, pad_idx),
            label:     ex.label,
        });
    }

    if stats.unknown_rate() > max_unknown_rate {
        bail!(
            "{:.1}% of tokens are unknown to the vocabulary (limit {:.1}%); \
             the token cache or vocabulary probably belongs to a different corpus",
            stats.unknown_rate() * 100.0,
            max_unknown_rate * 100.0
        );
    }

    Ok((items, stats))
}

pub struct SentimentDataset {
    items: Vec<ClassificationItem>,
}

impl SentimentDataset {
    pub fn new(items: Vec<ClassificationItem>) -> Self { Self { items } }
}

impl Dataset<ClassificationItem> for SentimentDataset {
    fn get(&self, index: usize) -> Option<ClassificationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab_with(words: &[&str]) -> Vocabulary {
        let mut v = Vocabulary::new();
        for w in words {
            v.add_word(w);
        }
        v
    }

    #[test]
    fn test_long_sequences_truncated_to_exact_length() {
        let out = pad_or_truncate((0..600).collect(), 512, 1);
        assert_eq!(out.len(), 512);
        assert_eq!(out[511], 511);
    }

    #[test]
    fn test_short_sequences_padded_to_exact_length() {
        let out = pad_or_truncate(vec![5, 6, 7], 8, 1);
        assert_eq!(out, vec![5, 6, 7, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_encode_examples_pads_and_maps_unknown() {
        let vocab = vocab_with(&["good", "film"]);
        let examples = vec![TokenizedExample::new(
            vec!["good".into(), "film".into(), "xyzzy".into()],
            1,
        )];
        let (items, stats) = encode_examples(&examples, &vocab, 5, 2, 0.5).unwrap();
        let good = vocab.index_of("good").unwrap() as u32;
        let film = vocab.index_of("film").unwrap() as u32;
        let unk  = vocab.unk_idx() as u32;
        let pad  = vocab.pad_idx() as u32;
        assert_eq!(items[0].token_ids, vec![good, film, unk, pad, pad]);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.tokens, 3);
    }

    #[test]
    fn test_encode_rejects_vocabulary_mismatch() {
        let vocab = vocab_with(&["good"]);
        let examples = vec![TokenizedExample::new(vec!["a".into(), "b".into(), "good".into()], 0)];
        assert!(encode_examples(&examples, &vocab, 4, 2, 0.5).is_err());
    }

    #[test]
    fn test_encode_rejects_label_out_of_range() {
        let vocab = vocab_with(&["good"]);
        let examples = vec![TokenizedExample::new(vec!["good".into()], 2)];
        assert!(encode_examples(&examples, &vocab, 4, 2, 1.0).is_err());
    }

    #[test]
    fn test_dataset_get() {
        let ds = SentimentDataset::new(vec![ClassificationItem { token_ids: vec![3, 1], label: 0 }]);
        assert_eq!(ds.len(), 1);
        assert!(ds.get(1).is_none());
    }
}
