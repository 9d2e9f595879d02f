// ============================================================
// Layer 4 — Language-Model Corpus
// ============================================================
// Everything the pretraining stage needs between raw token
// files and tensors:
//
//   wiki.train.tokens ─┐
//   wiki.valid.tokens ─┼─► Corpus::build   (one Vocabulary over all
//   wiki.test.tokens  ─┘                   three files, <eos> per line)
//                              │
//                              ▼
//                        batchify(ids, bs)  → `bs` equal rows
//                              │
//                              ▼
//                        BpttStream         → (start, len) windows
//                              │
//                              ▼
//                        LmBatch            → input / target tensors
//
// Reference: Merity et al. (2017) "Regularizing and Optimizing
//            LSTM Language Models" (batchify / variable BPTT)

use anyhow::{Context, Result};
use burn::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::domain::vocabulary::{Vocabulary, VocabularyFile, EOS_TOKEN};

/// Encoded corpus: the vocabulary plus the three id streams.
/// Serialisable so the pretraining stage can cache it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub vocab: VocabularyFile,
    pub train: Vec<u32>,
    pub valid: Vec<u32>,
    pub test:  Vec<u32>,
}

impl Corpus {
    /// Read and encode the three split files under `dir`.
    pub fn build(dir: &Path, train: &str, valid: &str, test: &str) -> Result<Self> {
        let mut vocab = Vocabulary::new();

        let train = encode_file(&dir.join(train), &mut vocab)?;
        let valid = encode_file(&dir.join(valid), &mut vocab)?;
        let test  = encode_file(&dir.join(test),  &mut vocab)?;

        tracing::info!(
            "Corpus built: vocab={}, train={} valid={} test={} tokens",
            vocab.len(),
            train.len(),
            valid.len(),
            test.len()
        );

        Ok(Self { vocab: vocab.to_file(), train, valid, test })
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        Vocabulary::from_file(self.vocab.clone())
    }
}

/// Whitespace-split every line, append `<eos>`, grow the vocabulary.
fn encode_file(path: &Path, vocab: &mut Vocabulary) -> Result<Vec<u32>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read corpus file '{}'", path.display()))?;
    Ok(encode_lines(&text, vocab))
}

pub fn encode_lines(text: &str, vocab: &mut Vocabulary) -> Vec<u32> {
    let mut ids = Vec::new();
    for line in text.lines() {
        for word in line.split_whitespace().chain(std::iter::once(EOS_TOKEN)) {
            ids.push(vocab.add_word(word) as u32);
        }
    }
    ids
}

/// Cut a token stream into `bs` rows of equal length, dropping
/// the remainder. Row `r` holds the r-th contiguous slice.
pub fn batchify(ids: &[u32], bs: usize) -> Vec<Vec<u32>> {
    let per_row = if bs == 0 { 0 } else { ids.len() / bs };
    (0..bs)
        .map(|r| ids[r * per_row..(r + 1) * per_row].to_vec())
        .collect()
}

/// Walks the batchified rows in BPTT windows.
pub struct BpttStream {
    rows:         Vec<Vec<u32>>,
    bptt:         usize,
    variable:     bool,
}

impl BpttStream {
    pub fn new(ids: &[u32], bs: usize, bptt: usize, variable: bool) -> Self {
        Self { rows: batchify(ids, bs), bptt: bptt.max(1), variable }
    }

    pub fn batch_size(&self) -> usize {
        self.rows.len()
    }

    pub fn row_len(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// (start, len) of every window for one epoch.
    ///
    /// With variable BPTT the base length is `bptt` 95% of the
    /// time and `bptt / 2` otherwise; the actual length is drawn
    /// from N(base, 5) and never below 5.
    pub fn windows<R: Rng>(&self, rng: &mut R) -> Vec<(usize, usize)> {
        let n = self.row_len();
        let mut out = Vec::new();
        let mut i = 0usize;
        while i + 1 < n {
            let len = if self.variable {
                let base = if rng.gen::<f64>() < 0.95 { self.bptt as f64 } else { self.bptt as f64 / 2.0 };
                let drawn = Normal::new(base, 5.0)
                    .map(|d| d.sample(rng))
                    .unwrap_or(base);
                (drawn.round().max(5.0)) as usize
            } else {
                self.bptt
            };
            let len = len.min(n - 1 - i);
            out.push((i, len));
            i += len;
        }
        out
    }

    /// Windows of exactly `bptt` steps (the last one may be shorter).
    pub fn fixed_windows(&self) -> Vec<(usize, usize)> {
        let n = self.row_len();
        (0..n.saturating_sub(1))
            .step_by(self.bptt)
            .map(|i| (i, self.bptt.min(n - 1 - i)))
            .collect()
    }

    /// Number of windows with fixed BPTT.
    pub fn num_windows(&self) -> usize {
        let n = self.row_len();
        if n < 2 { 0 } else { (n - 1).div_ceil(self.bptt) }
    }

    /// Build the input/target tensors for one window.
    pub fn batch<B: Backend>(&self, start: usize, len: usize, device: &B::Device) -> LmBatch<B> {
        let bs = self.rows.len();
        let mut inputs  = Vec::with_capacity(bs * len);
        let mut targets = Vec::with_capacity(bs * len);
        for row in &self.rows {
            inputs.extend(row[start..start + len].iter().map(|&x| x as i32));
            targets.extend(row[start + 1..start + 1 + len].iter().map(|&x| x as i32));
        }
        LmBatch {
            inputs:  Tensor::<B, 1, Int>::from_ints(inputs.as_slice(), device).reshape([bs, len]),
            targets: Tensor::<B, 1, Int>::from_ints(targets.as_slice(), device).reshape([bs, len]),
        }
    }
}

/// One BPTT window, shapes [bs, len] for both tensors.
#[derive(Debug, Clone)]
pub struct LmBatch<B: Backend> {
    pub inputs:  Tensor<B, 2, Int>,
    pub targets: Tensor<B, 2, Int>,
}
