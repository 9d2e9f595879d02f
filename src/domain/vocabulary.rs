// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Bidirectional token <-> index mapping shared by language-model
// pretraining (which builds it) and fine-tuning (which only
// reads it).
//
// Invariant: `idx2word[word2idx[w]] == w` for every word and
// `word2idx[idx2word[i]] == i` for every index. The reserved
// tokens always exist.
//
// Reference: Rust Book §8 (HashMap)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_TOKEN: &str = "<pad>";
pub const EOS_TOKEN: &str = "<eos>";

/// Serialised form: the (mapping, sequence) pair written by pretraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyFile {
    pub word2idx: HashMap<String, usize>,
    pub idx2word: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    word2idx: HashMap<String, usize>,
    idx2word: Vec<String>,
    unk_idx:  usize,
    pad_idx:  usize,
}

impl Vocabulary {
    /// Empty vocabulary holding only the reserved tokens.
    pub fn new() -> Self {
        let mut vocab = Self {
            word2idx: HashMap::new(),
            idx2word: Vec::new(),
            unk_idx:  0,
            pad_idx:  0,
        };
        vocab.unk_idx = vocab.add_word(UNK_TOKEN);
        vocab.pad_idx = vocab.add_word(PAD_TOKEN);
        vocab.add_word(EOS_TOKEN);
        vocab
    }

    /// Insert `word` if unseen and return its index.
    pub fn add_word(&mut self, word: &str) -> usize {
        if let Some(&idx) = self.word2idx.get(word) {
            return idx;
        }
        let idx = self.idx2word.len();
        self.idx2word.push(word.to_string());
        self.word2idx.insert(word.to_string(), idx);
        idx
    }

    /// Rebuild from the serialised pair, checking the bijection.
    pub fn from_file(file: VocabularyFile) -> Result<Self> {
        let VocabularyFile { word2idx, idx2word } = file;

        if word2idx.len() != idx2word.len() {
            bail!(
                "Vocabulary is inconsistent: {} words in word2idx but {} in idx2word",
                word2idx.len(),
                idx2word.len()
            );
        }
        for (idx, word) in idx2word.iter().enumerate() {
            match word2idx.get(word) {
                Some(&i) if i == idx => {}
                Some(&i) => bail!("Vocabulary maps '{word}' to {i} but idx2word[{idx}] = '{word}'"),
                None => bail!("Vocabulary word '{word}' (index {idx}) missing from word2idx"),
            }
        }

        let unk_idx = match word2idx.get(UNK_TOKEN) {
            Some(&i) => i,
            None => bail!("Vocabulary has no '{UNK_TOKEN}' token"),
        };
        let pad_idx = match word2idx.get(PAD_TOKEN) {
            Some(&i) => i,
            None => bail!("Vocabulary has no '{PAD_TOKEN}' token"),
        };

        Ok(Self { word2idx, idx2word, unk_idx, pad_idx })
    }

    pub fn to_file(&self) -> VocabularyFile {
        VocabularyFile {
            word2idx: self.word2idx.clone(),
            idx2word: self.idx2word.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.idx2word.len()
    }

    pub fn unk_idx(&self) -> usize {
        self.unk_idx
    }

    pub fn pad_idx(&self) -> usize {
        self.pad_idx
    }

    pub fn index_of(&self, word: &str) -> Option<usize> {
        self.word2idx.get(word).copied()
    }

    /// Map a token sequence to indices, falling back to `<unk>`.
    /// Returns the indices and how many tokens were unknown.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> (Vec<u32>, usize) {
        let mut unknown = 0usize;
        let ids = tokens
            .iter()
            .map(|t| match self.index_of(t.as_ref()) {
                Some(i) => i as u32,
                None => {
                    unknown += 1;
                    self.unk_idx as u32
                }
            })
            .collect();
        (ids, unknown)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}
