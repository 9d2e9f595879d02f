// ============================================================
// Layer 4 — Word Tokenizer
// ============================================================
// Splits cleaned text into word-level token strings using the
// building blocks of the HuggingFace `tokenizers` crate:
//
//   raw text
//       │  Preprocessor      (HTML breaks, whitespace)
//       ▼
//   BertNormalizer         (lowercase, strip control chars,
//       │                   space out CJK characters)
//       ▼
//   Whitespace pre-tokenizer   (splits on \w+ | [^\w\s]+)
//       │
//       ▼
//   ["this", "movie", "was", "great", "!"]
//
// We stop at the pre-tokenizer on purpose: the vocabulary
// comes from language-model pretraining, so token strings are
// looked up there instead of in a tokenizer model.
//
// Pretraining encodes its corpus by whitespace alone and keeps
// case. This tokenizer also splits punctuation off words, so
// wikitext-style "'s" and "It's" do not produce the same pieces.
// Those words map to <unk> at fine-tuning time; the per-split
// <unk> rate reported by the dataset step shows how many.
//
// Reference: tokenizers crate documentation (Normalizer,
//            PreTokenizer, PreTokenizedString)

use anyhow::Result;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{
    NormalizedString, Normalizer, OffsetReferential, OffsetType, PreTokenizedString,
    PreTokenizer,
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::traits::TextTokenizer;

pub struct WordTokenizer {
    preprocessor:  Preprocessor,
    normalizer:    BertNormalizer,
    pre_tokenizer: Whitespace,
}

impl WordTokenizer {
    pub fn new(lowercase: bool) -> Self {
        Self {
            preprocessor:  Preprocessor::new(),
            normalizer:    BertNormalizer::new(true, true, None, lowercase),
            pre_tokenizer: Whitespace::default(),
        }
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TextTokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let cleaned = self.preprocessor.clean(text);

        let mut normalized = NormalizedString::from(cleaned.as_str());
        self.normalizer
            .normalize(&mut normalized)
            .map_err(|e| anyhow::anyhow!("Normalisation error: {e}"))?;

        let mut pretokenized = PreTokenizedString::from(normalized.get());
        self.pre_tokenizer
            .pre_tokenize(&mut pretokenized)
            .map_err(|e| anyhow::anyhow!("Pre-tokenisation error: {e}"))?;

        Ok(pretokenized
            .get_splits(OffsetReferential::Original, OffsetType::Byte)
            .into_iter()
            .map(|(piece, _, _)| piece.to_string())
            .collect())
    }
}
