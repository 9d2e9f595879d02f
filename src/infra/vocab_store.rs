// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Persists the vocabulary built during pretraining so that
// fine-tuning maps tokens to the same indices the pretrained
// embedding rows were learned for.
//
//   vocab.json
//   {
//     "word2idx": { "<unk>": 0, "<pad>": 1, "<eos>": 2, "the": 3, ... },
//     "idx2word": [ "<unk>", "<pad>", "<eos>", "the", ... ]
//   }
//
// Loading validates the file (bijection, reserved tokens) and
// fails loudly: a vocabulary that disagrees with the checkpoint
// would silently scramble every embedding lookup.

use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::vocabulary::{Vocabulary, VocabularyFile};
use crate::infra::checkpoint::{read_json, write_json};

pub fn save_vocabulary(path: &Path, vocab: &Vocabulary) -> Result<()> {
    write_json(path, &vocab.to_file())?;
    tracing::info!("Saved vocabulary ({} words) to '{}'", vocab.len(), path.display());
    Ok(())
}

pub fn load_vocabulary(path: &Path) -> Result<Vocabulary> {
    let file: VocabularyFile = read_json(path)
        .with_context(|| format!("Cannot load vocabulary '{}'", path.display()))?;
    let vocab = Vocabulary::from_file(file)
        .with_context(|| format!("Invalid vocabulary '{}'", path.display()))?;
    tracing::info!("Loaded vocabulary: {} words", vocab.len());
    Ok(vocab)
}
