// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw files to tensor batches.
//
// Fine-tuning flows in this order:
//
//   sentiment CSV
//       │
//       ▼
//   CsvExampleLoader  → (text, label) examples
//       │
//       ▼
//   split_train_val   → seeded 70/30 split
//       │
//       ▼
//   WordTokenizer     → token strings (cached by infra::token_cache)
//       │
//       ▼
//   encode_examples   → vocabulary ids, truncated/padded
//       │
//       ▼
//   SentimentDataset  → implements Burn's Dataset trait
//       │
//       ▼
//   EpochLoader       → shuffles, drops the short tail, calls
//                       ClassificationBatcher per batch
//
// Pretraining uses `corpus` instead: token files → Corpus →
// BPTT windows.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the labelled CSV file
pub mod loader;

/// Cleans scraped review text
pub mod preprocessor;

/// Splits text into word-level tokens
pub mod tokenizer;

/// Shuffles and splits data into train/validation sets
pub mod splitter;

/// Indexed samples and Burn's Dataset trait
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Epoch iteration with shuffling and drop-last
pub mod dataloader;

/// Language-model corpus, batchify and BPTT windows
pub mod corpus;
