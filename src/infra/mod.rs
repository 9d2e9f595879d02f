// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the disk on behalf of other layers:
//
//   checkpoint.rs   language-model weights (CompactRecorder)
//                   plus a JSON manifest of encoder config and
//                   parameter shapes; partial encoder restore
//   vocab_store.rs  the pretraining vocabulary as JSON
//   token_cache.rs  fingerprinted JSON caches for tokenised
//                   splits and the encoded corpus
//   metrics.rs      per-epoch CSV logs, progress bars and the
//                   pretraining summary
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary persistence
pub mod vocab_store;

/// Fingerprinted artifact caches
pub mod token_cache;

/// Training metrics CSV loggers
pub mod metrics;
