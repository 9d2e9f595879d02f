// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network and training code lives here.
//
//   encoder.rs    AWD-LSTM: embedding + stacked LSTMs with
//                 embedding, locked and output dropout
//   decoder.rs    concat-pooling classification head, and the
//                 (optionally tied) language-model projection
//   model.rs      SentimentClassifier and LanguageModel, with
//                 per-layer-group gradients for freezing
//   freezing.rs   layer groups and the gradual-unfreezing plan
//   scheduler.rs  linear warmup then linear decay
//   trainer.rs    classifier epoch loop and fine_tune driver
//   lm_trainer.rs BPTT training with AR/TAR and lr annealing
//   params.rs     parameter names and shapes, for checkpoint
//                 compatibility checks
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Howard & Ruder (2018) ULMFiT

/// Parameter name/shape bookkeeping
pub mod params;

/// AWD-LSTM encoder
pub mod encoder;

/// Classification and language-model heads
pub mod decoder;

/// Full models built from encoder + decoder
pub mod model;

/// Layer groups and gradual unfreezing
pub mod freezing;

/// Warmup-linear learning-rate schedule
pub mod scheduler;

/// Classifier fine-tuning loop
pub mod trainer;

/// Language-model pretraining loop
pub mod lm_trainer;
