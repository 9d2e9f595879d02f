// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer strings the other layers together into the two
// runs the tool offers: pretraining a language model and
// fine-tuning a sentiment classifier on top of it.
//
// Rules for this layer:
//   - No model math here (that's Layer 5)
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination and run configuration
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Device choice and backend dispatch
pub mod runtime;

// The language-model pretraining workflow
pub mod pretrain_use_case;

// The classifier fine-tuning workflow
pub mod finetune_use_case;
