// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts of
// the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Labelled text and its tokenised form
pub mod example;

// Token <-> index mapping built during pretraining
pub mod vocabulary;

// Core abstractions (traits) that other layers implement
pub mod traits;
