// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams other layers implement. The application layer only
// talks to these, so a CSV file, a JSONL dump or an in-memory
// fixture can all feed the same pipeline.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::example::Example;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Anything that can produce the full labelled dataset.
///
/// Implementations:
///   - CsvExampleLoader → `text` / `sentiment` columns of a CSV file
pub trait ExampleSource {
    fn load_all(&self) -> Result<Vec<Example>>;
}

// ─── TextTokenizer ────────────────────────────────────────────────────────────
/// Splits raw text into token strings.
///
/// Implementations:
///   - WordTokenizer → BERT normaliser + whitespace/punctuation split
pub trait TextTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;

    /// Tokenise a batch, preserving order.
    fn tokenize_all(&self, texts: &[&str]) -> Result<Vec<Vec<String>>> {
        texts.iter().map(|t| self.tokenize(t)).collect()
    }
}
