// ============================================================
// Layer 3 — Example Domain Types
// ============================================================
// A labelled review as it comes out of the CSV file, and the
// same review once it has been split into token strings.
//
// Reference: Rust Book §5 (Structs and Methods)

use serde::{Deserialize, Serialize};

/// One labelled piece of text.
/// Immutable once loaded; later stages only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// The raw review text, before cleaning or tokenisation
    pub text: String,

    /// Sentiment class index (0 = negative, 1 = positive for
    /// the binary datasets this is usually run on)
    pub label: u32,
}

impl Example {
    pub fn new(text: impl Into<String>, label: u32) -> Self {
        Self { text: text.into(), label }
    }
}

/// The token strings of an example, in reading order.
/// Still strings. Mapping to indices happens at dataloader time
/// against the vocabulary produced by pretraining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedExample {
    pub tokens: Vec<String>,
    pub label:  u32,
}

impl TokenizedExample {
    pub fn new(tokens: Vec<String>, label: u32) -> Self {
        Self { tokens, label }
    }
}

/// Parse the `sentiment` column.
///
/// Accepts plain class indices ("0", "1", ...) and the two
/// word labels used by the public IMDB dumps.
pub fn parse_label(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    match raw.to_ascii_lowercase().as_str() {
        "negative" | "neg" => Some(0),
        "positive" | "pos" => Some(1),
        _ => None,
    }
}
