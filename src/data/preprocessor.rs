// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Cleans raw review text before tokenisation.
//
// Scraped review dumps often contain:
//   - HTML line breaks (<br />, <br>) left over from the site
//   - HTML entities for quotes and ampersands
//   - Non-breaking and zero-width spaces
//   - Tabs, carriage returns and other control characters
//   - Runs of spaces
//
// Cleaning steps (applied in order):
//   1. Replace HTML line breaks with a newline
//   2. Decode the handful of common HTML entities
//   3. Map Unicode whitespace/control characters to plain space
//   4. Collapse runs of spaces and trim every line
//   5. Drop empty lines
//
// Reference: Rust Book §8 (Strings in Rust)
//            Rust Book §13 (Iterators)

const LINE_BREAKS: [&str; 4] = ["<br />", "<br/>", "<br>", "<BR>"];

const ENTITIES: [(&str, &str); 5] = [
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
];

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a raw text string for downstream tokenisation.
    pub fn clean(&self, text: &str) -> String {
        // ── Step 1 + 2: markup left over from scraping ────────────────────────
        let mut s = text.to_string();
        for br in LINE_BREAKS {
            s = s.replace(br, "\n");
        }
        for (entity, plain) in ENTITIES {
            s = s.replace(entity, plain);
        }

        // ── Step 3: normalise individual characters ──────────────────────────
        let s: String = s
            .chars()
            .map(|c| match c {
                '\t' | '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                '\r' => '\n',
                c if c.is_control() && c != '\n' => ' ',
                c => c,
            })
            .collect();

        // ── Step 4 + 5: per-line whitespace cleanup ──────────────────────────
        s.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_html_breaks() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("Great.<br /><br />Loved it."), "Great.\nLoved it.");
    }

    #[test]
    fn test_decodes_entities() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("&quot;Wow&quot; &amp; more"), "\"Wow\" & more");
    }

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("hello   world"), "hello world");
    }

    #[test]
    fn test_removes_control_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("hello\x01world"), "hello world");
    }

    #[test]
    fn test_empty_string() {
        let p = Preprocessor::new();
        assert_eq!(p.clean(""), "");
        assert_eq!(p.clean("  <br />  "), "");
    }
}
