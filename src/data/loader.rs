// ============================================================
// Layer 4 — Labelled CSV Loader
// ============================================================
// Reads the labelled dataset from a CSV file using the csv crate.
//
// Expected layout (extra columns are ignored):
//
//   text,sentiment
//   "A wonderful little production. <br /><br />The ...",positive
//   "Basically there's a family where a little boy ...",negative
//
// `sentiment` may be a class index or a word label, see
// `domain::example::parse_label`.
//
// A row that cannot be parsed aborts the load with its row
// number; there is no partial dataset.
//
// Reference: csv crate documentation (Deserialize records)
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::example::{parse_label, Example};
use crate::domain::traits::ExampleSource;

/// One raw CSV record. Only the two columns we need are named,
/// serde skips the rest.
#[derive(Debug, Deserialize)]
struct CsvRow {
    text:      String,
    sentiment: String,
}

/// Loads labelled examples from a CSV file.
/// Implements the ExampleSource trait from Layer 3.
pub struct CsvExampleLoader {
    path: PathBuf,
}

impl CsvExampleLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl ExampleSource for CsvExampleLoader {
    fn load_all(&self) -> Result<Vec<Example>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Cannot open dataset '{}'", self.path.display()))?;

        let mut examples = Vec::new();

        // Row 1 is the header, so data rows start at 2
        for (i, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row_no = i + 2;
            let row = record.with_context(|| {
                format!("Malformed row {} in '{}'", row_no, self.path.display())
            })?;

            let label = match parse_label(&row.sentiment) {
                Some(l) => l,
                None => bail!(
                    "Row {} in '{}' has an unrecognised sentiment '{}'",
                    row_no,
                    self.path.display(),
                    row.sentiment
                ),
            };

            examples.push(Example::new(row.text, label));
        }

        tracing::info!(
            "Loaded {} labelled examples from '{}'",
            examples.len(),
            self.path.display()
        );
        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_loads_text_and_labels() {
        let f = write_csv("text,sentiment\n\"Great, great film\",positive\nawful,0\n");
        let examples = CsvExampleLoader::new(f.path()).load_all().unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0], Example::new("Great, great film", 1));
        assert_eq!(examples[1].label, 0);
    }

    #[test]
    fn test_ignores_extra_columns() {
        let f = write_csv("id,text,sentiment,source\n7,fine,1,imdb\n");
        let examples = CsvExampleLoader::new(f.path()).load_all().unwrap();
        assert_eq!(examples, vec![Example::new("fine", 1)]);
    }

    #[test]
    fn test_bad_label_reports_row() {
        let f = write_csv("text,sentiment\nok,1\nhmm,maybe\n");
        let err = CsvExampleLoader::new(f.path()).load_all().unwrap_err();
        assert!(err.to_string().contains("Row 3"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = CsvExampleLoader::new("/definitely/not/here.csv");
        assert!(loader.load_all().is_err());
    }
}
