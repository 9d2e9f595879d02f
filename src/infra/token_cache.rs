// ============================================================
// Layer 6 — Artifact Cache
// ============================================================
// Tokenising 25k reviews or encoding a wikitext corpus takes
// long enough that both stages keep the result on disk:
//
//   <cache_dir>/<name>.json
//   {
//     "fingerprint": "9f86d0...",   SHA-256 over the inputs
//     "payload":     { ... }        whatever was built
//   }
//
// load_or_build(name, fingerprint, build):
//   - file missing                  → build, store, return
//   - fingerprint equal             → return cached payload
//   - fingerprint differs           → warn, build, overwrite
//   - file unreadable / malformed   → warn, build, overwrite
//
// The fingerprint hashes the split texts in order, so a cache
// written for a different shuffle or dataset is never reused.
//
// Reference: Rust Book §9 (Error Handling)
//            serde_json docs (Serialize / DeserializeOwned)

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::infra::checkpoint::{read_json, write_json};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    fingerprint: String,
    payload:     T,
}

/// Tokenised train and validation splits, in split order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedSplits {
    pub train: Vec<Vec<String>>,
    pub valid: Vec<Vec<String>>,
}

pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// The cached payload, if present and built from the same inputs.
    pub fn load<T: DeserializeOwned>(&self, name: &str, fingerprint: &str) -> Option<T> {
        let path = self.path_for(name);
        if !path.exists() {
            return None;
        }
        match read_json::<CacheEnvelope<T>>(&path) {
            Ok(env) if env.fingerprint == fingerprint => Some(env.payload),
            Ok(_) => {
                tracing::warn!(
                    "Cache '{}' was built from different inputs; rebuilding",
                    path.display()
                );
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache '{}': {:#}", path.display(), e);
                None
            }
        }
    }

    pub fn store<T: Serialize>(&self, name: &str, fingerprint: &str, payload: &T) -> Result<()> {
        let path = self.path_for(name);
        write_json(&path, &CacheEnvelope { fingerprint: fingerprint.to_string(), payload })?;
        tracing::debug!("Wrote cache '{}'", path.display());
        Ok(())
    }

    pub fn load_or_build<T, F>(&self, name: &str, fingerprint: &str, build: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(cached) = self.load(name, fingerprint) {
            tracing::info!("Loaded '{}' from cache", name);
            return Ok(cached);
        }
        tracing::info!("Building '{}' (no usable cache)", name);
        let payload = build()?;
        self.store(name, fingerprint, &payload)?;
        Ok(payload)
    }
}

/// SHA-256 over the parts, each followed by a NUL byte so that
/// ["ab", "c"] and ["a", "bc"] differ.
pub fn fingerprint<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Cache name for an encoded corpus directory.
pub fn corpus_cache_name(dir: &Path) -> String {
    let digest = fingerprint(&[dir.to_string_lossy()]);
    format!("corpus.{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn splits() -> TokenizedSplits {
        TokenizedSplits {
            train: vec![vec!["good".into(), "film".into()]],
            valid: vec![vec!["bad".into()]],
        }
    }

    #[test]
    fn test_fingerprint_separates_parts() {
        assert_ne!(fingerprint(&["ab", "c"]), fingerprint(&["a", "bc"]));
        assert_eq!(fingerprint(&["x"]), fingerprint(&["x".to_string()]));
        assert_eq!(fingerprint(&["x"]).len(), 64);
    }

    #[test]
    fn test_second_call_hits_cache() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let calls = Cell::new(0);
        let build = || {
            calls.set(calls.get() + 1);
            Ok(splits())
        };

        let first  = cache.load_or_build("tokens", "fp1", build).unwrap();
        let second = cache.load_or_build("tokens", "fp1", build).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_fingerprint_mismatch_rebuilds_and_overwrites() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        cache.store("tokens", "old", &splits()).unwrap();

        let fresh = TokenizedSplits { train: vec![], valid: vec![] };
        let got   = cache
            .load_or_build("tokens", "new", || Ok(fresh.clone()))
            .unwrap();
        assert_eq!(got, fresh);
        assert_eq!(cache.load::<TokenizedSplits>("tokens", "new"), Some(fresh));
        assert_eq!(cache.load::<TokenizedSplits>("tokens", "old"), None);
    }

    #[test]
    fn test_corrupt_cache_is_rebuilt() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        std::fs::write(cache.path_for("tokens"), "{not json").unwrap();
        let got = cache.load_or_build("tokens", "fp", || Ok(splits())).unwrap();
        assert_eq!(got, splits());
    }

    #[test]
    fn test_corpus_cache_name_depends_on_path() {
        let a = corpus_cache_name(Path::new("data/wikitext-2"));
        let b = corpus_cache_name(Path::new("data/wikitext-103"));
        assert_ne!(a, b);
        assert!(a.starts_with("corpus."));
    }
}
