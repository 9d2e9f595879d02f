// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves the pretrained language model and restores its encoder
// into a freshly built classifier.
//
// What gets saved per checkpoint (one file stem, e.g. model/lm):
//   1. model/lm.mpk      CompactRecorder record of the whole
//                        language model (encoder + LM decoder)
//   2. model/lm.json     manifest: the encoder config plus the
//                        name and shape of every parameter
//
// Restoring is non-strict. The classifier and the language model
// share the encoder but not the decoder, so the manifest is
// compared with the classifier's own parameter list first:
//
//   checkpoint params ──┐
//                       ├─► compare_specs ─► LoadReport
//   classifier params ──┘        │
//                                ▼
//   copy every submodule whose parameters all match
//   (embedding, each LSTM layer); leave the rest as initialised
//
// Parameters only the classifier has (its decoder) keep their
// fresh values; parameters only the checkpoint has (the LM
// decoder) are ignored. The report is logged, never fatal.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use crate::ml::{
    encoder::AwdLstmEncoderConfig,
    model::{LanguageModel, LanguageModelConfig, LanguageModelRecord, SentimentClassifier},
    params::ParamSpec,
};

/// Written next to the record so a reader can check compatibility
/// without deserialising any tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub encoder: AwdLstmEncoderConfig,
    pub params:  Vec<ParamSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub name:       String,
    pub checkpoint: Vec<usize>,
    pub model:      Vec<usize>,
}

/// Outcome of a non-strict load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Submodules copied from the checkpoint, e.g. `encoder.rnns.0`
    pub loaded:     Vec<String>,
    /// Model parameters the checkpoint does not have
    pub missing:    Vec<String>,
    /// Checkpoint parameters the model does not have
    pub unexpected: Vec<String>,
    pub mismatched: Vec<ShapeMismatch>,
}

impl LoadReport {
    pub fn is_loaded(&self, submodule: &str) -> bool {
        self.loaded.iter().any(|s| s == submodule)
    }

    pub fn log(&self) {
        tracing::info!(
            "Restored {} submodule(s) from checkpoint: {}",
            self.loaded.len(),
            self.loaded.join(", "),
        );
        if !self.missing.is_empty() {
            tracing::info!("Freshly initialised (not in checkpoint): {}", self.missing.join(", "));
        }
        if !self.unexpected.is_empty() {
            tracing::debug!("Ignored checkpoint parameters: {}", self.unexpected.join(", "));
        }
        for m in &self.mismatched {
            tracing::warn!(
                "Shape mismatch for '{}': checkpoint {:?} vs model {:?}; keeping initial values",
                m.name, m.checkpoint, m.model,
            );
        }
    }
}

/// Match parameters by name and shape.
///
/// A submodule counts as loaded only when every one of its model
/// parameters is present in the checkpoint with the same shape and
/// the checkpoint holds nothing else under that submodule.
pub fn compare_specs(checkpoint: &[ParamSpec], model: &[ParamSpec]) -> LoadReport {
    let ckpt: BTreeMap<&str, &ParamSpec> =
        checkpoint.iter().map(|p| (p.name.as_str(), p)).collect();
    let model_names: BTreeSet<&str> = model.iter().map(|p| p.name.as_str()).collect();

    let mut report = LoadReport::default();
    let mut broken: BTreeSet<&str> = BTreeSet::new();

    for spec in model {
        match ckpt.get(spec.name.as_str()) {
            None => {
                report.missing.push(spec.name.clone());
                broken.insert(spec.submodule());
            }
            Some(found) if found.shape != spec.shape => {
                report.mismatched.push(ShapeMismatch {
                    name:       spec.name.clone(),
                    checkpoint: found.shape.clone(),
                    model:      spec.shape.clone(),
                });
                broken.insert(spec.submodule());
            }
            Some(_) => {}
        }
    }

    for spec in checkpoint {
        if !model_names.contains(spec.name.as_str()) {
            report.unexpected.push(spec.name.clone());
            broken.insert(spec.submodule());
        }
    }

    let mut seen = BTreeSet::new();
    for spec in model {
        let sub = spec.submodule();
        if !broken.contains(sub) && seen.insert(sub) {
            report.loaded.push(sub.to_string());
        }
    }
    report
}

/// Extension `CompactRecorder` gives its files.
pub const RECORD_EXTENSION: &str = "mpk";

/// Saves and restores checkpoints under one file stem.
pub struct CheckpointManager {
    stem: PathBuf,
}

impl CheckpointManager {
    pub fn new(stem: impl Into<PathBuf>) -> Self {
        Self { stem: stem.into() }
    }

    pub fn record_path(&self) -> PathBuf {
        self.stem.with_extension(RECORD_EXTENSION)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.stem.with_extension("json")
    }

    pub fn save_language_model<B: Backend>(
        &self,
        model:  &LanguageModel<B>,
        config: &LanguageModelConfig,
    ) -> Result<()> {
        if let Some(parent) = self.stem.parent() {
            fs::create_dir_all(parent)?;
        }

        // Path without extension, the recorder adds it
        CompactRecorder::new()
            .record(model.clone().into_record(), self.stem.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", self.stem.display()))?;

        let manifest = CheckpointManifest {
            encoder: config.encoder.clone(),
            params:  config.param_specs(),
        };
        write_json(&self.manifest_path(), &manifest)?;

        tracing::debug!("Saved checkpoint '{}'", self.record_path().display());
        Ok(())
    }

    pub fn read_manifest(&self) -> Result<CheckpointManifest> {
        read_json(&self.manifest_path()).with_context(|| {
            format!(
                "Cannot read checkpoint manifest for '{}'. Have you run 'pretrain' first?",
                self.stem.display()
            )
        })
    }

    /// Load the whole language model back, strictly.
    pub fn load_language_model<B: Backend>(&self, device: &B::Device) -> Result<LanguageModel<B>> {
        let manifest = self.read_manifest()?;
        let config   = LanguageModelConfig::new(manifest.encoder);
        let record   = self.load_record::<B>(device)?;
        Ok(config.init::<B>(device).load_record(record))
    }

    /// Copy the pretrained encoder into `model` wherever names and
    /// shapes agree. `expected` is the classifier's parameter list.
    pub fn restore_encoder<B: Backend>(
        &self,
        model:    SentimentClassifier<B>,
        expected: &[ParamSpec],
        device:   &B::Device,
    ) -> Result<(SentimentClassifier<B>, LoadReport)> {
        let manifest = self.read_manifest()?;
        let report   = compare_specs(&manifest.params, expected);
        let record   = self.load_record::<B>(device)?;

        let SentimentClassifier { mut encoder, decoder, pad_idx } = model;
        let ckpt = record.encoder;

        if report.is_loaded("encoder.embedding") {
            encoder.embedding = encoder.embedding.load_record(ckpt.embedding);
        }

        let mut ckpt_rnns = ckpt.rnns.into_iter();
        encoder.rnns = encoder
            .rnns
            .into_iter()
            .enumerate()
            .map(|(i, rnn)| match ckpt_rnns.next() {
                Some(r) if report.is_loaded(&format!("encoder.rnns.{i}")) => rnn.load_record(r),
                _ => rnn,
            })
            .collect();

        Ok((SentimentClassifier { encoder, decoder, pad_idx }, report))
    }

    fn load_record<B: Backend>(&self, device: &B::Device) -> Result<LanguageModelRecord<B>> {
        CompactRecorder::new()
            .load(self.stem.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you run 'pretrain' first?",
                    self.record_path().display()
                )
            })
    }
}

/// Pretty-printed JSON, parent directories created as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Malformed JSON in '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{decoder::PoolingDecoderConfig, model::SentimentClassifierConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn encoder(hidden_dim: usize) -> AwdLstmEncoderConfig {
        AwdLstmEncoderConfig::new(12)
            .with_emb_dim(4)
            .with_hidden_dim(hidden_dim)
            .with_num_layers(2)
    }

    fn classifier(hidden_dim: usize) -> SentimentClassifierConfig {
        SentimentClassifierConfig::new(encoder(hidden_dim), PoolingDecoderConfig::new().with_bottleneck(3))
    }

    fn flat<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_compare_specs_reports_every_category() {
        let checkpoint = vec![
            ParamSpec::new("encoder.embedding.weight", &[10, 4]),
            ParamSpec::new("encoder.rnns.0.weight_ih", &[24, 4]),
            ParamSpec::new("decoder.bias", &[10]),
        ];
        let model = vec![
            ParamSpec::new("encoder.embedding.weight", &[10, 4]),
            ParamSpec::new("encoder.rnns.0.weight_ih", &[32, 4]),
            ParamSpec::new("decoder.output.weight", &[3, 2]),
        ];
        let report = compare_specs(&checkpoint, &model);
        assert_eq!(report.loaded, vec!["encoder.embedding".to_string()]);
        assert_eq!(report.missing, vec!["decoder.output.weight".to_string()]);
        assert_eq!(report.unexpected, vec!["decoder.bias".to_string()]);
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].model, vec![32, 4]);
    }

    #[test]
    fn test_restore_encoder_keeps_fresh_decoder() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let ckpt   = CheckpointManager::new(dir.path().join("lm"));

        let lm_cfg = LanguageModelConfig::new(encoder(6));
        let lm     = lm_cfg.init::<TestBackend>(&device);
        ckpt.save_language_model(&lm, &lm_cfg).unwrap();
        assert!(ckpt.record_path().exists());

        let cfg   = classifier(6);
        let model = cfg.init::<TestBackend>(&device);
        let decoder_before = flat(model.decoder.output.weight.val());

        let (model, report) = ckpt.restore_encoder(model, &cfg.param_specs(), &device).unwrap();

        assert_eq!(
            report.loaded,
            vec!["encoder.embedding", "encoder.rnns.0", "encoder.rnns.1"]
        );
        assert!(report.missing.iter().all(|n| n.starts_with("decoder.")));
        assert!(report.unexpected.iter().all(|n| n.starts_with("decoder.")));
        assert!(report.mismatched.is_empty());

        assert_eq!(flat(model.decoder.output.weight.val()), decoder_before);

        // CompactRecorder stores half precision
        let restored = flat(model.encoder.embedding.weight.val());
        let original = flat(lm.encoder.embedding.weight.val());
        for (a, b) in restored.iter().zip(&original) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_record_path_is_the_file_the_recorder_writes() {
        use burn::record::FileRecorder;

        assert_eq!(
            <CompactRecorder as FileRecorder<TestBackend>>::file_extension(),
            RECORD_EXTENSION
        );

        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let ckpt   = CheckpointManager::new(dir.path().join("lm"));
        let lm_cfg = LanguageModelConfig::new(encoder(6));
        ckpt.save_language_model(&lm_cfg.init::<TestBackend>(&device), &lm_cfg).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["lm.json".to_string(), "lm.mpk".to_string()]);
        assert!(ckpt.record_path().exists());
    }

    #[test]
    fn test_restore_skips_mismatched_layers() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let ckpt   = CheckpointManager::new(dir.path().join("lm"));

        let lm_cfg = LanguageModelConfig::new(encoder(6));
        ckpt.save_language_model(&lm_cfg.init::<TestBackend>(&device), &lm_cfg).unwrap();

        let cfg   = classifier(8);
        let model = cfg.init::<TestBackend>(&device);
        let probe = Tensor::<TestBackend, 3>::ones([1, 3, 8], &device);
        let rnn_before = flat(model.encoder.rnns[1].forward(probe.clone(), None).0);

        let (model, report) = ckpt.restore_encoder(model, &cfg.param_specs(), &device).unwrap();
        assert_eq!(report.loaded, vec!["encoder.embedding"]);
        assert!(!report.mismatched.is_empty());
        assert_eq!(flat(model.encoder.rnns[1].forward(probe, None).0), rnn_before);
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let ckpt   = CheckpointManager::new(dir.path().join("absent"));
        let cfg    = classifier(6);
        let model  = cfg.init::<TestBackend>(&device);
        assert!(ckpt.restore_encoder(model, &cfg.param_specs(), &device).is_err());
    }

    #[test]
    fn test_json_helpers_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cfg.json");
        write_json(&path, &vec![1u32, 2, 3]).unwrap();
        let back: Vec<u32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
