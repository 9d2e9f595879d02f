// ============================================================
// Layer 2 — FinetuneUseCase
// ============================================================
// Orchestrates the full fine-tuning pipeline in order:
//
//   Step 1: Load the labelled CSV             (Layer 4 - data)
//   Step 2: Seeded 70/30 train/val split      (Layer 4 - data)
//   Step 3: Tokenise, through the cache       (Layer 4 - data, Layer 6 - cache)
//   Step 4: Load the pretraining vocabulary   (Layer 6 - infra)
//   Step 5: Index, pad/truncate, check <unk>  (Layer 4 - data)
//   Step 6: Save config                       (Layer 6 - infra)
//   Step 7: Build classifier, restore encoder (Layer 5 - ml, Layer 6 - infra)
//   Step 8: Adam + warmup-linear schedule     (Layer 5 - ml)
//   Step 9: Gradual-unfreezing training loop  (Layer 5 - ml)
//
// The encoder architecture (embedding and hidden sizes, layer
// count, weight tying) is read from the checkpoint manifest;
// dropouts and the classification head come from this config.
// The fine-tuned weights are not saved; the run's output is
// `<output_dir>/metrics.csv`.
//
// Reference: Howard & Ruder (2018) ULMFiT
//            Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::{
    grad_clipping::GradientClippingConfig,
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::application::runtime::{dispatch, BackendTask, DeviceKind};
use crate::data::{
    batcher::ClassificationBatcher,
    dataloader::{EpochLoader, LoaderOptions},
    dataset::{encode_examples, ClassificationItem, EncodingStats, SentimentDataset},
    loader::CsvExampleLoader,
    splitter::split_train_val,
    tokenizer::WordTokenizer,
};
use crate::domain::{
    example::{Example, TokenizedExample},
    traits::{ExampleSource, TextTokenizer},
};
use crate::infra::{
    checkpoint::{write_json, CheckpointManager},
    metrics::{EpochMetrics, MetricsLogger},
    token_cache::{fingerprint, ArtifactCache, TokenizedSplits},
    vocab_store::load_vocabulary,
};
use crate::ml::{
    decoder::PoolingDecoderConfig,
    encoder::AwdLstmEncoderConfig,
    freezing::{gradual_unfreezing_plan, total_epochs},
    model::SentimentClassifierConfig,
    params::count_parameters,
    scheduler::WarmupLinearSchedule,
    trainer::fine_tune,
};

// ─── Fine-Tuning Configuration ───────────────────────────────────────────────
// All knobs of a run, including seed and device. Saved to
// <output_dir>/finetune_config.json before training starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinetuneConfig {
    pub csv_path:         String,
    pub vocab_path:       String,
    /// Checkpoint stem written by `pretrain`, e.g. model/awd_lstm
    pub checkpoint:       String,
    pub cache_dir:        String,
    pub output_dir:       String,
    pub train_fraction:   f64,
    pub max_seq_len:      usize,
    pub batch_size:       usize,
    pub lowercase:        bool,
    pub max_unknown_rate: f64,
    pub num_classes:      usize,
    pub emb_dp:           f64,
    pub input_dp:         f64,
    pub hidden_dp:        f64,
    pub out_dp:           f64,
    pub weight_dp:        f64,
    pub bottleneck:       usize,
    pub head_input_dp:    f64,
    pub head_hidden_dp:   f64,
    pub lr:               f64,
    pub warmup_fraction:  f64,
    pub clip:             f64,
    pub final_epochs:     usize,
    pub seed:             u64,
    pub device:           DeviceKind,
}

impl Default for FinetuneConfig {
    fn default() -> Self {
        Self {
            csv_path:         "data/imdb.csv".to_string(),
            vocab_path:       "model/vocab.json".to_string(),
            checkpoint:       "model/awd_lstm".to_string(),
            cache_dir:        "cache".to_string(),
            output_dir:       "finetune".to_string(),
            train_fraction:   0.7,
            max_seq_len:      512,
            batch_size:       64,
            lowercase:        true,
            max_unknown_rate: 0.5,
            num_classes:      2,
            emb_dp:           0.1,
            input_dp:         0.3,
            hidden_dp:        0.3,
            out_dp:           0.4,
            weight_dp:        0.5,
            bottleneck:       50,
            head_input_dp:    0.4,
            head_hidden_dp:   0.1,
            lr:               1e-3,
            warmup_fraction:  0.1,
            clip:             1.0,
            final_epochs:     2,
            seed:             42,
            device:           DeviceKind::Cpu,
        }
    }
}

/// Per-epoch results of a fine-tuning run.
#[derive(Debug, Clone)]
pub struct FinetuneReport {
    pub train_batches: usize,
    pub valid_batches: usize,
    pub epochs:        Vec<EpochMetrics>,
}

// ─── FinetuneUseCase ──────────────────────────────────────────────────────────
pub struct FinetuneUseCase {
    config: FinetuneConfig,
}

impl FinetuneUseCase {
    pub fn new(config: FinetuneConfig) -> Self {
        Self { config }
    }

    /// Execute the full fine-tuning pipeline end to end
    pub fn execute(&self) -> Result<FinetuneReport> {
        let cfg = &self.config;
        if cfg.batch_size == 0 || cfg.max_seq_len == 0 {
            bail!("batch_size and max_seq_len must be positive");
        }
        if cfg.num_classes < 2 {
            bail!("num_classes must be at least 2");
        }

        // ── Step 1: Load labelled examples ────────────────────────────────────
        let examples = CsvExampleLoader::new(&cfg.csv_path).load_all()?;

        // ── Step 2: Seeded train / validation split ───────────────────────────
        let (train, valid) = split_train_val(examples, cfg.train_fraction, cfg.seed);
        tracing::info!("Split: {} train, {} validation", train.len(), valid.len());

        // ── Step 3: Tokenise through the cache ────────────────────────────────
        let splits = self.tokenize_cached(&train, &valid)?;

        // ── Step 4: Vocabulary from pretraining ───────────────────────────────
        let vocab = load_vocabulary(Path::new(&cfg.vocab_path))?;

        // ── Step 5: Index, pad / truncate, mismatch check ─────────────────────
        let train_tok = attach_labels(splits.train, &train);
        let valid_tok = attach_labels(splits.valid, &valid);
        let (train_items, train_stats) = encode_examples(
            &train_tok, &vocab, cfg.max_seq_len, cfg.num_classes, cfg.max_unknown_rate,
        )?;
        let (valid_items, valid_stats) = encode_examples(
            &valid_tok, &vocab, cfg.max_seq_len, cfg.num_classes, cfg.max_unknown_rate,
        )?;
        log_stats("train", &train_stats);
        log_stats("valid", &valid_stats);

        // ── Step 6: Save config next to the metrics ───────────────────────────
        write_json(&Path::new(&cfg.output_dir).join("finetune_config.json"), cfg)?;

        // ── Step 7: Model config from the checkpoint manifest ─────────────────
        let checkpoint = CheckpointManager::new(&cfg.checkpoint);
        let manifest   = checkpoint.read_manifest()?;
        let encoder    = AwdLstmEncoderConfig { vocab_size: vocab.len(), ..manifest.encoder }
            .with_emb_dp(cfg.emb_dp)
            .with_input_dp(cfg.input_dp)
            .with_hidden_dp(cfg.hidden_dp)
            .with_out_dp(cfg.out_dp)
            .with_weight_dp(cfg.weight_dp);
        let decoder = PoolingDecoderConfig::new()
            .with_num_classes(cfg.num_classes)
            .with_bottleneck(cfg.bottleneck)
            .with_input_dp(cfg.head_input_dp)
            .with_hidden_dp(cfg.head_hidden_dp);
        let model_cfg = SentimentClassifierConfig::new(encoder, decoder).with_pad_idx(vocab.pad_idx());

        dispatch(
            cfg.device,
            cfg.seed,
            FinetuneTask { cfg, model_cfg, checkpoint, train_items, valid_items },
        )
    }

    fn tokenize_cached(&self, train: &[Example], valid: &[Example]) -> Result<TokenizedSplits> {
        let cfg = &self.config;

        // Fingerprint the split contents and the tokenizer setting
        let mut parts: Vec<&str> = Vec::with_capacity(train.len() + valid.len() + 2);
        parts.push(if cfg.lowercase { "lower" } else { "cased" });
        parts.extend(train.iter().map(|e| e.text.as_str()));
        parts.push("\u{1}valid");
        parts.extend(valid.iter().map(|e| e.text.as_str()));
        let key = fingerprint(&parts);

        let cache = ArtifactCache::new(&cfg.cache_dir);
        cache.load_or_build("tokens", &key, || {
            let tokenizer = WordTokenizer::new(cfg.lowercase);
            Ok(TokenizedSplits {
                train: tokenizer.tokenize_all(&texts(train))?,
                valid: tokenizer.tokenize_all(&texts(valid))?,
            })
        })
    }
}

fn texts(split: &[Example]) -> Vec<&str> {
    split.iter().map(|e| e.text.as_str()).collect()
}

fn attach_labels(tokens: Vec<Vec<String>>, examples: &[Example]) -> Vec<TokenizedExample> {
    tokens
        .into_iter()
        .zip(examples)
        .map(|(t, e)| TokenizedExample::new(t, e.label))
        .collect()
}

fn log_stats(split: &str, stats: &EncodingStats) {
    tracing::info!(
        "{}: {} tokens, {:.2}% unknown, {} sequences truncated",
        split,
        stats.tokens,
        stats.unknown_rate() * 100.0,
        stats.truncated,
    );
}

struct FinetuneTask<'a> {
    cfg:         &'a FinetuneConfig,
    model_cfg:   SentimentClassifierConfig,
    checkpoint:  CheckpointManager,
    train_items: Vec<ClassificationItem>,
    valid_items: Vec<ClassificationItem>,
}

impl BackendTask for FinetuneTask<'_> {
    type Output = FinetuneReport;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<FinetuneReport> {
        let cfg = self.cfg;

        // ── Step 7: Classifier with the pretrained encoder ────────────────────
        let model = self.model_cfg.init::<B>(&device);
        let specs = self.model_cfg.param_specs();
        let (model, report) = self.checkpoint.restore_encoder(model, &specs, &device)?;
        report.log();
        tracing::info!(
            "Classifier ready: {} layer groups, {} parameters",
            model.num_groups(),
            count_parameters(&specs)
        );

        // ── Loaders: train shuffled per epoch, validation in order ────────────
        let mut train_loader = EpochLoader::new(
            SentimentDataset::new(self.train_items),
            ClassificationBatcher::<B>::new(device.clone()),
            LoaderOptions { batch_size: cfg.batch_size, shuffle: true, drop_last: true, seed: cfg.seed },
        );
        let mut valid_loader = EpochLoader::new(
            SentimentDataset::new(self.valid_items),
            ClassificationBatcher::<B::InnerBackend>::new(device.clone()),
            LoaderOptions { batch_size: cfg.batch_size, shuffle: false, drop_last: true, seed: cfg.seed },
        );
        let train_batches = train_loader.num_batches();
        let valid_batches = valid_loader.num_batches();
        tracing::info!("Batches per epoch: {} train, {} validation", train_batches, valid_batches);
        if train_batches == 0 {
            bail!(
                "Fewer training examples ({}) than one batch ({})",
                train_loader.num_items(),
                cfg.batch_size
            );
        }

        // ── Step 8: Adam with clipping, warmup-linear schedule ────────────────
        let plan         = gradual_unfreezing_plan(model.num_groups(), cfg.final_epochs);
        let t_total      = train_batches * total_epochs(&plan);
        let mut schedule = WarmupLinearSchedule::with_warmup_fraction(cfg.lr, cfg.warmup_fraction, t_total);
        tracing::info!(
            "Schedule: {} total steps, {} warmup steps, peak lr {:e}",
            schedule.total_steps(),
            schedule.warmup_steps(),
            cfg.lr
        );
        let mut optim = AdamConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.clip as f32)))
            .init();

        // ── Step 9: Gradual unfreezing ────────────────────────────────────────
        let mut metrics = MetricsLogger::create(Path::new(&cfg.output_dir))?;
        let (_model, epochs) = fine_tune(
            model,
            &mut optim,
            &mut schedule,
            &plan,
            &mut train_loader,
            &mut valid_loader,
            &mut metrics,
        )?;
        tracing::info!("Metrics written to '{}'", metrics.csv_path().display());

        Ok(FinetuneReport { train_batches, valid_batches, epochs })
    }
}
