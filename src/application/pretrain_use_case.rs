// ============================================================
// Layer 2 — PretrainUseCase
// ============================================================
// Orchestrates language-model pretraining, the stage that
// produces the vocabulary and the encoder weights fine-tuning
// starts from:
//
//   Step 1: Load or build the encoded corpus   (Layer 4 - data, Layer 6 - cache)
//   Step 2: Save the vocabulary                (Layer 6 - infra)
//   Step 3: Save the run config                (Layer 6 - infra)
//   Step 4: Batchify into BPTT streams         (Layer 4 - data)
//   Step 5: Build the AWD-LSTM language model  (Layer 5 - ml)
//   Step 6: Train with SGD, keep the best      (Layer 5 - ml)
//   Step 7: Evaluate the best model on test    (Layer 5 - ml)
//   Step 8: Write loss history and summary     (Layer 6 - infra)
//
// Raising the stop flag ends Step 6 early; Steps 7 and 8 still
// run. With no checkpoint yet, the test pass uses the current
// weights.
//
// Outputs, all under `output_dir`:
//   <output>.mpk + <output>.json      best checkpoint
//   <output>.csv                      per-epoch losses
//   <output>.txt                      best / test summary
//   vocab.json, pretrain_config.json
//
// Reference: Merity et al. (2017) AWD-LSTM training recipe

use anyhow::{bail, Result};
use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::SgdConfig,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
};

use crate::application::runtime::{dispatch, BackendTask, DeviceKind};
use crate::data::corpus::{BpttStream, Corpus};
use crate::infra::{
    checkpoint::{write_json, CheckpointManager},
    metrics::{LossHistoryLogger, PretrainSummary},
    token_cache::{corpus_cache_name, fingerprint, ArtifactCache},
    vocab_store::save_vocabulary,
};
use crate::ml::{
    encoder::AwdLstmEncoderConfig,
    lm_trainer::{evaluate_lm, pretrain, LmTrainOptions},
    model::LanguageModelConfig,
    params::count_parameters,
};

// ─── Pretraining Configuration ───────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainConfig {
    pub corpus_dir:    String,
    pub train_file:    String,
    pub valid_file:    String,
    pub test_file:     String,
    pub output_dir:    String,
    pub output:        String,
    pub batch_size:    usize,
    pub eval_batch_size: usize,
    pub bptt:          usize,
    pub variable_bptt: bool,
    pub emb_dim:       usize,
    pub hidden_dim:    usize,
    pub num_layers:    usize,
    pub emb_dp:        f64,
    pub input_dp:      f64,
    pub hidden_dp:     f64,
    pub out_dp:        f64,
    pub weight_dp:     f64,
    pub initrange:     f64,
    pub tie_weights:   bool,
    pub lr:            f64,
    pub anneal_factor: f64,
    pub epochs:        usize,
    pub clip:          f64,
    pub alpha:         f64,
    pub beta:          f64,
    pub seed:          u64,
    pub device:        DeviceKind,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            corpus_dir:    "data/wikitext-2".to_string(),
            train_file:    "wiki.train.tokens".to_string(),
            valid_file:    "wiki.valid.tokens".to_string(),
            test_file:     "wiki.test.tokens".to_string(),
            output_dir:    "model".to_string(),
            output:        "awd_lstm".to_string(),
            batch_size:    80,
            eval_batch_size: 10,
            bptt:          80,
            variable_bptt: false,
            emb_dim:       400,
            hidden_dim:    1150,
            num_layers:    3,
            emb_dp:        0.1,
            input_dp:      0.3,
            hidden_dp:     0.3,
            out_dp:        0.4,
            weight_dp:     0.5,
            initrange:     0.05,
            tie_weights:   false,
            lr:            30.0,
            anneal_factor: 4.0,
            epochs:        2,
            clip:          0.25,
            alpha:         2.0,
            beta:          1.0,
            seed:          42,
            device:        DeviceKind::Cpu,
        }
    }
}

impl PretrainConfig {
    pub fn checkpoint_stem(&self) -> PathBuf {
        Path::new(&self.output_dir).join(&self.output)
    }

    pub fn vocab_path(&self) -> PathBuf {
        Path::new(&self.output_dir).join("vocab.json")
    }

    fn train_options(&self) -> LmTrainOptions {
        LmTrainOptions {
            lr:            self.lr,
            bptt:          self.bptt,
            variable_bptt: self.variable_bptt,
            alpha:         self.alpha,
            beta:          self.beta,
            anneal_factor: self.anneal_factor,
            epochs:        self.epochs,
        }
    }
}

// ─── PretrainUseCase ──────────────────────────────────────────────────────────
pub struct PretrainUseCase {
    config: PretrainConfig,
    stop:   Arc<AtomicBool>,
}

impl PretrainUseCase {
    pub fn new(config: PretrainConfig) -> Self {
        Self { config, stop: Arc::new(AtomicBool::new(false)) }
    }

    /// Share a flag that, once set, stops training at the next window.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn execute(&self) -> Result<PretrainSummary> {
        let cfg        = &self.config;
        let corpus_dir = Path::new(&cfg.corpus_dir);
        let output_dir = Path::new(&cfg.output_dir);

        // ── Step 1: Encoded corpus, cached next to the token files ───────────
        let cache  = ArtifactCache::new(corpus_dir);
        let key    = fingerprint(&[&cfg.train_file, &cfg.valid_file, &cfg.test_file]);
        let corpus = cache.load_or_build(&corpus_cache_name(corpus_dir), &key, || {
            Corpus::build(corpus_dir, &cfg.train_file, &cfg.valid_file, &cfg.test_file)
        })?;

        // ── Step 2: Vocabulary for fine-tuning ────────────────────────────────
        let vocab = corpus.vocabulary()?;
        save_vocabulary(&cfg.vocab_path(), &vocab)?;

        // ── Step 3: Config next to the outputs ────────────────────────────────
        write_json(&output_dir.join("pretrain_config.json"), cfg)?;

        // ── Step 4: BPTT streams ──────────────────────────────────────────────
        let train = BpttStream::new(&corpus.train, cfg.batch_size, cfg.bptt, cfg.variable_bptt);
        let valid = BpttStream::new(&corpus.valid, cfg.eval_batch_size, cfg.bptt, false);
        let test  = BpttStream::new(&corpus.test,  cfg.eval_batch_size, cfg.bptt, false);
        tracing::info!(
            "BPTT streams: train {}x{}, valid {}x{}, test {}x{}",
            train.batch_size(), train.row_len(),
            valid.batch_size(), valid.row_len(),
            test.batch_size(),  test.row_len(),
        );
        if train.num_windows() == 0 || valid.num_windows() == 0 || test.num_windows() == 0 {
            bail!("Corpus too small for the configured batch sizes");
        }

        if cfg.num_layers == 0 {
            bail!("num_layers must be at least 1");
        }
        let model_cfg = LanguageModelConfig::new(
            AwdLstmEncoderConfig::new(vocab.len())
                .with_emb_dim(cfg.emb_dim)
                .with_hidden_dim(cfg.hidden_dim)
                .with_num_layers(cfg.num_layers)
                .with_emb_dp(cfg.emb_dp)
                .with_input_dp(cfg.input_dp)
                .with_hidden_dp(cfg.hidden_dp)
                .with_out_dp(cfg.out_dp)
                .with_weight_dp(cfg.weight_dp)
                .with_initrange(cfg.initrange)
                .with_tie_weights(cfg.tie_weights),
        );
        let summary = dispatch(
            cfg.device,
            cfg.seed,
            PretrainTask { cfg, model_cfg, train, valid, test, stop: &self.stop },
        )?;

        // ── Step 8: Summary ───────────────────────────────────────────────────
        summary.write(&output_dir.join(format!("{}.txt", cfg.output)))?;
        println!("{}", summary.render());
        Ok(summary)
    }
}

struct PretrainTask<'a> {
    cfg:       &'a PretrainConfig,
    model_cfg: LanguageModelConfig,
    train:     BpttStream,
    valid:     BpttStream,
    test:      BpttStream,
    stop:      &'a AtomicBool,
}

impl BackendTask for PretrainTask<'_> {
    type Output = PretrainSummary;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<PretrainSummary> {
        let cfg = self.cfg;

        // ── Step 5: Language model ────────────────────────────────────────────
        let model = self.model_cfg.init::<B>(&device);
        tracing::info!(
            "The model has {} trainable parameters",
            count_parameters(&self.model_cfg.param_specs())
        );

        // ── Step 6: SGD training, best checkpoint kept ────────────────────────
        let mut optim = SgdConfig::new()
            .with_gradient_clipping(Some(GradientClippingConfig::Norm(cfg.clip as f32)))
            .init();
        let mut rng     = StdRng::seed_from_u64(cfg.seed);
        let checkpoint  = CheckpointManager::new(cfg.checkpoint_stem());
        let mut history = LossHistoryLogger::create(
            &Path::new(&cfg.output_dir).join(format!("{}.csv", cfg.output)),
        )?;

        let (model, outcome) = pretrain(
            model,
            &self.model_cfg,
            &mut optim,
            &self.train,
            &self.valid,
            &cfg.train_options(),
            &mut rng,
            &checkpoint,
            &mut history,
            self.stop,
            &device,
        )?;

        // ── Step 7: Test evaluation with the best weights ─────────────────────
        let best = if outcome.best_epoch > 0 {
            checkpoint.load_language_model::<B::InnerBackend>(&device)?
        } else {
            tracing::warn!("No checkpoint was written; evaluating the current weights");
            model.valid()
        };
        let test_loss = evaluate_lm(&best, &self.test, &device);
        tracing::info!("Test loss {:.4}", test_loss);

        Ok(PretrainSummary {
            best_epoch:    outcome.best_epoch,
            best_val_loss: outcome.best_val_loss,
            test_loss,
            epochs_run:    outcome.epochs_run,
        })
    }
}
