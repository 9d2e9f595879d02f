// ============================================================
// Layer 5 — Language-Model Pretraining Loop
// ============================================================
// Trains the AWD-LSTM language model whose encoder the classifier
// later starts from.
//
// Per BPTT window:
//   logits, raw, dropped = model(inputs, carried state)
//   loss = CE(logits, targets)
//        + alpha * mean(dropped_last²)                    AR
//        + beta  * mean((raw_last[t+1] - raw_last[t])²)   TAR
//   grads = loss.backward()
//   model = sgd.step(lr * len / bptt, model, grads)   (variable BPTT)
//   state = detach(new state)
//
// The hidden state is carried across windows and reset at the
// start of every epoch and every evaluation pass.
//
// Per epoch:
//   val_loss improved → save checkpoint, remember the epoch
//   otherwise         → lr /= anneal_factor (fixed BPTT only)
//
// A raised stop flag (Ctrl-C) ends the run between windows. The
// interrupted epoch is neither validated nor logged, and the
// caller still gets the model back for test evaluation.
//
// Reference: Merity et al. (2017) "Regularizing and Optimizing
//            LSTM Language Models" §4 (variable BPTT), §4.6 (AR/TAR)

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::rngs::StdRng;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use crate::data::corpus::BpttStream;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{perplexity, progress_bar, LmEpochMetrics, LossHistoryLogger},
};
use crate::ml::{
    encoder::detach_states,
    model::{LanguageModel, LanguageModelConfig},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmTrainOptions {
    pub lr:            f64,
    pub bptt:          usize,
    pub variable_bptt: bool,
    /// AR weight, 0 disables it
    pub alpha:         f64,
    /// TAR weight, 0 disables it
    pub beta:          f64,
    pub anneal_factor: f64,
    pub epochs:        usize,
}

/// Outcome of a full pretraining run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PretrainOutcome {
    pub best_epoch:    usize,
    pub best_val_loss: f64,
    pub epochs_run:    usize,
}

/// alpha * mean(x²)
pub fn activation_regularization<B: Backend>(dropped: Tensor<B, 3>, alpha: f64) -> Tensor<B, 1> {
    dropped.powf_scalar(2.0).mean().mul_scalar(alpha)
}

/// beta * mean((x[:, t+1] - x[:, t])²); zero for single-step windows.
pub fn temporal_activation_regularization<B: Backend>(raw: Tensor<B, 3>, beta: f64) -> Tensor<B, 1> {
    let [batch, seq_len, dim] = raw.dims();
    if seq_len < 2 {
        return Tensor::zeros([1], &raw.device());
    }
    let next = raw.clone().slice([0..batch, 1..seq_len, 0..dim]);
    let prev = raw.slice([0..batch, 0..seq_len - 1, 0..dim]);
    (next - prev).powf_scalar(2.0).mean().mul_scalar(beta)
}

/// One pass over the training stream. Returns the mean
/// cross-entropy, without the AR/TAR terms, over the windows
/// trained before `stop` was raised.
#[allow(clippy::too_many_arguments)]
pub fn train_epoch<B, O>(
    mut model: LanguageModel<B>,
    optim:     &mut O,
    stream:    &BpttStream,
    opts:      &LmTrainOptions,
    lr:        f64,
    rng:       &mut StdRng,
    stop:      &AtomicBool,
    device:    &B::Device,
) -> Result<(LanguageModel<B>, f64)>
where
    B: AutodiffBackend,
    O: Optimizer<LanguageModel<B>, B>,
{
    let windows = if opts.variable_bptt { stream.windows(rng) } else { stream.fixed_windows() };
    let pb      = progress_bar(windows.len(), "pretrain");

    let mut states   = None;
    let mut loss_sum = 0.0f64;
    let mut trained  = 0usize;

    for &(start, len) in &windows {
        if stop.load(Ordering::SeqCst) {
            pb.abandon_with_message("interrupted");
            break;
        }
        let batch = stream.batch::<B>(start, len, device);

        // ── Step 1: forward + regularisers ──
        let (raw_loss, out) = model.forward_loss(batch.inputs, batch.targets, states.take());
        let raw_val: f64    = raw_loss.clone().into_scalar().elem::<f64>();
        if !raw_val.is_finite() {
            pb.abandon();
            bail!("Language-model loss became {} at window starting {}", raw_val, start);
        }

        let mut loss = raw_loss;
        if opts.alpha > 0.0 {
            loss = loss + activation_regularization(out.dropped, opts.alpha);
        }
        if opts.beta > 0.0 {
            loss = loss + temporal_activation_regularization(out.raw_last, opts.beta);
        }

        // ── Step 2: SGD update, lr scaled to the window length ──
        let step_lr = if opts.variable_bptt { lr * len as f64 / opts.bptt as f64 } else { lr };
        let grads   = GradientsParams::from_grads(loss.backward(), &model);
        model       = optim.step(step_lr, model, grads);

        // ── Step 3: carry the state, cut the graph ──
        states = Some(detach_states(out.states));

        loss_sum += raw_val;
        trained  += 1;
        pb.inc(1);
        pb.set_message(format!("loss={:.4}", raw_val));
    }
    if !pb.is_finished() {
        pb.finish_and_clear();
    }

    let mean = if trained == 0 { f64::NAN } else { loss_sum / trained as f64 };
    Ok((model, mean))
}

/// Mean cross-entropy over fixed-length windows, state carried.
pub fn evaluate_lm<B: Backend>(model: &LanguageModel<B>, stream: &BpttStream, device: &B::Device) -> f64 {
    let windows    = stream.fixed_windows();
    let mut states = None;
    let mut total  = 0.0f64;

    for &(start, len) in &windows {
        let batch = stream.batch::<B>(start, len, device);
        let (loss, out) = model.forward_loss(batch.inputs, batch.targets, states.take());
        total += loss.into_scalar().elem::<f64>();
        states = Some(out.states);
    }
    if windows.is_empty() { f64::NAN } else { total / windows.len() as f64 }
}

/// Train for `opts.epochs`, saving the best model to `checkpoint`.
/// Returns the last model with the outcome; `epochs_run` counts
/// completed epochs only.
#[allow(clippy::too_many_arguments)]
pub fn pretrain<B, O>(
    mut model:  LanguageModel<B>,
    config:     &LanguageModelConfig,
    optim:      &mut O,
    train:      &BpttStream,
    valid:      &BpttStream,
    opts:       &LmTrainOptions,
    rng:        &mut StdRng,
    checkpoint: &CheckpointManager,
    history:    &mut LossHistoryLogger,
    stop:       &AtomicBool,
    device:     &B::Device,
) -> Result<(LanguageModel<B>, PretrainOutcome)>
where
    B: AutodiffBackend,
    O: Optimizer<LanguageModel<B>, B>,
{
    let mut lr      = opts.lr;
    let mut outcome = PretrainOutcome { best_epoch: 0, best_val_loss: f64::INFINITY, epochs_run: 0 };

    for epoch in 1..=opts.epochs {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let started = Instant::now();

        let (next, train_loss) = train_epoch(model, optim, train, opts, lr, rng, stop, device)?;
        model = next;
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let val_loss = evaluate_lm(&model.valid(), valid, device);
        outcome.epochs_run = epoch;

        if val_loss < outcome.best_val_loss {
            outcome.best_val_loss = val_loss;
            outcome.best_epoch    = epoch;
            checkpoint.save_language_model(&model, config)?;
            tracing::info!("Best loss so far ({:.4}); checkpoint saved", val_loss);
        } else if !opts.variable_bptt {
            lr /= opts.anneal_factor;
            tracing::info!("No improvement; learning rate annealed to {:.4}", lr);
        }

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | train_ppl={:.2} | val_loss={:.4} | val_ppl={:.2} | lr={:.4}",
            epoch, opts.epochs,
            train_loss, perplexity(train_loss),
            val_loss, perplexity(val_loss),
            lr,
        );

        history.log(&LmEpochMetrics {
            epoch,
            lr,
            train_loss,
            val_loss,
            val_ppl: perplexity(val_loss),
            seconds: started.elapsed().as_secs_f64(),
        })?;
    }

    if stop.load(Ordering::SeqCst) {
        println!("Exiting training early");
        tracing::warn!("Training interrupted after {} completed epoch(s)", outcome.epochs_run);
    }
    Ok((model, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::encoder::AwdLstmEncoderConfig;
    use burn::{
        backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
        grad_clipping::GradientClippingConfig,
        optim::SgdConfig,
    };
    use rand::SeedableRng;

    type TestBackend = Autodiff<NdArray>;

    fn config() -> LanguageModelConfig {
        LanguageModelConfig::new(
            AwdLstmEncoderConfig::new(10)
                .with_emb_dim(4)
                .with_hidden_dim(6)
                .with_num_layers(2)
                .with_tie_weights(true),
        )
    }

    fn opts(epochs: usize) -> LmTrainOptions {
        LmTrainOptions {
            lr: 1.0,
            bptt: 5,
            variable_bptt: false,
            alpha: 2.0,
            beta: 1.0,
            anneal_factor: 4.0,
            epochs,
        }
    }

    fn stream(bs: usize) -> BpttStream {
        let ids: Vec<u32> = (0..120).map(|i| 3 + (i % 7) as u32).collect();
        BpttStream::new(&ids, bs, 5, false)
    }

    #[test]
    fn test_tar_is_zero_for_constant_sequences() {
        let device = NdArrayDevice::Cpu;
        let raw    = Tensor::<NdArray, 3>::ones([2, 4, 3], &device);
        let tar    = temporal_activation_regularization(raw, 1.0).into_scalar();
        assert_eq!(tar, 0.0);
    }

    #[test]
    fn test_ar_is_scaled_mean_square() {
        let device = NdArrayDevice::Cpu;
        let x      = Tensor::<NdArray, 3>::ones([1, 2, 2], &device).mul_scalar(3.0);
        let ar: f32 = activation_regularization(x, 2.0).into_scalar();
        assert!((ar - 18.0).abs() < 1e-5);
    }

    #[test]
    fn test_train_epoch_returns_finite_loss() {
        let device    = NdArrayDevice::Cpu;
        let model     = config().init::<TestBackend>(&device);
        let mut optim = SgdConfig::new()
            .with_gradient_clipping(Some(GradientClippingConfig::Norm(0.25)))
            .init();
        let mut rng   = StdRng::seed_from_u64(1);
        let stop      = AtomicBool::new(false);
        let (_, loss) =
            train_epoch(model, &mut optim, &stream(4), &opts(1), 1.0, &mut rng, &stop, &device)
                .unwrap();
        assert!(loss.is_finite());
        // uniform guess over 10 words is ln(10)
        assert!(loss < 10.0);
    }

    #[test]
    fn test_pretrain_saves_best_checkpoint_and_history() {
        let dir       = tempfile::tempdir().unwrap();
        let device    = NdArrayDevice::Cpu;
        let cfg       = config();
        let model     = cfg.init::<TestBackend>(&device);
        let mut optim = SgdConfig::new().init();
        let mut rng   = StdRng::seed_from_u64(1);
        let ckpt      = CheckpointManager::new(dir.path().join("lm"));
        let mut hist  = LossHistoryLogger::create(&dir.path().join("lm.csv")).unwrap();

        let stop      = AtomicBool::new(false);

        let (_, outcome) = pretrain(
            model, &cfg, &mut optim, &stream(4), &stream(2), &opts(2), &mut rng, &ckpt, &mut hist,
            &stop, &device,
        )
        .unwrap();

        assert_eq!(outcome.epochs_run, 2);
        assert!(outcome.best_epoch >= 1);
        assert!(outcome.best_val_loss.is_finite());
        assert!(ckpt.record_path().exists());
        assert!(ckpt.manifest_path().exists());

        let reloaded = ckpt.load_language_model::<NdArray>(&device).unwrap();
        assert!(evaluate_lm(&reloaded, &stream(2), &device).is_finite());

        let csv = std::fs::read_to_string(dir.path().join("lm.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_raised_stop_flag_skips_every_window() {
        let device    = NdArrayDevice::Cpu;
        let model     = config().init::<TestBackend>(&device);
        let mut optim = SgdConfig::new().init();
        let mut rng   = StdRng::seed_from_u64(1);
        let stop      = AtomicBool::new(true);
        let (_, loss) =
            train_epoch(model, &mut optim, &stream(4), &opts(1), 1.0, &mut rng, &stop, &device)
                .unwrap();
        assert!(loss.is_nan());
    }

    #[test]
    fn test_interrupted_pretrain_returns_usable_model() {
        let dir       = tempfile::tempdir().unwrap();
        let device    = NdArrayDevice::Cpu;
        let cfg       = config();
        let model     = cfg.init::<TestBackend>(&device);
        let mut optim = SgdConfig::new().init();
        let mut rng   = StdRng::seed_from_u64(1);
        let ckpt      = CheckpointManager::new(dir.path().join("lm"));
        let mut hist  = LossHistoryLogger::create(&dir.path().join("lm.csv")).unwrap();
        let stop      = AtomicBool::new(true);

        let (model, outcome) = pretrain(
            model, &cfg, &mut optim, &stream(4), &stream(2), &opts(3), &mut rng, &ckpt, &mut hist,
            &stop, &device,
        )
        .unwrap();

        assert_eq!(outcome.epochs_run, 0);
        assert_eq!(outcome.best_epoch, 0);
        assert!(!ckpt.record_path().exists());
        assert!(evaluate_lm(&model.valid(), &stream(2), &device).is_finite());

        // no epoch completed, so not even the header row
        let csv = std::fs::read_to_string(dir.path().join("lm.csv")).unwrap();
        assert!(csv.is_empty());
    }
}
