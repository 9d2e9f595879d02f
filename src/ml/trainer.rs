// ============================================================
// Layer 5 — Fine-Tuning Loop
// ============================================================
// One epoch of classifier training plus validation, and the
// gradual-unfreezing driver that strings epochs together.
//
// Per training batch:
//   logits = model(tokens)
//   loss   = cross_entropy(logits, labels)
//   grads  = loss.backward()
//   for each trainable layer group:
//       model = adam.step(schedule.lr(), model, grads[group])
//   schedule.step()
//
// Clipping is configured on the optimizer, so it applies inside
// `step`. The schedule advances once per batch, never per group.
//
// Key Burn insight:
//   - Training uses the autodiff backend B for gradients
//   - model.valid() returns the model on B::InnerBackend,
//     where dropout is off and no graph is recorded
//   - The validation loader must batch onto B::InnerBackend too
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam
//            Howard & Ruder (2018) ULMFiT §3.2

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{ClassificationBatch, ClassificationBatcher},
    dataloader::EpochLoader,
    dataset::{ClassificationItem, SentimentDataset},
};
use crate::infra::metrics::{progress_bar, EpochMetrics, MetricsLogger};
use crate::ml::{
    freezing::{total_epochs, LayerGroups, Stage},
    model::{count_correct, SentimentClassifier},
    scheduler::WarmupLinearSchedule,
};

pub type ClassifierLoader<B> =
    EpochLoader<ClassificationItem, ClassificationBatch<B>, SentimentDataset, ClassificationBatcher<B>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub train_loss: f64,
    pub train_acc:  f64,
    pub val_loss:   f64,
    pub val_acc:    f64,
    /// Learning rate of the last update
    pub lr:         f64,
}

/// Running sums for one pass over a loader.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    loss_sum: f64,
    batches:  usize,
    correct:  usize,
    samples:  usize,
}

impl Tally {
    fn mean_loss(&self) -> f64 {
        if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN }
    }

    fn accuracy(&self) -> f64 {
        if self.samples > 0 { self.correct as f64 / self.samples as f64 } else { 0.0 }
    }
}

/// Train for one epoch, then validate.
pub fn one_cycle<B, O>(
    mut model:    SentimentClassifier<B>,
    optim:        &mut O,
    schedule:     &mut WarmupLinearSchedule,
    groups:       &LayerGroups,
    train_loader: &mut ClassifierLoader<B>,
    valid_loader: &mut ClassifierLoader<B::InnerBackend>,
) -> Result<(SentimentClassifier<B>, EpochReport)>
where
    B: AutodiffBackend,
    O: Optimizer<SentimentClassifier<B>, B>,
{
    // ── Training phase ────────────────────────────────────────────────────────
    let mut tally   = Tally::default();
    let mut last_lr = schedule.lr();
    let pb = progress_bar(train_loader.num_batches(), "train");

    for batch in train_loader.epoch() {
        let samples = batch.labels.dims()[0];
        let (loss, logits) = model.forward_loss(batch.tokens, batch.labels.clone());

        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        if !loss_val.is_finite() {
            pb.abandon();
            bail!(
                "Training loss became {} at step {}; lower the learning rate or check the inputs",
                loss_val,
                schedule.current_step()
            );
        }

        tally.loss_sum += loss_val;
        tally.batches  += 1;
        tally.correct  += count_correct(logits.inner(), batch.labels.inner());
        tally.samples  += samples;

        // Backward pass + one Adam update per trainable group
        let lr        = schedule.lr();
        let mut grads = loss.backward();
        for part in model.group_gradients(&mut grads, groups) {
            model = optim.step(lr, model, part);
        }
        last_lr = lr;
        schedule.step();

        pb.inc(1);
        pb.set_message(format!("loss={:.4} lr={:.2e}", tally.mean_loss(), lr));
    }
    pb.finish_and_clear();

    // ── Validation phase ──────────────────────────────────────────────────────
    let (val_loss, val_acc) = evaluate(&model.valid(), valid_loader);

    Ok((
        model,
        EpochReport {
            train_loss: tally.mean_loss(),
            train_acc:  tally.accuracy(),
            val_loss,
            val_acc,
            lr: last_lr,
        },
    ))
}

/// Mean loss and accuracy over one pass of `loader`, in loader order.
pub fn evaluate<B: Backend>(
    model:  &SentimentClassifier<B>,
    loader: &mut ClassifierLoader<B>,
) -> (f64, f64) {
    let mut tally = Tally::default();
    for batch in loader.epoch() {
        let samples = batch.labels.dims()[0];
        let (loss, logits) = model.forward_loss(batch.tokens, batch.labels.clone());
        tally.loss_sum += loss.into_scalar().elem::<f64>();
        tally.batches  += 1;
        tally.correct  += count_correct(logits, batch.labels);
        tally.samples  += samples;
    }
    (tally.mean_loss(), tally.accuracy())
}

/// Run every stage of the plan, one `one_cycle` per epoch, logging
/// each epoch to `metrics`.
#[allow(clippy::too_many_arguments)]
pub fn fine_tune<B, O>(
    mut model:    SentimentClassifier<B>,
    optim:        &mut O,
    schedule:     &mut WarmupLinearSchedule,
    plan:         &[Stage],
    train_loader: &mut ClassifierLoader<B>,
    valid_loader: &mut ClassifierLoader<B::InnerBackend>,
    metrics:      &mut MetricsLogger,
) -> Result<(SentimentClassifier<B>, Vec<EpochMetrics>)>
where
    B: AutodiffBackend,
    O: Optimizer<SentimentClassifier<B>, B>,
{
    let epochs_total = total_epochs(plan);
    let mut groups   = LayerGroups::new(model.num_groups());
    let mut history  = Vec::with_capacity(epochs_total);
    let mut epoch    = 0usize;

    groups.freeze();
    for (stage_idx, stage) in plan.iter().enumerate() {
        stage.apply(&mut groups);
        tracing::info!(
            "Stage {}/{}: {} of {} layer groups trainable [{}]",
            stage_idx + 1,
            plan.len(),
            groups.trainable_count(),
            groups.len(),
            groups.describe(),
        );

        for _ in 0..stage.epochs {
            epoch += 1;
            let (next, report) =
                one_cycle(model, optim, schedule, &groups, train_loader, valid_loader)?;
            model = next;

            println!(
                "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | val_loss={:.4} | val_acc={:.1}% | lr={:.2e}",
                epoch, epochs_total,
                report.train_loss, report.train_acc * 100.0,
                report.val_loss, report.val_acc * 100.0,
                report.lr,
            );

            let row = EpochMetrics {
                epoch,
                stage: stage_idx + 1,
                trainable_groups: groups.describe(),
                lr:         report.lr,
                train_loss: report.train_loss,
                train_acc:  report.train_acc,
                val_loss:   report.val_loss,
                val_acc:    report.val_acc,
            };
            metrics.log(&row)?;
            history.push(row);
        }
    }

    tracing::info!(
        "Fine-tuning complete after {} epochs, best val_loss={:.4}",
        epoch,
        metrics.best_val_loss(),
    );
    Ok((model, history))
}
