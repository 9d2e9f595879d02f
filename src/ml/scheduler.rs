// ============================================================
// Layer 5 — Warmup-Linear Learning-Rate Schedule
// ============================================================
// Multiplier on the base learning rate, indexed by optimizer step:
//
//   1.0 ┤        /\
//       │       /  \
//       │      /    \
//       │     /      \
//   0.0 ┼────/────────\────────
//       0  warmup    t_total
//
//   step <  warmup : step / warmup
//   step >= warmup : (t_total - step) / (t_total - warmup), floored at 0
//
// The rate for an update is read first and the schedule is
// advanced after the update, so the very first update runs at
// multiplier 0. The step counter is never reset between
// gradual-unfreezing stages.
//
// Reference: Devlin et al. (2019) BERT, warmup-linear schedule

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupLinearSchedule {
    base_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
    step:         usize,
}

impl WarmupLinearSchedule {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            base_lr,
            warmup_steps: warmup_steps.min(total_steps),
            total_steps,
            step: 0,
        }
    }

    /// Warmup given as a fraction of the total step budget.
    pub fn with_warmup_fraction(base_lr: f64, warmup_fraction: f64, total_steps: usize) -> Self {
        let warmup = (total_steps as f64 * warmup_fraction.clamp(0.0, 1.0)).round() as usize;
        Self::new(base_lr, warmup, total_steps)
    }

    pub fn multiplier_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return step as f64 / self.warmup_steps.max(1) as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let decay_len = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        (remaining / decay_len).max(0.0)
    }

    /// Learning rate for the next optimizer update.
    pub fn lr(&self) -> f64 {
        self.base_lr * self.multiplier_at(self.step)
    }

    /// Record one completed update and return the next rate.
    pub fn step(&mut self) -> f64 {
        self.step += 1;
        self.lr()
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn warmup_steps(&self) -> usize {
        self.warmup_steps
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}
