// ============================================================
// Layer 5 — Layer Groups and Gradual Unfreezing
// ============================================================
// The classifier's parameters are split into ordered groups:
//
//   group 0      embedding + LSTM 0      (most general)
//   group 1      LSTM 1
//   ...
//   group n-1    LSTM n-1
//   group n      pooling decoder          (most task-specific)
//
// Each group carries one trainable flag. Only flagged groups hand
// their gradients to the optimizer; the rest keep their weights.
//
// The fine-tuning schedule unfreezes from the output end:
//
//   stage 1   unfreeze(1)   decoder only          1 epoch
//   stage 2   unfreeze(2)   + LSTM n-1            1 epoch
//   ...
//   stage n   unfreeze(n)   everything but group 0
//   final     unfreeze_all  every group           final_epochs
//
// Reference: Howard & Ruder (2018) "Universal Language Model
//            Fine-tuning for Text Classification" §3.2

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerGroups {
    trainable: Vec<bool>,
}

impl LayerGroups {
    /// `num_groups` groups, all trainable.
    pub fn new(num_groups: usize) -> Self {
        Self { trainable: vec![true; num_groups] }
    }

    pub fn len(&self) -> usize {
        self.trainable.len()
    }

    /// Disable gradient updates for every group.
    pub fn freeze(&mut self) {
        self.trainable.iter_mut().for_each(|t| *t = false);
    }

    /// Enable exactly the last `k` groups (clamped to the group count)
    /// and disable the rest.
    pub fn unfreeze(&mut self, k: usize) {
        let n = self.trainable.len();
        let first = n - k.min(n);
        for (i, t) in self.trainable.iter_mut().enumerate() {
            *t = i >= first;
        }
    }

    pub fn unfreeze_all(&mut self) {
        self.trainable.iter_mut().for_each(|t| *t = true);
    }

    pub fn is_trainable(&self, group: usize) -> bool {
        self.trainable.get(group).copied().unwrap_or(false)
    }

    pub fn trainable_count(&self) -> usize {
        self.trainable.iter().filter(|&&t| t).count()
    }

    /// e.g. "--##" for 4 groups with the last two trainable.
    pub fn describe(&self) -> String {
        self.trainable.iter().map(|&t| if t { '#' } else { '-' }).collect()
    }
}

/// How many groups a stage trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unfreeze {
    Last(usize),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub unfreeze: Unfreeze,
    pub epochs:   usize,
}

impl Stage {
    pub fn apply(&self, groups: &mut LayerGroups) {
        match self.unfreeze {
            Unfreeze::Last(k) => groups.unfreeze(k),
            Unfreeze::All => groups.unfreeze_all(),
        }
    }
}

/// One single-epoch stage per partially unfrozen prefix, then
/// `final_epochs` with everything unfrozen.
pub fn gradual_unfreezing_plan(num_groups: usize, final_epochs: usize) -> Vec<Stage> {
    let mut plan: Vec<Stage> = (1..num_groups)
        .map(|k| Stage { unfreeze: Unfreeze::Last(k), epochs: 1 })
        .collect();
    if final_epochs > 0 {
        plan.push(Stage { unfreeze: Unfreeze::All, epochs: final_epochs });
    }
    plan
}

pub fn total_epochs(plan: &[Stage]) -> usize {
    plan.iter().map(|s| s.epochs).sum()
}
