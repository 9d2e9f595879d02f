// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a seeded RNG and splits them into two
// sets:
//   - Training set:   used to update model weights
//   - Validation set: used to measure performance on unseen data
//
// The split point is floor(N * fraction), so for N = 25_000
// and fraction = 0.7 the sets are exactly 17_500 / 7_500.
//
// The same seed always yields the same permutation, which is
// what lets the tokenised cache line up with the raw split on
// the next run.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: Rust Book §8 (Vectors)
//            rand crate documentation (SeedableRng, StdRng)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// # Arguments
/// * `samples`        - All available samples (consumed by this function)
/// * `train_fraction` - Proportion for training, e.g. 0.7 = 70%
/// * `seed`           - Shuffle seed
pub fn split_train_val<T>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    seed:           u64,
) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).floor() as usize;
    let split_at = split_at.min(total);

    // split_off(n) removes elements [n..] and returns them
    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation (seed {})",
        samples.len(),
        val.len(),
        seed,
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..25_000).collect();
        let (train, val)      = split_train_val(items, 0.7, 42);
        assert_eq!(train.len(), 17_500);
        assert_eq!(val.len(),   7_500);
    }

    #[test]
    fn test_split_uses_floor() {
        for n in [0usize, 1, 3, 7, 10, 99, 101] {
            let items: Vec<usize> = (0..n).collect();
            let (train, val)      = split_train_val(items, 0.7, 1);
            assert_eq!(train.len(), (n as f64 * 0.7).floor() as usize);
            assert_eq!(train.len() + val.len(), n);
        }
    }

    #[test]
    fn test_same_seed_same_split() {
        let (a_train, a_val) = split_train_val((0..200).collect::<Vec<u32>>(), 0.7, 42);
        let (b_train, b_val) = split_train_val((0..200).collect::<Vec<u32>>(), 0.7, 42);
        assert_eq!(a_train, b_train);
        assert_eq!(a_val,   b_val);
    }

    #[test]
    fn test_different_seed_different_order() {
        let (a, _) = split_train_val((0..200).collect::<Vec<u32>>(), 0.7, 1);
        let (b, _) = split_train_val((0..200).collect::<Vec<u32>>(), 0.7, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_subsets_are_disjoint() {
        let (mut train, val) = split_train_val((0..50).collect::<Vec<u32>>(), 0.7, 9);
        assert!(val.iter().all(|v| !train.contains(v)));
        train.extend(val);
        train.sort_unstable();
        assert_eq!(train, (0..50).collect::<Vec<u32>>());
    }

    #[test]
    fn test_empty_dataset() {
        let (train, val) = split_train_val(Vec::<usize>::new(), 0.7, 42);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
