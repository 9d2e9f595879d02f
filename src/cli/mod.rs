// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `pretrain`: trains the AWD-LSTM language model and
//                  writes the checkpoint and vocabulary
//   2. `finetune`: trains the sentiment classifier on top of
//                  that checkpoint and logs per-epoch metrics
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, FinetuneArgs, PretrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "ulmfit-sentiment",
    version = "0.1.0",
    about = "Pretrain an AWD-LSTM language model, then fine-tune it into a sentiment classifier."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Pretrain(args) => run_pretrain(args),
            Commands::Finetune(args) => run_finetune(args),
        }
    }
}

fn run_pretrain(args: PretrainArgs) -> Result<()> {
    use crate::application::pretrain_use_case::PretrainUseCase;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    tracing::info!("Pretraining on corpus in: {}", args.corpus_dir);

    // Ctrl-C stops training; the test pass and summary still run
    let stop      = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\n  Interrupt received, finishing the current window...");
        stop_flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!("Cannot install Ctrl-C handler: {}", e);
    }

    let summary = PretrainUseCase::new(args.into()).with_stop_flag(stop).execute()?;
    println!("Pretraining complete. Best checkpoint from epoch {}.", summary.best_epoch);
    Ok(())
}

fn run_finetune(args: FinetuneArgs) -> Result<()> {
    use crate::application::finetune_use_case::FinetuneUseCase;

    tracing::info!("Fine-tuning on: {}", args.csv_path);

    let report = FinetuneUseCase::new(args.into()).execute()?;
    match report.epochs.last() {
        Some(last) => println!(
            "Fine-tuning complete ({} train / {} validation batches per epoch). Final val_loss={:.4}, val_acc={:.1}%",
            report.train_batches,
            report.valid_batches,
            last.val_loss,
            last.val_acc * 100.0
        ),
        None => println!("Fine-tuning complete. No epochs were run."),
    }
    Ok(())
}
