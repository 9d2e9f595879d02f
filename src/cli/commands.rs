// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `pretrain` and `finetune`, and
// every flag they accept. Each Args struct converts into the
// matching application-layer config, so Layer 2 never sees
// clap types.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    finetune_use_case::FinetuneConfig,
    pretrain_use_case::PretrainConfig,
    runtime::DeviceKind,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pretrain an AWD-LSTM language model on a wikitext-style corpus
    Pretrain(PretrainArgs),

    /// Fine-tune a sentiment classifier on top of a pretrained encoder
    Finetune(FinetuneArgs),
}

/// Where the tensors live for the whole run
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum DeviceArg {
    /// NdArray backend
    #[default]
    Cpu,
    /// WGPU backend
    Gpu,
}

impl From<DeviceArg> for DeviceKind {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Cpu => DeviceKind::Cpu,
            DeviceArg::Gpu => DeviceKind::Gpu,
        }
    }
}

// ─── pretrain ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct PretrainArgs {
    /// Directory with the train/valid/test token files
    #[arg(long, default_value = "data/wikitext-2")]
    pub corpus_dir: String,

    #[arg(long, default_value = "wiki.train.tokens")]
    pub train_file: String,

    #[arg(long, default_value = "wiki.valid.tokens")]
    pub valid_file: String,

    #[arg(long, default_value = "wiki.test.tokens")]
    pub test_file: String,

    /// Directory for the checkpoint, vocabulary and logs
    #[arg(long, default_value = "model")]
    pub output_dir: String,

    /// File stem of the checkpoint and logs inside output_dir
    #[arg(long, default_value = "awd_lstm")]
    pub output: String,

    #[arg(long, default_value_t = 80)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub eval_batch_size: usize,

    /// Sequence length of one BPTT window
    #[arg(long, default_value_t = 80)]
    pub bptt: usize,

    /// Draw window lengths around bptt instead of using it exactly
    #[arg(long)]
    pub variable_bptt: bool,

    #[arg(long, default_value_t = 400)]
    pub emb_dim: usize,

    #[arg(long, default_value_t = 1150)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 3)]
    pub num_layers: usize,

    /// Embedding dropout (whole words)
    #[arg(long, default_value_t = 0.1)]
    pub emb_dp: f64,

    /// Locked dropout on the embedding output
    #[arg(long, default_value_t = 0.3)]
    pub input_dp: f64,

    /// Locked dropout between LSTM layers
    #[arg(long, default_value_t = 0.3)]
    pub hidden_dp: f64,

    /// Locked dropout on the last LSTM output
    #[arg(long, default_value_t = 0.4)]
    pub out_dp: f64,

    /// DropConnect on the LSTM hidden-to-hidden weights
    #[arg(long, default_value_t = 0.5)]
    pub weight_dp: f64,

    /// Embedding weights start in [-initrange, initrange]
    #[arg(long, default_value_t = 0.05)]
    pub initrange: f64,

    /// Share the embedding matrix with the output projection
    #[arg(long)]
    pub tie_weights: bool,

    #[arg(long, default_value_t = 30.0)]
    pub lr: f64,

    /// Divide lr by this when validation loss does not improve
    #[arg(long, default_value_t = 4.0)]
    pub anneal_factor: f64,

    #[arg(long, default_value_t = 2)]
    pub epochs: usize,

    /// Gradient clipping threshold, applied to each parameter tensor's
    /// own L2 norm, not to the global norm over all gradients
    #[arg(long, default_value_t = 0.25)]
    pub clip: f64,

    /// Activation regularisation weight
    #[arg(long, default_value_t = 2.0)]
    pub alpha: f64,

    /// Temporal activation regularisation weight
    #[arg(long, default_value_t = 1.0)]
    pub beta: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = DeviceArg::Cpu)]
    pub device: DeviceArg,
}

impl From<PretrainArgs> for PretrainConfig {
    fn from(a: PretrainArgs) -> Self {
        PretrainConfig {
            corpus_dir:      a.corpus_dir,
            train_file:      a.train_file,
            valid_file:      a.valid_file,
            test_file:       a.test_file,
            output_dir:      a.output_dir,
            output:          a.output,
            batch_size:      a.batch_size,
            eval_batch_size: a.eval_batch_size,
            bptt:            a.bptt,
            variable_bptt:   a.variable_bptt,
            emb_dim:         a.emb_dim,
            hidden_dim:      a.hidden_dim,
            num_layers:      a.num_layers,
            emb_dp:          a.emb_dp,
            input_dp:        a.input_dp,
            hidden_dp:       a.hidden_dp,
            out_dp:          a.out_dp,
            weight_dp:       a.weight_dp,
            initrange:       a.initrange,
            tie_weights:     a.tie_weights,
            lr:              a.lr,
            anneal_factor:   a.anneal_factor,
            epochs:          a.epochs,
            clip:            a.clip,
            alpha:           a.alpha,
            beta:            a.beta,
            seed:            a.seed,
            device:          a.device.into(),
        }
    }
}

// ─── finetune ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct FinetuneArgs {
    /// Labelled CSV with `text` and `sentiment` columns
    #[arg(long, default_value = "data/imdb.csv")]
    pub csv_path: String,

    /// Vocabulary written by `pretrain`
    #[arg(long, default_value = "model/vocab.json")]
    pub vocab_path: String,

    /// Checkpoint stem written by `pretrain` (no extension)
    #[arg(long, default_value = "model/awd_lstm")]
    pub checkpoint: String,

    /// Where the tokenised splits are cached
    #[arg(long, default_value = "cache")]
    pub cache_dir: String,

    /// Where metrics.csv and finetune_config.json go
    #[arg(long, default_value = "finetune")]
    pub output_dir: String,

    #[arg(long, default_value_t = 0.7)]
    pub train_fraction: f64,

    /// Longer reviews are truncated, shorter ones padded
    #[arg(long, default_value_t = 512)]
    pub max_seq_len: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Keep the original casing instead of lowercasing
    ///
    /// The pretraining vocabulary holds whitespace-split, case-sensitive
    /// corpus tokens. Fine-tuning text is also split at punctuation
    /// ("it's" becomes "it", "'", "s"), so such words fall back to <unk>
    /// unless the corpus was tokenised the same way. Pass this flag when
    /// the corpus keeps its capitals.
    #[arg(long)]
    pub cased: bool,

    /// Abort when more than this share of tokens is <unk>
    #[arg(long, default_value_t = 0.5)]
    pub max_unknown_rate: f64,

    #[arg(long, default_value_t = 2)]
    pub num_classes: usize,

    #[arg(long, default_value_t = 0.1)]
    pub emb_dp: f64,

    #[arg(long, default_value_t = 0.3)]
    pub input_dp: f64,

    #[arg(long, default_value_t = 0.3)]
    pub hidden_dp: f64,

    #[arg(long, default_value_t = 0.4)]
    pub out_dp: f64,

    /// DropConnect on the LSTM hidden-to-hidden weights
    #[arg(long, default_value_t = 0.5)]
    pub weight_dp: f64,

    /// Width of the classification head's hidden layer
    #[arg(long, default_value_t = 50)]
    pub bottleneck: usize,

    #[arg(long, default_value_t = 0.4)]
    pub head_input_dp: f64,

    #[arg(long, default_value_t = 0.1)]
    pub head_hidden_dp: f64,

    /// Peak learning rate, reached at the end of warmup
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Share of all steps spent warming up
    #[arg(long, default_value_t = 0.1)]
    pub warmup_fraction: f64,

    /// Gradient clipping threshold, applied to each parameter tensor's
    /// own L2 norm, not to the global norm over all gradients
    #[arg(long, default_value_t = 1.0)]
    pub clip: f64,

    /// Epochs with every layer group trainable
    #[arg(long, default_value_t = 2)]
    pub final_epochs: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = DeviceArg::Cpu)]
    pub device: DeviceArg,
}

impl From<FinetuneArgs> for FinetuneConfig {
    fn from(a: FinetuneArgs) -> Self {
        FinetuneConfig {
            csv_path:         a.csv_path,
            vocab_path:       a.vocab_path,
            checkpoint:       a.checkpoint,
            cache_dir:        a.cache_dir,
            output_dir:       a.output_dir,
            train_fraction:   a.train_fraction,
            max_seq_len:      a.max_seq_len,
            batch_size:       a.batch_size,
            lowercase:        !a.cased,
            max_unknown_rate: a.max_unknown_rate,
            num_classes:      a.num_classes,
            emb_dp:           a.emb_dp,
            input_dp:         a.input_dp,
            hidden_dp:        a.hidden_dp,
            out_dp:           a.out_dp,
            weight_dp:        a.weight_dp,
            bottleneck:       a.bottleneck,
            head_input_dp:    a.head_input_dp,
            head_hidden_dp:   a.head_hidden_dp,
            lr:               a.lr,
            warmup_fraction:  a.warmup_fraction,
            clip:             a.clip,
            final_epochs:     a.final_epochs,
            seed:             a.seed,
            device:           a.device.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::{CommandFactory, Parser};

    #[test]
    fn test_finetune_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["ulmfit-sentiment", "finetune"]).unwrap();
        let Commands::Finetune(args) = cli.command else { panic!("expected finetune") };
        let parsed: FinetuneConfig = args.into();
        let default = FinetuneConfig::default();
        assert_eq!(parsed.batch_size, default.batch_size);
        assert_eq!(parsed.max_seq_len, default.max_seq_len);
        assert_eq!(parsed.lowercase, default.lowercase);
        assert_eq!(parsed.device, DeviceKind::Cpu);
    }

    #[test]
    fn test_pretrain_flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "ulmfit-sentiment", "pretrain", "--bptt", "35", "--tie-weights", "--device", "gpu",
        ])
        .unwrap();
        let Commands::Pretrain(args) = cli.command else { panic!("expected pretrain") };
        let cfg: PretrainConfig = args.into();
        assert_eq!(cfg.bptt, 35);
        assert!(cfg.tie_weights);
        assert!(!cfg.variable_bptt);
        assert_eq!(cfg.device, DeviceKind::Gpu);
    }

    #[test]
    fn test_weight_dp_reaches_both_configs() {
        let cli = Cli::try_parse_from(["ulmfit-sentiment", "pretrain", "--weight-dp", "0.2"]).unwrap();
        let Commands::Pretrain(args) = cli.command else { panic!("expected pretrain") };
        assert_eq!(PretrainConfig::from(args).weight_dp, 0.2);

        let cli = Cli::try_parse_from(["ulmfit-sentiment", "finetune"]).unwrap();
        let Commands::Finetune(args) = cli.command else { panic!("expected finetune") };
        assert_eq!(FinetuneConfig::from(args).weight_dp, FinetuneConfig::default().weight_dp);
    }

    fn long_help(subcommand: &str) -> String {
        let mut cmd = Cli::command();
        cmd.find_subcommand_mut(subcommand)
            .unwrap()
            .render_long_help()
            .to_string()
    }

    #[test]
    fn test_clip_help_says_per_tensor() {
        for sub in ["pretrain", "finetune"] {
            let help = long_help(sub);
            assert!(help.contains("each parameter tensor's own L2 norm"), "{sub}: {help}");
        }
    }

    #[test]
    fn test_cased_help_warns_about_token_mismatch() {
        let help = long_help("finetune");
        assert!(help.contains("whitespace-split, case-sensitive"));
        assert!(help.contains("<unk>"));
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        assert!(Cli::try_parse_from(["ulmfit-sentiment", "finetune", "--device", "tpu"]).is_err());
    }
}
