use burn::{
    nn::{loss::CrossEntropyLossConfig, LstmState},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::ml::{
    decoder::{ConcatPoolingDecoder, LinearDecoder, LinearDecoderConfig, PoolingDecoderConfig},
    encoder::{AwdLstmEncoder, AwdLstmEncoderConfig},
    freezing::LayerGroups,
    params::ParamSpec,
};

// ─── Sentiment classifier ─────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct SentimentClassifierConfig {
    pub encoder: AwdLstmEncoderConfig,
    pub decoder: PoolingDecoderConfig,
    #[config(default = 1)]
    pub pad_idx: usize,
}

impl SentimentClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SentimentClassifier<B> {
        SentimentClassifier {
            encoder: self.encoder.init(device),
            decoder: self.decoder.init(self.encoder.output_dim(), device),
            pad_idx: self.pad_idx,
        }
    }

    /// embedding + LSTM 0, one group per further LSTM, the decoder.
    pub fn num_groups(&self) -> usize {
        self.encoder.num_layers + 1
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        let mut specs = self.encoder.param_specs();
        specs.extend(self.decoder.param_specs(self.encoder.output_dim()));
        specs
    }
}

#[derive(Module, Debug)]
pub struct SentimentClassifier<B: Backend> {
    pub encoder: AwdLstmEncoder<B>,
    pub decoder: ConcatPoolingDecoder<B>,
    pub pad_idx: usize,
}

impl<B: Backend> SentimentClassifier<B> {
    /// tokens: [batch, seq_len] → logits [batch, num_classes]
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, _] = tokens.dims();
        let device     = tokens.device();

        // An all-padding row still pools over its first position
        let mask = tokens
            .clone()
            .not_equal_elem(self.pad_idx as i64)
            .float()
            .slice_assign([0..batch, 0..1], Tensor::ones([batch, 1], &device));

        let encoded = self.encoder.forward(tokens, None);
        self.decoder.forward(encoded.last_output(), mask)
    }

    pub fn forward_loss(
        &self,
        tokens: Tensor<B, 2, Int>,
        labels: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(tokens);
        let ce     = CrossEntropyLossConfig::new().init(&logits.device());
        let loss   = ce.forward(logits.clone(), labels);
        (loss, logits)
    }

    pub fn num_groups(&self) -> usize {
        self.encoder.num_layers() + 1
    }
}

impl<B: AutodiffBackend> SentimentClassifier<B> {
    /// Split the gradients of one backward pass by layer group and
    /// keep only the trainable groups. Each returned part is fed to
    /// the optimizer separately; parameters of frozen groups never
    /// receive an update.
    pub fn group_gradients(
        &self,
        grads:  &mut B::Gradients,
        groups: &LayerGroups,
    ) -> Vec<GradientsParams> {
        let decoder_group = self.num_groups() - 1;
        let mut parts     = Vec::with_capacity(groups.trainable_count() + 1);

        if groups.is_trainable(0) {
            parts.push(GradientsParams::from_module(grads, &self.encoder.embedding));
        }
        for (i, rnn) in self.encoder.rnns.iter().enumerate() {
            if groups.is_trainable(i) {
                parts.push(GradientsParams::from_module(grads, rnn));
            }
        }
        if groups.is_trainable(decoder_group) {
            parts.push(GradientsParams::from_module(grads, &self.decoder));
        }
        parts
    }
}

/// Number of rows whose argmax matches the label.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1]
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

// ─── Language model ───────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct LanguageModelConfig {
    pub encoder: AwdLstmEncoderConfig,
}

impl LanguageModelConfig {
    fn decoder_config(&self) -> LinearDecoderConfig {
        LinearDecoderConfig::new(self.encoder.output_dim(), self.encoder.vocab_size)
            .with_tied(self.encoder.tie_weights)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LanguageModel<B> {
        LanguageModel {
            encoder: self.encoder.init(device),
            decoder: self.decoder_config().init(device),
        }
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        let mut specs = self.encoder.param_specs();
        specs.extend(self.decoder_config().param_specs());
        specs
    }
}

#[derive(Module, Debug)]
pub struct LanguageModel<B: Backend> {
    pub encoder: AwdLstmEncoder<B>,
    pub decoder: LinearDecoder<B>,
}

pub struct LmOutput<B: Backend> {
    /// [batch * seq_len, vocab]
    pub logits:   Tensor<B, 2>,
    /// Last layer before dropout (TAR)
    pub raw_last: Tensor<B, 3>,
    /// Last layer after dropout (AR)
    pub dropped:  Tensor<B, 3>,
    pub states:   Vec<LstmState<B, 2>>,
}

impl<B: Backend> LanguageModel<B> {
    pub fn forward(
        &self,
        inputs: Tensor<B, 2, Int>,
        states: Option<Vec<LstmState<B, 2>>>,
    ) -> LmOutput<B> {
        let encoded  = self.encoder.forward(inputs, states);
        let dropped  = encoded.last_output();
        let raw_last = encoded.last_raw();
        let logits   = self
            .decoder
            .forward(dropped.clone(), self.encoder.embedding.weight.val());
        LmOutput { logits, raw_last, dropped, states: encoded.states }
    }

    /// Mean next-token cross-entropy over every position of the window.
    pub fn forward_loss(
        &self,
        inputs:  Tensor<B, 2, Int>,
        targets: Tensor<B, 2, Int>,
        states:  Option<Vec<LstmState<B, 2>>>,
    ) -> (Tensor<B, 1>, LmOutput<B>) {
        let [batch, seq_len] = targets.dims();
        let output = self.forward(inputs, states);
        let ce     = CrossEntropyLossConfig::new().init(&output.logits.device());
        let loss   = ce.forward(output.logits.clone(), targets.reshape([batch * seq_len]));
        (loss, output)
    }
}
