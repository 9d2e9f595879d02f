use burn::{
    module::Param,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::params::{linear_specs, ParamSpec};

// ─── Classification head ──────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct PoolingDecoderConfig {
    #[config(default = 2)]
    pub num_classes: usize,
    #[config(default = 50)]
    pub bottleneck: usize,
    #[config(default = 0.4)]
    pub input_dp: f64,
    #[config(default = 0.1)]
    pub hidden_dp: f64,
}

impl PoolingDecoderConfig {
    /// `encoder_dim` is the width of one encoder output vector; the
    /// pooled input is three times that.
    pub fn init<B: Backend>(&self, encoder_dim: usize, device: &B::Device) -> ConcatPoolingDecoder<B> {
        ConcatPoolingDecoder {
            input_dropout:  DropoutConfig::new(self.input_dp).init(),
            bottleneck:     LinearConfig::new(3 * encoder_dim, self.bottleneck).init(device),
            hidden_dropout: DropoutConfig::new(self.hidden_dp).init(),
            output:         LinearConfig::new(self.bottleneck, self.num_classes).init(device),
        }
    }

    pub fn param_specs(&self, encoder_dim: usize) -> Vec<ParamSpec> {
        let mut specs = linear_specs("decoder.bottleneck", 3 * encoder_dim, self.bottleneck, true);
        specs.extend(linear_specs("decoder.output", self.bottleneck, self.num_classes, true));
        specs
    }
}

/// Pools the encoder sequence into [last ; max ; mean] and maps it
/// through a bottleneck to class logits.
#[derive(Module, Debug)]
pub struct ConcatPoolingDecoder<B: Backend> {
    pub input_dropout:  Dropout,
    pub bottleneck:     Linear<B>,
    pub hidden_dropout: Dropout,
    pub output:         Linear<B>,
}

impl<B: Backend> ConcatPoolingDecoder<B> {
    /// hidden: [b, s, d], mask: [b, s] (1.0 = real token) → logits [b, classes]
    pub fn forward(&self, hidden: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
        let pooled = concat_pool(hidden, mask);
        let x = self.input_dropout.forward(pooled);
        let x = relu(self.bottleneck.forward(x));
        let x = self.hidden_dropout.forward(x);
        self.output.forward(x)
    }
}

/// [last real step ; masked max ; masked mean] → [b, 3d].
///
/// `mask` must have at least one 1.0 per row.
pub fn concat_pool<B: Backend>(hidden: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, seq_len, dim] = hidden.dims();
    let device = hidden.device();

    let lengths = mask.clone().sum_dim(1); // [b, 1]
    let mask3   = mask.reshape([batch, seq_len, 1]).expand([batch, seq_len, dim]);

    // Post-padding: the last real token sits at length - 1
    let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
        .float()
        .reshape([1, seq_len])
        .expand([batch, seq_len]);
    let last_pos  = lengths.clone().sub_scalar(1.0).expand([batch, seq_len]);
    let last_mask = positions
        .equal(last_pos)
        .float()
        .reshape([batch, seq_len, 1])
        .expand([batch, seq_len, dim]);
    let last = (hidden.clone() * last_mask).sum_dim(1).reshape([batch, dim]);

    let penalty = mask3.clone().sub_scalar(1.0).mul_scalar(1.0e9);
    // Reduce over the last axis: ndarray's autodiff max only
    // scatters gradients along the trailing dimension
    let max     = (hidden.clone() + penalty)
        .swap_dims(1, 2)
        .max_dim(2)
        .reshape([batch, dim]);

    let mean = (hidden * mask3)
        .sum_dim(1)
        .reshape([batch, dim])
        .div(lengths.expand([batch, dim]));

    Tensor::cat(vec![last, max, mean], 1)
}

// ─── Language-model head ──────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct LinearDecoderConfig {
    pub hidden_dim: usize,
    pub vocab_size: usize,
    #[config(default = false)]
    pub tied: bool,
}

impl LinearDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LinearDecoder<B> {
        let projection = (!self.tied).then(|| {
            LinearConfig::new(self.hidden_dim, self.vocab_size)
                .with_bias(false)
                .init(device)
        });
        LinearDecoder {
            projection,
            bias: Param::from_tensor(Tensor::zeros([self.vocab_size], device)),
        }
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        let mut specs = Vec::new();
        if !self.tied {
            specs.extend(linear_specs("decoder.projection", self.hidden_dim, self.vocab_size, false));
        }
        specs.push(ParamSpec::new("decoder.bias", &[self.vocab_size]));
        specs
    }
}

/// Projects every hidden vector onto the vocabulary. With tied
/// weights the projection is the transposed embedding matrix.
#[derive(Module, Debug)]
pub struct LinearDecoder<B: Backend> {
    pub projection: Option<Linear<B>>,
    pub bias:       Param<Tensor<B, 1>>,
}

impl<B: Backend> LinearDecoder<B> {
    /// hidden: [b, s, d] → logits [b * s, vocab]
    pub fn forward(&self, hidden: Tensor<B, 3>, embedding_weight: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, seq_len, dim] = hidden.dims();
        let flat = hidden.reshape([batch * seq_len, dim]);

        let logits = match &self.projection {
            Some(linear) => linear.forward(flat),
            None => flat.matmul(embedding_weight.transpose()),
        };

        let [rows, vocab] = logits.dims();
        logits + self.bias.val().reshape([1, vocab]).expand([rows, vocab])
    }
}
