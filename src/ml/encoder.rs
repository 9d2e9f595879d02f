// ============================================================
// Layer 5 — AWD-LSTM Encoder
// ============================================================
// Embedding followed by a stack of LSTM layers, regularised the
// AWD-LSTM way:
//
//   tokens [b, s]
//      │  embedding dropout   (drops whole rows of the embedding
//      │                       matrix, i.e. whole words)
//      ▼
//   emb [b, s, emb_dim]
//      │  locked dropout (input_dp): one mask per sequence,
//      │                               shared over time steps
//      ▼
//   LSTM 0 → locked dropout (hidden_dp) → LSTM 1 → ... → LSTM n-1
//      │                                                  │
//      │                                     locked dropout (out_dp)
//      ▼                                                  ▼
//   raw_last                                            output
//
// Every LSTM also runs with DropConnect (weight_dp) on its
// hidden-to-hidden weights: one mask per forward call, shared by
// all time steps of that call.
//
// Layer sizes: emb_dim → hidden_dim → ... → hidden_dim → last,
// where the last layer emits emb_dim when the language-model
// decoder is tied to the embedding matrix, else hidden_dim.
//
// Dropout only runs on autodiff backends. Validation uses
// `model.valid()`, whose inner backend reports no autodiff, so
// evaluation is deterministic.
//
// Reference: Merity et al. (2017) "Regularizing and Optimizing
//            LSTM Language Models"
//            Burn Book §3 (Building Blocks)

use burn::{
    module::Param,
    nn::{Embedding, EmbeddingConfig, Initializer, Lstm, LstmConfig, LstmState},
    prelude::*,
    tensor::{module::embedding, Distribution},
};

use crate::ml::params::ParamSpec;

#[derive(Config, Debug)]
pub struct AwdLstmEncoderConfig {
    pub vocab_size: usize,
    #[config(default = 400)]
    pub emb_dim: usize,
    #[config(default = 1150)]
    pub hidden_dim: usize,
    #[config(default = 3)]
    pub num_layers: usize,
    #[config(default = 0.1)]
    pub emb_dp: f64,
    #[config(default = 0.3)]
    pub input_dp: f64,
    #[config(default = 0.3)]
    pub hidden_dp: f64,
    #[config(default = 0.4)]
    pub out_dp: f64,
    /// DropConnect on the hidden-to-hidden weights
    #[config(default = 0.5)]
    pub weight_dp: f64,
    #[config(default = false)]
    pub tie_weights: bool,
    #[config(default = 0.05)]
    pub initrange: f64,
}

impl AwdLstmEncoderConfig {
    /// (d_input, d_hidden) of every LSTM layer.
    pub fn layer_dims(&self) -> Vec<(usize, usize)> {
        (0..self.num_layers)
            .map(|i| {
                let d_in  = if i == 0 { self.emb_dim } else { self.hidden_dim };
                let d_out = if i + 1 == self.num_layers && self.tie_weights {
                    self.emb_dim
                } else {
                    self.hidden_dim
                };
                (d_in, d_out)
            })
            .collect()
    }

    /// Width of the vectors the last layer emits.
    pub fn output_dim(&self) -> usize {
        self.layer_dims().last().map(|&(_, out)| out).unwrap_or(self.emb_dim)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AwdLstmEncoder<B> {
        assert!(self.num_layers >= 1, "an encoder needs at least one LSTM layer");

        let embedding = EmbeddingConfig::new(self.vocab_size, self.emb_dim)
            .with_initializer(Initializer::Uniform {
                min: -self.initrange,
                max:  self.initrange,
            })
            .init(device);

        let rnns = self
            .layer_dims()
            .into_iter()
            .map(|(d_in, d_out)| LstmConfig::new(d_in, d_out, true).init(device))
            .collect();

        AwdLstmEncoder {
            embedding,
            rnns,
            emb_dp:    self.emb_dp,
            input_dp:  self.input_dp,
            hidden_dp: self.hidden_dp,
            out_dp:    self.out_dp,
            weight_dp: self.weight_dp,
        }
    }

    /// Parameter names and shapes, PyTorch-style gate layout.
    pub fn param_specs(&self) -> Vec<ParamSpec> {
        let mut specs = vec![ParamSpec::new(
            "encoder.embedding.weight",
            &[self.vocab_size, self.emb_dim],
        )];
        for (i, (d_in, d_out)) in self.layer_dims().into_iter().enumerate() {
            let prefix = format!("encoder.rnns.{i}");
            specs.push(ParamSpec::new(format!("{prefix}.weight_ih"), &[4 * d_out, d_in]));
            specs.push(ParamSpec::new(format!("{prefix}.weight_hh"), &[4 * d_out, d_out]));
            specs.push(ParamSpec::new(format!("{prefix}.bias"), &[4 * d_out]));
        }
        specs
    }
}

#[derive(Module, Debug)]
pub struct AwdLstmEncoder<B: Backend> {
    pub embedding: Embedding<B>,
    pub rnns:      Vec<Lstm<B>>,
    pub emb_dp:    f64,
    pub input_dp:  f64,
    pub hidden_dp: f64,
    pub out_dp:    f64,
    pub weight_dp: f64,
}

pub struct EncoderOutput<B: Backend> {
    /// Every layer's output before dropout, [b, s, d_i]
    pub raw_outputs: Vec<Tensor<B, 3>>,
    /// Every layer's output after its dropout, [b, s, d_i]
    pub outputs:     Vec<Tensor<B, 3>>,
    /// Final (cell, hidden) of every layer
    pub states:      Vec<LstmState<B, 2>>,
}

impl<B: Backend> EncoderOutput<B> {
    /// Last layer after output dropout.
    pub fn last_output(&self) -> Tensor<B, 3> {
        self.outputs[self.outputs.len() - 1].clone()
    }

    /// Last layer before dropout, used for TAR.
    pub fn last_raw(&self) -> Tensor<B, 3> {
        self.raw_outputs[self.raw_outputs.len() - 1].clone()
    }
}

impl<B: Backend> AwdLstmEncoder<B> {
    pub fn num_layers(&self) -> usize {
        self.rnns.len()
    }

    /// tokens: [batch, seq_len]; `states` carries hidden state over
    /// from the previous BPTT window, one entry per layer.
    pub fn forward(
        &self,
        tokens: Tensor<B, 2, Int>,
        states: Option<Vec<LstmState<B, 2>>>,
    ) -> EncoderOutput<B> {
        let training = B::ad_enabled();

        let weight = self.embedding.weight.val();
        let weight = if training { embedding_dropout(weight, self.emb_dp) } else { weight };
        let mut x  = embedding(weight, tokens);
        if training {
            x = locked_dropout(x, self.input_dp);
        }

        let last            = self.rnns.len() - 1;
        let mut states_in   = states.unwrap_or_default().into_iter();
        let mut states      = Vec::with_capacity(self.rnns.len());
        let mut raw_outputs = Vec::with_capacity(self.rnns.len());
        let mut outputs     = Vec::with_capacity(self.rnns.len());

        for (i, rnn) in self.rnns.iter().enumerate() {
            let (raw, state) = if training && self.weight_dp > 0.0 {
                weight_drop(rnn, self.weight_dp).forward(x, states_in.next())
            } else {
                rnn.forward(x, states_in.next())
            };
            states.push(state);
            raw_outputs.push(raw.clone());

            let p = if i == last { self.out_dp } else { self.hidden_dp };
            x = if training { locked_dropout(raw, p) } else { raw };
            outputs.push(x.clone());
        }

        EncoderOutput { raw_outputs, outputs, states }
    }
}

/// A copy of `rnn` whose four hidden-to-hidden matrices carry a
/// fresh DropConnect mask. Parameter ids are kept, so gradients
/// flow back to the original weights.
pub fn weight_drop<B: Backend>(rnn: &Lstm<B>, p: f64) -> Lstm<B> {
    let mut rnn = rnn.clone();
    for gate in [
        &mut rnn.input_gate,
        &mut rnn.forget_gate,
        &mut rnn.output_gate,
        &mut rnn.cell_gate,
    ] {
        gate.hidden_transform.weight = drop_connect(&gate.hidden_transform.weight, p);
    }
    rnn
}

fn drop_connect<B: Backend>(weight: &Param<Tensor<B, 2>>, p: f64) -> Param<Tensor<B, 2>> {
    let w = weight.val();
    if p >= 1.0 {
        return Param::initialized(weight.id, w.zeros_like());
    }
    let mask = Tensor::<B, 2>::random(w.dims(), Distribution::Bernoulli(1.0 - p), &w.device())
        .div_scalar(1.0 - p);
    Param::initialized(weight.id, w * mask)
}

/// Zero whole rows of the embedding matrix with probability `p`,
/// scaling the survivors by 1 / (1 - p).
pub fn embedding_dropout<B: Backend>(weight: Tensor<B, 2>, p: f64) -> Tensor<B, 2> {
    if p <= 0.0 {
        return weight;
    }
    let [vocab, dim] = weight.dims();
    let mask = Tensor::<B, 2>::random([vocab, 1], Distribution::Bernoulli(1.0 - p), &weight.device())
        .div_scalar(1.0 - p)
        .expand([vocab, dim]);
    weight * mask
}

/// Variational dropout: one mask per (sequence, feature), reused at
/// every time step.
pub fn locked_dropout<B: Backend>(x: Tensor<B, 3>, p: f64) -> Tensor<B, 3> {
    if p <= 0.0 {
        return x;
    }
    let [batch, seq_len, dim] = x.dims();
    let mask = Tensor::<B, 3>::random([batch, 1, dim], Distribution::Bernoulli(1.0 - p), &x.device())
        .div_scalar(1.0 - p)
        .expand([batch, seq_len, dim]);
    x * mask
}

/// Cut the autograd graph between BPTT windows.
pub fn detach_states<B: Backend>(states: Vec<LstmState<B, 2>>) -> Vec<LstmState<B, 2>> {
    states
        .into_iter()
        .map(|s| LstmState::new(s.cell.detach(), s.hidden.detach()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        module::AutodiffModule,
    };

    type TestBackend = NdArray;

    fn flat2(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn tiny(tie_weights: bool) -> AwdLstmEncoderConfig {
        AwdLstmEncoderConfig::new(20)
            .with_emb_dim(6)
            .with_hidden_dim(10)
            .with_num_layers(3)
            .with_tie_weights(tie_weights)
    }

    #[test]
    fn test_layer_dims_untied() {
        assert_eq!(tiny(false).layer_dims(), vec![(6, 10), (10, 10), (10, 10)]);
        assert_eq!(tiny(false).output_dim(), 10);
    }

    #[test]
    fn test_layer_dims_tied() {
        assert_eq!(tiny(true).layer_dims(), vec![(6, 10), (10, 10), (10, 6)]);
        assert_eq!(tiny(true).output_dim(), 6);
    }

    #[test]
    fn test_param_specs_cover_every_layer() {
        let specs = tiny(false).param_specs();
        assert_eq!(specs.len(), 1 + 3 * 3);
        assert_eq!(specs[0].shape, vec![20, 6]);
        assert_eq!(specs[1].name, "encoder.rnns.0.weight_ih");
        assert_eq!(specs[1].shape, vec![40, 6]);
    }

    #[test]
    fn test_forward_shapes() {
        let device  = Default::default();
        let encoder = tiny(true).init::<TestBackend>(&device);
        let tokens  = Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 3, 4, 5, 6, 7, 8], &device)
            .reshape([2, 4]);
        let out = encoder.forward(tokens, None);
        assert_eq!(out.last_output().dims(), [2, 4, 6]);
        assert_eq!(out.last_raw().dims(), [2, 4, 6]);
        assert_eq!(out.raw_outputs.len(), 3);
        assert_eq!(out.outputs[1].dims(), [2, 4, 10]);
        assert_eq!(out.states.len(), 3);
        assert_eq!(out.states[0].hidden.dims(), [2, 10]);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let device  = Default::default();
        let encoder = tiny(false).init::<TestBackend>(&device);
        let tokens  = Tensor::<TestBackend, 1, Int>::from_ints([3, 4, 5, 6], &device).reshape([1, 4]);
        let a = encoder.forward(tokens.clone(), None).last_output().into_data().to_vec::<f32>().unwrap();
        let b = encoder.forward(tokens, None).last_output().into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_locked_dropout_shares_mask_over_time() {
        let device = Default::default();
        let x   = Tensor::<Autodiff<TestBackend>, 3>::ones([2, 5, 8], &device);
        let out = locked_dropout(x, 0.5).into_data().to_vec::<f32>().unwrap();
        for b in 0..2 {
            for t in 1..5 {
                for d in 0..8 {
                    assert_eq!(out[b * 40 + t * 8 + d], out[b * 40 + d]);
                }
            }
        }
    }

    #[test]
    fn test_weight_drop_masks_only_hidden_weights() {
        let device = Default::default();
        let rnn    = LstmConfig::new(3, 50, true).init::<TestBackend>(&device);
        let hh     = flat2(rnn.forget_gate.hidden_transform.weight.val());
        let ih     = flat2(rnn.forget_gate.input_transform.weight.val());

        let dropped = weight_drop(&rnn, 0.5);
        let hh_drop = flat2(dropped.forget_gate.hidden_transform.weight.val());
        assert_eq!(flat2(dropped.forget_gate.input_transform.weight.val()), ih);
        assert_eq!(dropped.forget_gate.hidden_transform.weight.id, rnn.forget_gate.hidden_transform.weight.id);

        let zeroed = hh_drop.iter().filter(|&&v| v == 0.0).count();
        assert!(zeroed > 0 && zeroed < hh.len());
        for (d, w) in hh_drop.iter().zip(&hh) {
            assert!(*d == 0.0 || (d - 2.0 * w).abs() < 1e-5);
        }
        // the source layer is untouched
        assert_eq!(flat2(rnn.forget_gate.hidden_transform.weight.val()), hh);
    }

    #[test]
    fn test_weight_drop_changes_output_only_in_training() {
        let device = Default::default();
        let cfg    = AwdLstmEncoderConfig::new(20)
            .with_emb_dim(6)
            .with_hidden_dim(10)
            .with_num_layers(1)
            .with_emb_dp(0.0)
            .with_input_dp(0.0)
            .with_hidden_dp(0.0)
            .with_out_dp(0.0)
            .with_weight_dp(0.5);
        let encoder = cfg.init::<Autodiff<TestBackend>>(&device);
        let tokens  = || {
            Tensor::<Autodiff<TestBackend>, 1, Int>::from_ints([3, 4, 5, 6, 7, 8], &device).reshape([1, 6])
        };

        let eval = encoder.valid();
        let eval_tokens = Tensor::<TestBackend, 1, Int>::from_ints([3, 4, 5, 6, 7, 8], &device).reshape([1, 6]);
        let clean = eval.forward(eval_tokens, None).last_output().into_data().to_vec::<f32>().unwrap();
        let train = encoder.forward(tokens(), None).last_output().inner().into_data().to_vec::<f32>().unwrap();
        assert_ne!(train, clean);

        // without DropConnect the training pass matches evaluation
        let no_drop = AwdLstmEncoder { weight_dp: 0.0, ..encoder.clone() };
        let plain   = no_drop.forward(tokens(), None).last_output().inner().into_data().to_vec::<f32>().unwrap();
        for (a, b) in plain.iter().zip(&clean) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_weight_drop_gradients_reach_the_original_weights() {
        let device  = Default::default();
        let encoder = tiny(false).init::<Autodiff<TestBackend>>(&device);
        let tokens  = Tensor::<Autodiff<TestBackend>, 1, Int>::from_ints([1, 2, 3, 4], &device).reshape([1, 4]);
        let grads   = encoder.forward(tokens, None).last_output().sum().backward();
        let weight  = encoder.rnns[0].cell_gate.hidden_transform.weight.val();
        assert!(weight.grad(&grads).is_some());
    }

    #[test]
    fn test_embedding_dropout_drops_whole_rows() {
        let device = Default::default();
        let w   = Tensor::<TestBackend, 2>::ones([50, 4], &device);
        let out = embedding_dropout(w, 0.5).into_data().to_vec::<f32>().unwrap();
        for row in out.chunks(4) {
            assert!(row.iter().all(|&v| v == row[0]));
            assert!(row[0] == 0.0 || (row[0] - 2.0).abs() < 1e-6);
        }
    }
}
