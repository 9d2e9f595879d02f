use serde::{Deserialize, Serialize};

/// Name and shape of one parameter tensor, as recorded in a
/// checkpoint manifest and as expected by a model config.
///
/// Names are dotted paths: `encoder.rnns.1.weight_hh`. The part
/// before the last dot is the submodule that gets restored as a
/// unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name:  String,
    pub shape: Vec<usize>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        Self { name: name.into(), shape: shape.to_vec() }
    }

    pub fn submodule(&self) -> &str {
        match self.name.rfind('.') {
            Some(i) => &self.name[..i],
            None => &self.name,
        }
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Specs of a linear layer stored as `[d_input, d_output]`.
pub fn linear_specs(prefix: &str, d_input: usize, d_output: usize, bias: bool) -> Vec<ParamSpec> {
    let mut specs = vec![ParamSpec::new(format!("{prefix}.weight"), &[d_input, d_output])];
    if bias {
        specs.push(ParamSpec::new(format!("{prefix}.bias"), &[d_output]));
    }
    specs
}

/// Total number of scalars in a set of specs.
pub fn count_parameters(specs: &[ParamSpec]) -> usize {
    specs.iter().map(ParamSpec::numel).sum()
}
