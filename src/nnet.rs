//! A small fully-connected scoring network. The whole parameter set packs
//! into one flat vector so that a population-based trainer can treat the
//! network as a chromosome.

use ndarray::{Array1, Array2};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Tanh,
    Relu,
    Sigmoid,
}

impl Activation {
    /// Maps the numeric configuration knob; unknown values mean identity
    /// (the caller is expected to warn).
    pub fn from_id(id: u32) -> Self {
        match id {
            1 => Activation::Tanh,
            2 => Activation::Relu,
            3 => Activation::Sigmoid,
            _ => Activation::Identity,
        }
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum NetError {
    WeightCountMismatch { expected: usize, found: usize },
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetError::WeightCountMismatch { expected, found } => write!(
                f,
                "architecture requires {expected} weights but {found} were supplied"
            ),
        }
    }
}

impl std::error::Error for NetError {}

/// Multi-layer perceptron mapping a feature vector to one scalar score.
#[derive(Clone, Debug)]
pub struct Mlp {
    units_per_layer: Vec<usize>,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    activation: Activation,
}

impl Mlp {
    /// A zero-initialised network. `units_per_layer` runs from the input
    /// width to the output width and must have at least two entries.
    pub fn new(units_per_layer: Vec<usize>, activation: Activation) -> Self {
        debug_assert!(units_per_layer.len() >= 2);
        let weights = units_per_layer
            .windows(2)
            .map(|w| Array2::zeros((w[1], w[0])))
            .collect();
        let biases = units_per_layer
            .windows(2)
            .map(|w| Array1::zeros(w[1]))
            .collect();
        Mlp {
            units_per_layer,
            weights,
            biases,
            activation,
        }
    }

    pub fn input_len(&self) -> usize {
        self.units_per_layer[0]
    }

    /// Total number of parameters: per layer, a row-major weight matrix
    /// plus one bias per output unit.
    pub fn weight_count(&self) -> usize {
        self.units_per_layer
            .windows(2)
            .map(|w| (w[0] + 1) * w[1])
            .sum()
    }

    /// Loads a flat parameter vector: each layer's matrix in row-major
    /// order, immediately followed by that layer's biases.
    pub fn store_weights(&mut self, flat: &[f64]) -> Result<(), NetError> {
        let expected = self.weight_count();
        if flat.len() != expected {
            return Err(NetError::WeightCountMismatch {
                expected,
                found: flat.len(),
            });
        }
        let mut idx = 0;
        for (layer, w) in self.units_per_layer.windows(2).enumerate() {
            let (cols, rows) = (w[0], w[1]);
            self.weights[layer] =
                Array2::from_shape_vec((rows, cols), flat[idx..idx + rows * cols].to_vec())
                    .expect("row-major chunk matches the layer shape");
            idx += rows * cols;
            self.biases[layer] = Array1::from(flat[idx..idx + rows].to_vec());
            idx += rows;
        }
        Ok(())
    }

    /// The exact inverse of [`Mlp::store_weights`].
    pub fn pack_weights(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.weight_count());
        for (w, b) in self.weights.iter().zip(&self.biases) {
            flat.extend(w.iter());
            flat.extend(b.iter());
        }
        flat
    }

    /// Forward pass. The activation is applied after every layer, the
    /// output layer included.
    pub fn forward(&self, input: &[f64]) -> f64 {
        debug_assert_eq!(input.len(), self.input_len());
        let mut prev = Array1::from(input.to_vec());
        for (w, b) in self.weights.iter().zip(&self.biases) {
            let mut y = w.dot(&prev) + b;
            y.mapv_inplace(|v| self.activation.apply(v));
            prev = y;
        }
        prev[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_count_includes_biases() {
        let net = Mlp::new(vec![3, 2, 1], Activation::Identity);
        assert_eq!(net.weight_count(), (3 + 1) * 2 + (2 + 1) * 1);
    }

    #[test]
    fn store_then_pack_is_the_identity() {
        let mut net = Mlp::new(vec![3, 2, 1], Activation::Tanh);
        let flat: Vec<f64> = (0..net.weight_count()).map(|i| i as f64 * 0.37 - 1.0).collect();
        net.store_weights(&flat).unwrap();
        assert_eq!(net.pack_weights(), flat);
    }

    #[test]
    fn wrong_weight_count_is_rejected() {
        let mut net = Mlp::new(vec![3, 2, 1], Activation::Identity);
        assert_eq!(
            net.store_weights(&[0.0; 4]),
            Err(NetError::WeightCountMismatch {
                expected: 11,
                found: 4
            })
        );
    }

    #[test]
    fn single_layer_forward_is_an_affine_map() {
        let mut net = Mlp::new(vec![2, 1], Activation::Identity);
        net.store_weights(&[1.0, 2.0, 0.5]).unwrap();
        assert_eq!(net.forward(&[3.0, 4.0]), 3.0 + 8.0 + 0.5);
    }

    #[test]
    fn relu_applies_to_every_layer() {
        let mut net = Mlp::new(vec![2, 2, 1], Activation::Relu);
        // layer 0: identity matrix with biases [-1, 0]; layer 1: [2, 5], bias 1
        net.store_weights(&[1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 2.0, 5.0, 1.0])
            .unwrap();
        // [2, -3] -> relu([1, -3]) = [1, 0] -> relu(2*1 + 5*0 + 1) = 3
        assert_eq!(net.forward(&[2.0, -3.0]), 3.0);
    }

    #[test]
    fn output_layer_activation_matches_the_configuration() {
        for (activation, expected) in [
            (Activation::Identity, -0.8f64),
            (Activation::Tanh, (-0.8f64).tanh()),
            (Activation::Relu, 0.0),
            (Activation::Sigmoid, 1.0 / (1.0 + 0.8f64.exp())),
        ] {
            let mut net = Mlp::new(vec![1, 1], activation);
            net.store_weights(&[1.0, 0.0]).unwrap();
            assert_eq!(net.forward(&[-0.8]), expected);
        }
    }

    #[test]
    fn activation_ids_map_like_the_configuration_knob() {
        assert_eq!(Activation::from_id(1), Activation::Tanh);
        assert_eq!(Activation::from_id(2), Activation::Relu);
        assert_eq!(Activation::from_id(3), Activation::Sigmoid);
        assert_eq!(Activation::from_id(0), Activation::Identity);
        assert_eq!(Activation::from_id(9), Activation::Identity);
    }
}
