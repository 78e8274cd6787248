//! Two-hidden-layer ReLU network estimating one value per signal action.

use rand::Rng;

use super::replay::Transition;
use crate::error::{CrossingError, Result};

#[derive(Debug, Clone)]
struct DenseLayer {
    /// Shape: [out_dim][in_dim]
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl DenseLayer {
    fn new<R: Rng + ?Sized>(rng: &mut R, in_dim: usize, out_dim: usize, scale: f64) -> Self {
        let weights = (0..out_dim)
            .map(|_| (0..in_dim).map(|_| standard_normal(rng) * scale).collect())
            .collect();
        Self {
            weights,
            bias: vec![0.0; out_dim],
        }
    }

    fn out_dim(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f64], relu: bool) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let z = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b;
                if relu { z.max(0.0) } else { z }
            })
            .collect()
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: self.weights.iter().map(|r| vec![0.0; r.len()]).collect(),
            bias: vec![0.0; self.bias.len()],
        }
    }

    fn descend(&mut self, grad: &DenseLayer, lr: f64) {
        for (row, g_row) in self.weights.iter_mut().zip(&grad.weights) {
            for (w, g) in row.iter_mut().zip(g_row) {
                *w -= lr * g;
            }
        }
        for (b, g) in self.bias.iter_mut().zip(&grad.bias) {
            *b -= lr * g;
        }
    }
}

/// Box-Muller draw from N(0, 1).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Per-layer activations of one forward pass.
#[derive(Debug, Clone)]
pub struct Activations {
    pub hidden1: Vec<f64>,
    pub hidden2: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct QNetwork {
    input_dim: usize,
    l1: DenseLayer,
    l2: DenseLayer,
    out: DenseLayer,
}

impl QNetwork {
    /// He-scaled initialisation for the hidden layers, a small fixed scale
    /// for the output layer, zero biases.
    pub fn new<R: Rng + ?Sized>(rng: &mut R, input_dim: usize, hidden: usize, actions: usize) -> Self {
        Self {
            input_dim,
            l1: DenseLayer::new(rng, input_dim, hidden, (2.0 / input_dim as f64).sqrt()),
            l2: DenseLayer::new(rng, hidden, hidden, (2.0 / hidden as f64).sqrt()),
            out: DenseLayer::new(rng, hidden, actions, 0.1),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn actions(&self) -> usize {
        self.out.out_dim()
    }

    pub fn forward(&self, input: &[f64]) -> Result<Activations> {
        if input.len() != self.input_dim {
            return Err(CrossingError::PolicyShape {
                expected: self.input_dim,
                got: input.len(),
            });
        }
        if let Some(idx) = input.iter().position(|v| !v.is_finite()) {
            return Err(CrossingError::PolicyNonFinite(idx));
        }

        let hidden1 = self.l1.forward(input, true);
        let hidden2 = self.l2.forward(&hidden1, true);
        let values = self.out.forward(&hidden2, false);
        Ok(Activations {
            hidden1,
            hidden2,
            values,
        })
    }

    /// Index of the highest estimated value.
    pub fn best_action(&self, input: &[f64]) -> Result<usize> {
        let act = self.forward(input)?;
        let best = act
            .values
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        Ok(best.0)
    }

    /// One gradient-descent step on the squared TD error of the taken
    /// actions. Returns the mean squared error before the update.
    pub fn train(&mut self, batch: &[&Transition], discount: f64, lr: f64) -> Result<f64> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let n = batch.len() as f64;

        let mut g1 = self.l1.zeros_like();
        let mut g2 = self.l2.zeros_like();
        let mut g3 = self.out.zeros_like();
        let mut loss = 0.0;

        for t in batch {
            let next_max = if t.terminal {
                0.0
            } else {
                self.forward(&t.next_state)?
                    .values
                    .into_iter()
                    .fold(f64::NEG_INFINITY, f64::max)
            };
            let target = t.reward + discount * next_max;

            let act = self.forward(&t.state)?;
            let a = t.action.min(self.actions() - 1);
            let err = (act.values[a] - target) / n;
            loss += (act.values[a] - target).powi(2);

            // Output layer: only the taken action carries error.
            for (j, h) in act.hidden2.iter().enumerate() {
                g3.weights[a][j] += err * h;
            }
            g3.bias[a] += err;

            let delta2: Vec<f64> = act
                .hidden2
                .iter()
                .enumerate()
                .map(|(j, &h)| if h > 0.0 { err * self.out.weights[a][j] } else { 0.0 })
                .collect();
            for (j, d) in delta2.iter().enumerate() {
                for (i, h) in act.hidden1.iter().enumerate() {
                    g2.weights[j][i] += d * h;
                }
                g2.bias[j] += d;
            }

            let delta1: Vec<f64> = act
                .hidden1
                .iter()
                .enumerate()
                .map(|(i, &h)| {
                    if h > 0.0 {
                        delta2.iter().enumerate().map(|(j, d)| d * self.l2.weights[j][i]).sum()
                    } else {
                        0.0
                    }
                })
                .collect();
            for (i, d) in delta1.iter().enumerate() {
                for (k, x) in t.state.iter().enumerate() {
                    g1.weights[i][k] += d * x;
                }
                g1.bias[i] += d;
            }
        }

        self.out.descend(&g3, lr);
        self.l2.descend(&g2, lr);
        self.l1.descend(&g1, lr);

        Ok(loss / n)
    }
}
