//! Two stacked LSTM layers with dropout, a ReLU dense layer and a scalar
//! output, trained with mini-batch Adam on mean-squared error.
//!
//! Gates always use the sigmoid. The candidate and the cell output use the
//! configured [`Activation`], ReLU by default.

use super::windowing::Windows;
use crate::domain::errors::{ForecastError, Result};
use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis, Zip, s};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn glorot_uniform<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_simple_fn((rows, cols), || rng.random_range(-limit..limit))
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.view().insert_axis(Axis(0)))
}

/// Nonlinearity applied to the LSTM candidate and cell output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
        }
    }

    /// Derivative written in terms of the activation's output
    fn derivative_from_output(self, y: f64) -> f64 {
        match self {
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - y * y,
        }
    }
}

impl FromStr for Activation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            other => anyhow::bail!("unknown activation '{}' (expected relu or tanh)", other),
        }
    }
}

/// Layer sizes and regularisation of the network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkShape {
    pub hidden_units: usize,
    pub dense_units: usize,
    pub dropout: f64,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Trailing fraction of windows held out for validation
    pub validation_split: f64,
    /// Global gradient-norm ceiling
    pub clip_norm: f64,
    /// Training stops after the epoch during which this instant passes
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub training_loss: f64,
    pub validation_loss: Option<f64>,
    pub stopped_at_deadline: bool,
}

/// Gates are stacked `[input, forget, candidate, output]` along the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    w: Array2<f64>,
    u: Array2<f64>,
    b: Array1<f64>,
}

struct LstmStep {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
    /// Activated cell state
    act_c: Array1<f64>,
    h: Array1<f64>,
}

impl LstmLayer {
    fn new<R: Rng>(input: usize, hidden: usize, rng: &mut R) -> Self {
        let mut b: Array1<f64> = Array1::zeros(4 * hidden);
        // Unit forget bias
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        Self {
            w: glorot_uniform(4 * hidden, input, rng),
            u: glorot_uniform(4 * hidden, hidden, rng),
            b,
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    fn input_size(&self) -> usize {
        self.w.ncols()
    }

    fn hidden_size(&self) -> usize {
        self.u.ncols()
    }

    fn step(
        &self,
        x: &Array1<f64>,
        h_prev: &Array1<f64>,
        c_prev: &Array1<f64>,
        activation: Activation,
    ) -> LstmStep {
        let hs = self.hidden_size();
        let z = self.w.dot(x) + self.u.dot(h_prev) + &self.b;

        let i = z.slice(s![0..hs]).mapv(sigmoid);
        let f = z.slice(s![hs..2 * hs]).mapv(sigmoid);
        let g = z.slice(s![2 * hs..3 * hs]).mapv(|v| activation.apply(v));
        let o = z.slice(s![3 * hs..]).mapv(sigmoid);

        let c = &f * c_prev + &i * &g;
        let act_c = c.mapv(|v| activation.apply(v));
        let h = &o * &act_c;

        LstmStep {
            x: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            c,
            act_c,
            h,
        }
    }

    fn forward(&self, inputs: &[Array1<f64>], activation: Activation) -> Vec<LstmStep> {
        let hs = self.hidden_size();
        let mut h: Array1<f64> = Array1::zeros(hs);
        let mut c: Array1<f64> = Array1::zeros(hs);
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let step = self.step(x, &h, &c, activation);
            h = step.h.clone();
            c = step.c.clone();
            steps.push(step);
        }

        steps
    }

    /// Backpropagation through time. `dh_seq[t]` is the loss gradient w.r.t.
    /// the layer output at step t; returns gradients w.r.t. each input.
    fn backward(
        &self,
        steps: &[LstmStep],
        dh_seq: &[Array1<f64>],
        activation: Activation,
        grads: &mut LstmLayer,
    ) -> Vec<Array1<f64>> {
        let hs = self.hidden_size();
        let mut dh_next: Array1<f64> = Array1::zeros(hs);
        let mut dc_next: Array1<f64> = Array1::zeros(hs);
        let mut dxs: Vec<Array1<f64>> = vec![Array1::zeros(self.input_size()); steps.len()];

        for t in (0..steps.len()).rev() {
            let step = &steps[t];
            let dh = &dh_seq[t] + &dh_next;

            let d_o = &dh * &step.act_c;
            let dc = &dh
                * &step.o
                * &step.act_c.mapv(|v| activation.derivative_from_output(v))
                + &dc_next;
            let di = &dc * &step.g;
            let dg = &dc * &step.i;
            let df = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz: Array1<f64> = Array1::zeros(4 * hs);
            dz.slice_mut(s![0..hs])
                .assign(&(&di * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![hs..2 * hs])
                .assign(&(&df * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * hs..3 * hs])
                .assign(&(&dg * &step.g.mapv(|v| activation.derivative_from_output(v))));
            dz.slice_mut(s![3 * hs..])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            grads.w += &outer(&dz, &step.x);
            grads.u += &outer(&dz, &step.h_prev);
            grads.b += &dz;

            dxs[t] = self.w.t().dot(&dz);
            dh_next = self.u.t().dot(&dz);
        }

        dxs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    w: Array2<f64>,
    b: Array1<f64>,
}

impl DenseLayer {
    fn new<R: Rng>(input: usize, output: usize, rng: &mut R) -> Self {
        Self {
            w: glorot_uniform(output, input, rng),
            b: Array1::zeros(output),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        self.w.dot(x) + &self.b
    }

    fn backward(&self, x: &Array1<f64>, d_out: &Array1<f64>, grads: &mut DenseLayer) -> Array1<f64> {
        grads.w += &outer(d_out, x);
        grads.b += d_out;
        self.w.t().dot(d_out)
    }
}

/// Activations kept from a training forward pass
struct Trace {
    lower: Vec<LstmStep>,
    lower_masks: Vec<Array1<f64>>,
    upper: Vec<LstmStep>,
    upper_mask: Array1<f64>,
    dense_input: Array1<f64>,
    dense_pre: Array1<f64>,
    dense_out: Array1<f64>,
    output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceNetwork {
    lower: LstmLayer,
    upper: LstmLayer,
    hidden: DenseLayer,
    output: DenseLayer,
    dropout: f64,
    activation: Activation,
}

impl SequenceNetwork {
    pub fn new<R: Rng>(shape: &NetworkShape, rng: &mut R) -> Self {
        Self {
            lower: LstmLayer::new(1, shape.hidden_units, rng),
            upper: LstmLayer::new(shape.hidden_units, shape.hidden_units, rng),
            hidden: DenseLayer::new(shape.hidden_units, shape.dense_units, rng),
            output: DenseLayer::new(shape.dense_units, 1, rng),
            dropout: shape.dropout,
            activation: shape.activation,
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            lower: self.lower.zeros_like(),
            upper: self.upper.zeros_like(),
            hidden: self.hidden.zeros_like(),
            output: self.output.zeros_like(),
            dropout: self.dropout,
            activation: self.activation,
        }
    }

    fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![
            self.lower.w.view().into_dyn(),
            self.lower.u.view().into_dyn(),
            self.lower.b.view().into_dyn(),
            self.upper.w.view().into_dyn(),
            self.upper.u.view().into_dyn(),
            self.upper.b.view().into_dyn(),
            self.hidden.w.view().into_dyn(),
            self.hidden.b.view().into_dyn(),
            self.output.w.view().into_dyn(),
            self.output.b.view().into_dyn(),
        ]
    }

    fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let Self {
            lower,
            upper,
            hidden,
            output,
            ..
        } = self;
        vec![
            lower.w.view_mut().into_dyn(),
            lower.u.view_mut().into_dyn(),
            lower.b.view_mut().into_dyn(),
            upper.w.view_mut().into_dyn(),
            upper.u.view_mut().into_dyn(),
            upper.b.view_mut().into_dyn(),
            hidden.w.view_mut().into_dyn(),
            hidden.b.view_mut().into_dyn(),
            output.w.view_mut().into_dyn(),
            output.b.view_mut().into_dyn(),
        ]
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    fn encode(window: &[f64]) -> Vec<Array1<f64>> {
        window.iter().map(|v| Array1::from_elem(1, *v)).collect()
    }

    /// Inverted dropout: kept units are scaled by `1 / (1 - rate)`.
    fn dropout_mask<R: Rng>(&self, size: usize, rng: &mut R) -> Array1<f64> {
        if self.dropout <= 0.0 {
            return Array1::ones(size);
        }
        let keep = 1.0 - self.dropout;
        Array1::from_shape_simple_fn(size, || {
            if rng.random::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        })
    }

    /// One-step-ahead output for a window of scaled values (dropout disabled).
    pub fn predict(&self, window: &[f64]) -> f64 {
        let lower = self.lower.forward(&Self::encode(window), self.activation);
        let lower_out: Vec<Array1<f64>> = lower.into_iter().map(|step| step.h).collect();
        let upper = self.upper.forward(&lower_out, self.activation);
        let last = match upper.last() {
            Some(step) => step.h.clone(),
            None => Array1::zeros(self.upper.hidden_size()),
        };
        let dense = self.hidden.forward(&last).mapv(|v| v.max(0.0));
        self.output.forward(&dense)[0]
    }

    fn forward_train<R: Rng>(&self, window: &[f64], rng: &mut R) -> Trace {
        let lower = self.lower.forward(&Self::encode(window), self.activation);
        let lower_masks: Vec<Array1<f64>> = lower
            .iter()
            .map(|_| self.dropout_mask(self.lower.hidden_size(), rng))
            .collect();
        let upper_inputs: Vec<Array1<f64>> = lower
            .iter()
            .zip(&lower_masks)
            .map(|(step, mask)| &step.h * mask)
            .collect();

        let upper = self.upper.forward(&upper_inputs, self.activation);
        let upper_mask = self.dropout_mask(self.upper.hidden_size(), rng);
        let last = match upper.last() {
            Some(step) => step.h.clone(),
            None => Array1::zeros(self.upper.hidden_size()),
        };

        let dense_input = &last * &upper_mask;
        let dense_pre = self.hidden.forward(&dense_input);
        let dense_out = dense_pre.mapv(|v| v.max(0.0));
        let output = self.output.forward(&dense_out)[0];

        Trace {
            lower,
            lower_masks,
            upper,
            upper_mask,
            dense_input,
            dense_pre,
            dense_out,
            output,
        }
    }

    fn backward(&self, trace: &Trace, d_output: f64, grads: &mut SequenceNetwork) {
        let d_out = Array1::from_elem(1, d_output);
        let d_dense_out = self.output.backward(&trace.dense_out, &d_out, &mut grads.output);
        let relu_gate = trace.dense_pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let d_dense_pre = &d_dense_out * &relu_gate;
        let d_dense_input = self
            .hidden
            .backward(&trace.dense_input, &d_dense_pre, &mut grads.hidden);

        let steps = trace.upper.len();
        if steps == 0 {
            return;
        }
        let mut dh_upper: Vec<Array1<f64>> = vec![Array1::zeros(self.upper.hidden_size()); steps];
        dh_upper[steps - 1] = &d_dense_input * &trace.upper_mask;

        let d_upper_inputs =
            self.upper
                .backward(&trace.upper, &dh_upper, self.activation, &mut grads.upper);
        let dh_lower: Vec<Array1<f64>> = d_upper_inputs
            .iter()
            .zip(&trace.lower_masks)
            .map(|(d, mask)| d * mask)
            .collect();
        self.lower
            .backward(&trace.lower, &dh_lower, self.activation, &mut grads.lower);
    }

    /// Mean squared error over `range` without dropout
    pub fn evaluate(&self, windows: &Windows, range: Range<usize>) -> Option<f64> {
        if range.is_empty() {
            return None;
        }
        let count = range.len() as f64;
        let total: f64 = range
            .map(|idx| {
                let error = self.predict(&windows.inputs[idx]) - windows.targets[idx];
                error * error
            })
            .sum();
        Some(total / count)
    }

    /// Trains in place. Any previous weights are only a starting point; callers
    /// wanting a fresh fit construct a new network.
    pub fn fit(
        &mut self,
        windows: &Windows,
        options: &TrainingOptions,
        rng: &mut StdRng,
    ) -> Result<TrainingReport> {
        let n = windows.len();
        if n == 0 {
            return Err(ForecastError::algorithm("LSTM training", "no training windows"));
        }

        let split_at = (((n as f64) * (1.0 - options.validation_split)).floor() as usize).clamp(1, n);
        let mut indices: Vec<usize> = (0..split_at).collect();
        let mut adam = Adam::new(self, options.learning_rate);
        let batch_size = options.batch_size.max(1);

        let mut report = TrainingReport {
            epochs_run: 0,
            training_loss: self.evaluate(windows, 0..split_at).unwrap_or(0.0),
            validation_loss: self.evaluate(windows, split_at..n),
            stopped_at_deadline: false,
        };

        for epoch in 0..options.epochs {
            indices.shuffle(rng);
            let mut epoch_loss = 0.0;

            for batch in indices.chunks(batch_size) {
                let mut grads = self.zeros_like();
                let scale = 1.0 / batch.len() as f64;
                for &idx in batch {
                    let trace = self.forward_train(&windows.inputs[idx], rng);
                    let error = trace.output - windows.targets[idx];
                    epoch_loss += error * error;
                    self.backward(&trace, 2.0 * error * scale, &mut grads);
                }
                clip_gradients(&mut grads, options.clip_norm);
                adam.update(self, &grads);
            }

            let training_loss = epoch_loss / split_at as f64;
            if !training_loss.is_finite() {
                return Err(ForecastError::algorithm(
                    "LSTM training",
                    format!("loss diverged at epoch {}", epoch + 1),
                ));
            }

            report.epochs_run = epoch + 1;
            report.training_loss = training_loss;
            report.validation_loss = self.evaluate(windows, split_at..n);
            debug!(
                "epoch {}/{} loss={:.6} val_loss={:?}",
                epoch + 1,
                options.epochs,
                training_loss,
                report.validation_loss
            );

            if options.deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    "LSTM training deadline reached after {} of {} epochs",
                    epoch + 1,
                    options.epochs
                );
                report.stopped_at_deadline = true;
                break;
            }
        }

        Ok(report)
    }
}

fn clip_gradients(grads: &mut SequenceNetwork, max_norm: f64) {
    if max_norm <= 0.0 {
        return;
    }
    let norm = grads
        .tensors()
        .iter()
        .map(|t| t.iter().map(|v| v * v).sum::<f64>())
        .sum::<f64>()
        .sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        for mut tensor in grads.tensors_mut() {
            tensor.mapv_inplace(|v| v * scale);
        }
    }
}

struct Adam {
    learning_rate: f64,
    step: i32,
    first_moment: SequenceNetwork,
    second_moment: SequenceNetwork,
}

impl Adam {
    fn new(network: &SequenceNetwork, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            step: 0,
            first_moment: network.zeros_like(),
            second_moment: network.zeros_like(),
        }
    }

    fn update(&mut self, network: &mut SequenceNetwork, grads: &SequenceNetwork) {
        self.step += 1;
        let lr = self.learning_rate;
        let bias1 = 1.0 - ADAM_BETA1.powi(self.step);
        let bias2 = 1.0 - ADAM_BETA2.powi(self.step);

        let params = network.tensors_mut();
        let firsts = self.first_moment.tensors_mut();
        let seconds = self.second_moment.tensors_mut();

        for (((param, grad), first), second) in params
            .into_iter()
            .zip(grads.tensors())
            .zip(firsts)
            .zip(seconds)
        {
            Zip::from(param)
                .and(grad)
                .and(first)
                .and(second)
                .for_each(|p, &g, m, v| {
                    *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                    *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
                });
        }
    }
}
