use burn::{
    config::Config,
    module::Module,
    nn::{Initializer, Linear, LinearConfig},
    tensor::{
        activation::{sigmoid, tanh},
        backend::Backend,
        Device, Tensor,
    },
};
use serde::{Deserialize, Serialize};

/// Direction in which a cell is unrolled over the time axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A single-step recurrent cell.
pub trait RecurrentCell<B: Backend> {
    type State;

    /// State before the first step.
    fn initial_state(&self, batch_size: usize, device: &Device<B>) -> Self::State;

    /// Consume one `[batch, d_input]` step, returning the `[batch, d_output]` output and the
    /// next state.
    fn step(&self, input: Tensor<B, 2>, state: Self::State) -> (Tensor<B, 2>, Self::State);
}

/// Run `cell` over every step of a `[batch, seq_len, d_input]` sequence.
///
/// Outputs are returned in the original time order regardless of `direction`.
pub fn unroll<B: Backend, C: RecurrentCell<B>>(
    cell: &C,
    sequence: Tensor<B, 3>,
    direction: Direction,
) -> Tensor<B, 3> {
    let [batch_size, seq_len, d_input] = sequence.dims();
    let device = sequence.device();

    let steps: Vec<usize> = match direction {
        Direction::Forward => (0..seq_len).collect(),
        Direction::Backward => (0..seq_len).rev().collect(),
    };

    let mut state = cell.initial_state(batch_size, &device);
    let mut outputs = Vec::with_capacity(seq_len);
    for t in steps {
        let input = sequence
            .clone()
            .slice([0..batch_size, t..t + 1, 0..d_input])
            .reshape([batch_size, d_input]);
        let (output, next) = cell.step(input, state);
        outputs.push(output);
        state = next;
    }

    if direction == Direction::Backward {
        outputs.reverse();
    }

    Tensor::stack(outputs, 1)
}

/// Hidden and cell state of an [LstmCell].
#[derive(Clone, Debug)]
pub struct LstmState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell: Tensor<B, 2>,
}

/// Long short-term memory cell.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    /// Input projection to the stacked `[input, forget, cell, output]` gates.
    input_gates: Linear<B>,
    /// Hidden projection to the same gates (no bias).
    hidden_gates: Linear<B>,
    d_hidden: usize,
}

impl<B: Backend> RecurrentCell<B> for LstmCell<B> {
    type State = LstmState<B>;

    fn initial_state(&self, batch_size: usize, device: &Device<B>) -> LstmState<B> {
        LstmState {
            hidden: Tensor::zeros([batch_size, self.d_hidden], device),
            cell: Tensor::zeros([batch_size, self.d_hidden], device),
        }
    }

    fn step(&self, input: Tensor<B, 2>, state: LstmState<B>) -> (Tensor<B, 2>, LstmState<B>) {
        let gates = self.input_gates.forward(input) + self.hidden_gates.forward(state.hidden);
        let gate = |index: usize| gates.clone().narrow(1, index * self.d_hidden, self.d_hidden);

        let (i, f, g, o) = (gate(0), gate(1), gate(2), gate(3));
        let cell = sigmoid(f) * state.cell + sigmoid(i) * tanh(g);
        let hidden = sigmoid(o) * tanh(cell.clone());

        (hidden.clone(), LstmState { hidden, cell })
    }
}

/// [LstmCell] configuration.
#[derive(Config, Debug)]
pub struct LstmCellConfig {
    /// Input features per step.
    pub d_input: usize,
    /// Hidden (and output) features per step.
    pub d_hidden: usize,
    #[config(default = "Initializer::XavierUniform{gain:1.0}")]
    pub initializer: Initializer,
}

impl LstmCellConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> LstmCell<B> {
        LstmCell {
            input_gates: LinearConfig::new(self.d_input, 4 * self.d_hidden)
                .with_initializer(self.initializer.clone())
                .init(device),
            hidden_gates: LinearConfig::new(self.d_hidden, 4 * self.d_hidden)
                .with_bias(false)
                .with_initializer(self.initializer.clone())
                .init(device),
            d_hidden: self.d_hidden,
        }
    }
}

/// Two independent cells run in opposite directions; their outputs are summed.
#[derive(Module, Debug)]
pub struct BiLstmCell<B: Backend> {
    forward_cell: LstmCell<B>,
    backward_cell: LstmCell<B>,
}

impl<B: Backend> BiLstmCell<B> {
    pub fn forward(&self, sequence: Tensor<B, 3>) -> Tensor<B, 3> {
        let fwd = unroll(&self.forward_cell, sequence.clone(), Direction::Forward);
        let bwd = unroll(&self.backward_cell, sequence, Direction::Backward);
        fwd + bwd
    }
}

/// Which recurrence summarizes the pooled blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceKind {
    /// A single causal pass: each block sees the blocks before it.
    #[default]
    Forward,
    /// Forward and backward passes: each block sees the whole sequence.
    Bidirectional,
}

/// Sequence summarizer used by the block normalizer.
#[allow(clippy::large_enum_variant)]
#[derive(Module, Debug)]
pub enum Recurrence<B: Backend> {
    Forward(LstmCell<B>),
    Bidirectional(BiLstmCell<B>),
}

impl<B: Backend> Recurrence<B> {
    /// `[batch, seq_len, d_input]` -> `[batch, seq_len, d_hidden]`
    pub fn forward(&self, sequence: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            Recurrence::Forward(cell) => unroll(cell, sequence, Direction::Forward),
            Recurrence::Bidirectional(cells) => cells.forward(sequence),
        }
    }
}

/// [Recurrence] configuration.
#[derive(Config, Debug)]
pub struct RecurrenceConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    #[config(default = "RecurrenceKind::Forward")]
    pub kind: RecurrenceKind,
}

impl RecurrenceConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Recurrence<B> {
        let cell = LstmCellConfig::new(self.d_input, self.d_hidden);
        match self.kind {
            RecurrenceKind::Forward => Recurrence::Forward(cell.init(device)),
            RecurrenceKind::Bidirectional => Recurrence::Bidirectional(BiLstmCell {
                forward_cell: cell.init(device),
                backward_cell: cell.init(device),
            }),
        }
    }
}
