use burn::{
    config::Config,
    module::Module,
    nn::pool::{MaxPool1d, MaxPool1dConfig},
    tensor::{backend::Backend, Device, Tensor},
};

use crate::{
    error::TfilmError,
    recurrent::{Recurrence, RecurrenceConfig, RecurrenceKind},
};

/// Content-adaptive per-block gain.
///
/// The feature map is max-pooled into one vector per block of `block_size` steps, the block
/// sequence is summarized by a recurrence and every step of a block is scaled by that
/// block's summary vector.
#[derive(Module, Debug)]
pub struct BlockNormalizer<B: Backend> {
    pool: MaxPool1d,
    recurrence: Recurrence<B>,
    block_size: usize,
}

impl<B: Backend> BlockNormalizer<B> {
    /// `[B, L, C]` -> `[B, L, C]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let gain = self.summarize(x.clone());
        apply_gain(x, gain, self.block_size)
    }

    /// Block summary `[B, L / block_size, d_summary]`.
    pub fn summarize(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        // MaxPool1d runs on [B, C, L]
        let pooled = self.pool.forward(x.swap_dims(1, 2)).swap_dims(1, 2);
        self.recurrence.forward(pooled)
    }

    /// Checked [summarize](Self::summarize).
    pub fn try_summarize(&self, x: Tensor<B, 3>) -> crate::error::Result<Tensor<B, 3>> {
        let [_, length, _] = x.dims();
        check_blocks(length, self.block_size)?;
        Ok(self.summarize(x))
    }

    /// Checked [forward](Self::forward).
    pub fn try_forward(&self, x: Tensor<B, 3>) -> crate::error::Result<Tensor<B, 3>> {
        let gain = self.try_summarize(x.clone())?;
        apply_block_gain(x, gain, self.block_size)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

/// [BlockNormalizer] configuration.
#[derive(Config, Debug)]
pub struct BlockNormalizerConfig {
    /// Channels of the feature map being normalized.
    pub d_input: usize,
    /// Width of the block summary. Must equal the channels of the map the gain is applied to.
    pub d_summary: usize,
    /// Steps per block.
    pub block_size: usize,
    #[config(default = "RecurrenceKind::Forward")]
    pub recurrence: RecurrenceKind,
}

impl BlockNormalizerConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> BlockNormalizer<B> {
        BlockNormalizer {
            pool: MaxPool1dConfig::new(self.block_size)
                .with_stride(self.block_size)
                .init(),
            recurrence: RecurrenceConfig::new(self.d_input, self.d_summary)
                .with_kind(self.recurrence)
                .init(device),
            block_size: self.block_size,
        }
    }
}

/// Scale every step of each block of `x` `[B, L, C]` by that block's row of `gain`
/// `[B, L / block_size, C]`.
pub fn apply_block_gain<B: Backend>(
    x: Tensor<B, 3>,
    gain: Tensor<B, 3>,
    block_size: usize,
) -> crate::error::Result<Tensor<B, 3>> {
    let [batch, length, channels] = x.dims();
    let num_blocks = check_blocks(length, block_size)?;

    let expected = [batch, num_blocks, channels];
    if gain.dims() != expected {
        return Err(TfilmError::ShapeMismatch(format!(
            "block gain has shape {:?}, expected {expected:?}",
            gain.dims()
        )));
    }

    Ok(apply_gain(x, gain, block_size))
}

pub(crate) fn apply_gain<B: Backend>(
    x: Tensor<B, 3>,
    gain: Tensor<B, 3>,
    block_size: usize,
) -> Tensor<B, 3> {
    let [batch, length, channels] = x.dims();
    let num_blocks = length / block_size;

    let x = x.reshape([batch, num_blocks, block_size, channels]);
    let gain = gain
        .reshape([batch, num_blocks, 1, channels])
        .expand([batch, num_blocks, block_size, channels]);

    (x * gain).reshape([batch, length, channels])
}

/// Number of blocks in `length`, or `ShapeMismatch` when blocks do not tile it exactly.
fn check_blocks(length: usize, block_size: usize) -> crate::error::Result<usize> {
    if block_size == 0 || length == 0 || length % block_size != 0 {
        return Err(TfilmError::ShapeMismatch(format!(
            "block size {block_size} does not evenly divide sequence length {length}"
        )));
    }
    Ok(length / block_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;
    use burn::tensor::{Distribution, TensorData};

    #[test]
    fn shape_is_preserved_for_every_dividing_block_size() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::random([2, 16, 3], Distribution::Default, &device);

        for block_size in [1, 2, 4, 8, 16] {
            let normalizer = BlockNormalizerConfig::new(3, 3, block_size).init(&device);

            let summary = normalizer.try_summarize(x.clone()).unwrap();
            assert_eq!(summary.dims(), [2, 16 / block_size, 3]);

            let out = apply_block_gain(x.clone(), summary, block_size).unwrap();
            assert_eq!(out.dims(), x.dims());
        }
    }

    #[test]
    fn bidirectional_summary_has_same_shape() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::random([1, 12, 4], Distribution::Default, &device);
        let normalizer = BlockNormalizerConfig::new(4, 4, 3)
            .with_recurrence(RecurrenceKind::Bidirectional)
            .init(&device);

        assert_eq!(normalizer.try_forward(x).unwrap().dims(), [1, 12, 4]);
    }

    #[test]
    fn gain_is_broadcast_over_each_block() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 1.0], [2.0, 2.0], [1.0, -1.0], [0.5, 4.0]]],
            &device,
        );
        let gain = Tensor::<TestBackend, 3>::from_floats([[[2.0, 3.0], [5.0, 7.0]]], &device);

        let out = apply_block_gain(x, gain, 2).unwrap();
        out.into_data().assert_eq(
            &TensorData::from([[[2.0f32, 3.0], [4.0, 6.0], [5.0, -7.0], [2.5, 28.0]]]),
            false,
        );
    }

    #[test]
    fn pooling_takes_block_maximum() {
        let device = Default::default();
        let normalizer = BlockNormalizerConfig::new(1, 1, 2).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::from_floats([[[1.0], [3.0], [-2.0], [-5.0]]], &device);

        let pooled = normalizer.pool.forward(x.swap_dims(1, 2)).swap_dims(1, 2);
        pooled
            .into_data()
            .assert_eq(&TensorData::from([[[3.0f32], [-2.0]]]), false);
    }

    #[test]
    fn indivisible_length_is_rejected() {
        let device = Default::default();
        let normalizer = BlockNormalizerConfig::new(2, 2, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::zeros([1, 6, 2], &device);

        assert!(matches!(
            normalizer.try_forward(x),
            Err(TfilmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn mismatched_gain_is_rejected() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::zeros([1, 8, 2], &device);
        let gain = Tensor::<TestBackend, 3>::zeros([1, 3, 2], &device);

        assert!(matches!(
            apply_block_gain(x, gain, 4),
            Err(TfilmError::ShapeMismatch(_))
        ));
    }
}
