use burn::{
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        pool::{MaxPool1d, MaxPool1dConfig},
        Dropout, DropoutConfig, Initializer, PaddingConfig1d,
    },
    tensor::{
        activation::{leaky_relu, relu},
        backend::Backend,
        Device, Tensor,
    },
};

use crate::{
    normalizer::{BlockNormalizer, BlockNormalizerConfig},
    recurrent::RecurrenceKind,
    schedule::LevelSpec,
    subpixel::{SubPixel1d, SubPixelLayout},
};

/// Same-length dilated convolution over a `[B, L, C]` feature map.
fn conv_config(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    dilation: usize,
) -> Conv1dConfig {
    // Same padding for odd kernels
    let pad = dilation * (kernel_size - 1) / 2;

    Conv1dConfig::new(in_channels, out_channels, kernel_size)
        .with_dilation(dilation)
        .with_padding(PaddingConfig1d::Explicit(pad))
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
}

/// Conv1d expects `[B, C, L]`.
pub(crate) fn conv_forward<B: Backend>(conv: &Conv1d<B>, x: Tensor<B, 3>) -> Tensor<B, 3> {
    conv.forward(x.swap_dims(1, 2)).swap_dims(1, 2)
}

/// A dilated Conv1d -> MaxPool1d -> (Dropout) -> LeakyReLU -> BlockNormalizer block.
///
/// Used for every downsampling level and, with dropout, for the bottleneck.
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    conv: Conv1d<B>,
    pool: MaxPool1d,
    dropout: Option<Dropout>,
    normalizer: BlockNormalizer<B>,
    negative_slope: f64,
}

impl<B: Backend> DownBlock<B> {
    /// `[B, L, C_in]` -> `[B, L / ratio, C]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.conv.forward(x.swap_dims(1, 2));
        let mut x = self.pool.forward(x).swap_dims(1, 2);

        if let Some(dropout) = &self.dropout {
            x = dropout.forward(x);
        }

        let x = leaky_relu(x, self.negative_slope);
        self.normalizer.forward(x)
    }

    pub fn normalizer(&self) -> &BlockNormalizer<B> {
        &self.normalizer
    }
}

/// [Downsampling block](DownBlock) configuration.
pub struct DownBlockConfig {
    conv: Conv1dConfig,
    pool: MaxPool1dConfig,
    dropout: Option<DropoutConfig>,
    normalizer: BlockNormalizerConfig,
    negative_slope: f64,
}

impl DownBlockConfig {
    /// Create a new instance of the downsampling block [config](DownBlockConfig).
    pub fn new(
        spec: &LevelSpec,
        dilation: usize,
        ratio: usize,
        dropout: Option<f64>,
        negative_slope: f64,
        recurrence: RecurrenceKind,
    ) -> Self {
        let conv = conv_config(spec.in_channels, spec.conv_channels, spec.kernel_size, dilation);
        let pool = MaxPool1dConfig::new(ratio).with_stride(ratio);
        let normalizer = BlockNormalizerConfig::new(spec.channels, spec.channels, spec.block_size)
            .with_recurrence(recurrence);

        Self {
            conv,
            pool,
            dropout: dropout.map(DropoutConfig::new),
            normalizer,
            negative_slope,
        }
    }

    /// Initialize a new [downsampling block](DownBlock) module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DownBlock<B> {
        DownBlock {
            conv: self.conv.init(device),
            pool: self.pool.init(),
            dropout: self.dropout.as_ref().map(|dropout| dropout.init()),
            normalizer: self.normalizer.init(device),
            negative_slope: self.negative_slope,
        }
    }
}

/// A dilated Conv1d -> Dropout -> ReLU -> SubPixel1d -> BlockNormalizer block whose output
/// is concatenated with the matching encoder activation.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    conv: Conv1d<B>,
    dropout: Dropout,
    subpixel: SubPixel1d,
    normalizer: BlockNormalizer<B>,
    level: usize,
}

impl<B: Backend> UpBlock<B> {
    /// `[B, L, C_in]` with skip `[B, ratio * L, C]` -> `[B, ratio * L, 2 * C]`
    pub fn forward(&self, x: Tensor<B, 3>, skip: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = conv_forward(&self.conv, x);
        let x = relu(self.dropout.forward(x));
        let x = self.subpixel.forward(x);
        let x = self.normalizer.forward(x);

        Tensor::cat(vec![x, skip], 2)
    }

    /// Depth level this block mirrors.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn normalizer(&self) -> &BlockNormalizer<B> {
        &self.normalizer
    }
}

/// [Upsampling block](UpBlock) configuration.
pub struct UpBlockConfig {
    conv: Conv1dConfig,
    dropout: DropoutConfig,
    ratio: usize,
    layout: SubPixelLayout,
    normalizer: BlockNormalizerConfig,
    level: usize,
}

impl UpBlockConfig {
    /// Create a new instance of the upsampling block [config](UpBlockConfig).
    pub fn new(
        spec: &LevelSpec,
        dilation: usize,
        ratio: usize,
        dropout: f64,
        layout: SubPixelLayout,
        recurrence: RecurrenceKind,
    ) -> Self {
        let conv = conv_config(spec.in_channels, spec.conv_channels, spec.kernel_size, dilation);
        let normalizer = BlockNormalizerConfig::new(spec.channels, spec.channels, spec.block_size)
            .with_recurrence(recurrence);

        Self {
            conv,
            dropout: DropoutConfig::new(dropout),
            ratio,
            layout,
            normalizer,
            level: spec.level,
        }
    }

    /// Initialize a new [upsampling block](UpBlock) module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UpBlock<B> {
        UpBlock {
            conv: self.conv.init(device),
            dropout: self.dropout.init(),
            subpixel: SubPixel1d::new(self.ratio, self.layout),
            normalizer: self.normalizer.init(device),
            level: self.level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;
    use burn::tensor::Distribution;

    fn spec(in_channels: usize, conv_channels: usize, channels: usize) -> LevelSpec {
        LevelSpec {
            level: 0,
            in_channels,
            conv_channels,
            channels,
            kernel_size: 5,
            block_size: 4,
            length: 16,
        }
    }

    #[test]
    fn down_block_halves_length() {
        let device = Default::default();
        let block = DownBlockConfig::new(&spec(1, 6, 6), 2, 2, None, 0.2, RecurrenceKind::Forward)
            .init::<TestBackend>(&device);
        let x = Tensor::random([2, 32, 1], Distribution::Default, &device);

        assert_eq!(block.forward(x).dims(), [2, 16, 6]);
    }

    #[test]
    fn bottleneck_block_with_dropout_keeps_shapes() {
        let device = Default::default();
        let block = DownBlockConfig::new(
            &spec(6, 6, 6),
            2,
            2,
            Some(0.5),
            0.2,
            RecurrenceKind::Bidirectional,
        )
        .init::<TestBackend>(&device);
        let x = Tensor::random([1, 32, 6], Distribution::Default, &device);

        assert_eq!(block.forward(x).dims(), [1, 16, 6]);
    }

    #[test]
    fn up_block_doubles_length_and_concatenates_skip() {
        let device = Default::default();
        let block = UpBlockConfig::new(
            &spec(10, 8, 4),
            2,
            2,
            0.5,
            SubPixelLayout::GroupMajor,
            RecurrenceKind::Forward,
        )
        .init::<TestBackend>(&device);
        let x = Tensor::random([2, 8, 10], Distribution::Default, &device);
        let skip = Tensor::random([2, 16, 4], Distribution::Default, &device);

        assert_eq!(block.forward(x, skip).dims(), [2, 16, 8]);
    }

    #[test]
    fn dilated_convolution_keeps_length() {
        let device = Default::default();
        let conv = conv_config(3, 5, 9, 2).init::<TestBackend>(&device);
        let x = Tensor::random([1, 40, 3], Distribution::Default, &device);

        assert_eq!(conv_forward(&conv, x).dims(), [1, 40, 5]);
    }
}
