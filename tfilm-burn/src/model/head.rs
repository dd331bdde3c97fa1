use burn::{
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Initializer, PaddingConfig1d,
    },
    tensor::{backend::Backend, Device, Tensor},
};

use super::blocks::conv_forward;
use crate::subpixel::{SubPixel1d, SubPixelLayout};

/// Final convolution and sub-pixel reshuffle producing the single-channel residual.
#[derive(Module, Debug)]
pub struct OutputHead<B: Backend> {
    conv: Conv1d<B>,
    subpixel: SubPixel1d,
}

impl<B: Backend> OutputHead<B> {
    /// `[B, L, C]` -> residual `[B, ratio * L, 1]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = conv_forward(&self.conv, x);
        self.subpixel.forward(x)
    }
}

/// [Output head](OutputHead) configuration.
pub struct OutputHeadConfig {
    conv: Conv1dConfig,
    ratio: usize,
    layout: SubPixelLayout,
}

impl OutputHeadConfig {
    /// Create a new instance of the output head [config](OutputHeadConfig).
    pub fn new(
        in_channels: usize,
        kernel_size: usize,
        ratio: usize,
        layout: SubPixelLayout,
    ) -> Self {
        let pad = (kernel_size - 1) / 2;

        // One output channel per interleaved position
        let conv = Conv1dConfig::new(in_channels, ratio, kernel_size)
            .with_padding(PaddingConfig1d::Explicit(pad))
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: 1e-3,
            });

        Self {
            conv,
            ratio,
            layout,
        }
    }

    /// Initialize a new [output head](OutputHead) module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> OutputHead<B> {
        OutputHead {
            conv: self.conv.init(device),
            subpixel: SubPixel1d::new(self.ratio, self.layout),
        }
    }
}
